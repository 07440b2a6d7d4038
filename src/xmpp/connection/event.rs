/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use tokio::sync::mpsc;

use crate::Element;
use crate::xmpp::ConnectionError;

use super::ConnectionState;

/// Notifications from a connection, delivered in the order they happened.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The peer opened a stream. Sent again after every stream restart.
    StreamOpen(Element),
    /// A stanza which no registered handler consumed.
    Stanza(Element),
    /// The peer closed its stream.
    StreamClose,
    /// A fatal error, the connection is closing.
    Error(ConnectionError),
    StateChanged(ConnectionState),
}

pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;
