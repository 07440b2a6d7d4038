/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod client;
mod component;
mod condition;
mod connection;
mod error;
mod jid;
pub mod protocol;
mod registry;
pub mod sasl;
mod server;
mod tls;

pub use client::ClientBuilder;
pub use client::XmppClient;
pub use component::ComponentBuilder;
pub use component::XmppComponent;
pub use component::handshake_digest;
pub use condition::SaslCondition;
pub use condition::StanzaCondition;
pub use condition::StreamCondition;
pub use condition::UnknownCondition;
pub use connection::AccessFlags;
pub use connection::Completion;
pub use connection::Connection;
pub use connection::ConnectionConfig;
pub use connection::ConnectionEvent;
pub use connection::ConnectionState;
pub use connection::EventReceiver;
pub use connection::Role;
pub use connection::StanzaHandler;
pub use connection::StateError;
pub use connection::TlsPolicy;
pub use connection::WriteOutcome;
pub use error::ConnectionError;
pub use jid::BadJid;
pub use jid::Jid;
pub use registry::BindRegistry;
pub use registry::LocalRegistry;
pub use server::ServerBuilder;
pub use server::XmppServer;
pub use tls::BoxedTransport;
pub use tls::RustlsAcceptor;
pub use tls::RustlsConnector;
pub use tls::StreamUpgrade;
pub use tls::Transport;
