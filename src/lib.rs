/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Resumable XML stream engine and connection state machine for Jabber/XMPP.
//!
//! The engine layer turns arbitrary chunks of bytes into stream events: the
//! [SaxParser] tokenizes, the [NamespaceStack] resolves prefixes and the
//! [StreamParser] assembles the stanzas. The `xmpp` feature adds the
//! [Connection] state machine with its client and server negotiation.

pub mod constants;
mod element;
mod entities;
mod namespace;
mod parser;
mod stream;
#[cfg(feature = "xmpp")]
mod xmpp;

pub use element::Cursor;
pub use element::Element;

pub use parser::DEFAULT_MAX_BUFFER_SIZE;
pub use parser::Location;
pub use parser::SaxElement;
pub use parser::SaxError;
pub use parser::SaxHandler;
pub use parser::SaxParser;
pub use parser::Token;
pub use parser::TokenKind;

pub use namespace::NamespaceError;
pub use namespace::NamespaceStack;
pub use namespace::XML_NAMESPACE;
pub use namespace::XMLNS_NAMESPACE;

pub use stream::StreamBuilder;
pub use stream::StreamError;
pub use stream::StreamEvent;
pub use stream::StreamHandler;
pub use stream::StreamParser;

#[cfg(feature = "xmpp")]
pub use xmpp::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
