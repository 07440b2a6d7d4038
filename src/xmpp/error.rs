/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use thiserror::Error;

use crate::SaxError;
use crate::StreamError;

use super::condition::SaslCondition;
use super::condition::StanzaCondition;
use super::condition::StreamCondition;
use super::connection::StateError;
use super::jid::BadJid;

/// Fatal errors of an XMPP connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sax(#[from] SaxError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Jid(#[from] BadJid),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// The stream negotiation did not follow the protocol.
    #[error("protocol violation ({0}): {1}")]
    Protocol(StreamCondition, &'static str),

    /// The peer closed the stream with an error.
    #[error("peer sent stream error {0}{suffix}", suffix = text_suffix(.1))]
    Remote(StreamCondition, Option<String>),

    #[error("authentication failed: {0}")]
    Authentication(SaslCondition),

    #[error("resource binding failed: {0}")]
    Bind(StanzaCondition),

    #[error("session establishment failed: {0}")]
    Session(StanzaCondition),

    #[error("connection is closed")]
    Closed,
}

impl ConnectionError {
    /// Stream error condition to report to the peer before closing.
    ///
    /// Errors which the peer caused by closing, or which make the transport
    /// unusable, have no condition.
    pub fn condition(&self) -> Option<StreamCondition> {
        match self {
            ConnectionError::Sax(err) => stream_condition(&StreamError::from(*err)),
            ConnectionError::Stream(err) => stream_condition(err),
            ConnectionError::State(_) => Some(StreamCondition::InternalServerError),
            ConnectionError::Timeout(_) => Some(StreamCondition::ConnectionTimeout),
            ConnectionError::Protocol(condition, _) => Some(*condition),
            ConnectionError::Io(_)
            | ConnectionError::Jid(_)
            | ConnectionError::Remote(..)
            | ConnectionError::Authentication(_)
            | ConnectionError::Bind(_)
            | ConnectionError::Session(_)
            | ConnectionError::Closed => None,
        }
    }
}

fn text_suffix(text: &Option<String>) -> String {
    match text {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

fn stream_condition(err: &StreamError) -> Option<StreamCondition> {
    Some(match err {
        StreamError::NotWellFormed(_) => StreamCondition::NotWellFormed,
        StreamError::InvalidXml(_) => StreamCondition::InvalidXml,
        StreamError::RestrictedXml(_) => StreamCondition::RestrictedXml,
        StreamError::ResourceConstraint(_) => StreamCondition::ResourceConstraint,
    })
}

pub(crate) mod description {
    pub(crate) const UNEXPECTED_ELEMENT: &str = "unexpected element before authentication";
    pub(crate) const STARTTLS_NOT_OFFERED: &str = "starttls was not offered";
    pub(crate) const STARTTLS_MISSING: &str = "server does not offer the required starttls";
    pub(crate) const STARTTLS_FORCED: &str = "server requires starttls which is disabled";
    pub(crate) const NO_MECHANISM: &str = "no mutually supported authentication mechanism";
    pub(crate) const TOO_MANY_ATTEMPTS: &str = "too many failed authentication attempts";
    pub(crate) const BAD_HEADER: &str = "stream header is not in the expected namespace";
    pub(crate) const NO_TRANSPORT: &str = "transport is not available";
    pub(crate) const NO_UPGRADE: &str = "stream upgrade is not configured";
    pub(crate) const TLS_REFUSED: &str = "peer refused the tls negotiation";
    pub(crate) const HOST_MISMATCH: &str = "stream is addressed to another host";
    pub(crate) const NO_STREAM_ID: &str = "stream header has no id";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions() {
        let err = ConnectionError::from(SaxError::InvalidChar("bad char"));
        assert_eq!(err.condition(), Some(StreamCondition::InvalidXml));
        let err = ConnectionError::from(StreamError::ResourceConstraint(10));
        assert_eq!(err.condition(), Some(StreamCondition::ResourceConstraint));
        let err = ConnectionError::Protocol(StreamCondition::PolicyViolation, "test");
        assert_eq!(err.condition(), Some(StreamCondition::PolicyViolation));
        let err = ConnectionError::from(std::io::Error::other("reset"));
        assert_eq!(err.condition(), None);
    }

    #[test]
    fn messages() {
        let err = ConnectionError::Remote(StreamCondition::Conflict, Some("replaced".into()));
        assert_eq!(err.to_string(), "peer sent stream error conflict: replaced");
        let err = ConnectionError::Remote(StreamCondition::SystemShutdown, None);
        assert_eq!(err.to_string(), "peer sent stream error system-shutdown");
    }

    #[test]
    fn conversions() {
        let err = ConnectionError::from(StateError::TornDown);
        assert!(matches!(err, ConnectionError::State(StateError::TornDown)));
        assert_eq!(err.condition(), Some(StreamCondition::InternalServerError));
        let err = ConnectionError::from(crate::Jid::new("@example.com").unwrap_err());
        assert!(matches!(err, ConnectionError::Jid(_)));
        let err = ConnectionError::from(std::io::Error::other("reset"));
        assert_eq!(err.to_string(), "i/o error: reset");
    }
}
