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

use crate::NamespaceError;
use crate::SaxError;

/// Fatal problems in the incoming XML stream.
///
/// Each variant corresponds to the stream error condition which should be
/// reported to the peer before closing the stream.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum StreamError {
    /// Maps to the `not-well-formed` stream condition.
    #[error("stream is not well-formed: {0}")]
    NotWellFormed(&'static str),

    /// Maps to the `invalid-xml` stream condition.
    #[error("stream has invalid xml: {0}")]
    InvalidXml(&'static str),

    /// Maps to the `restricted-xml` stream condition.
    #[error("stream has restricted xml: {0}")]
    RestrictedXml(&'static str),

    /// Maps to the `resource-constraint` stream condition.
    #[error("stream element is larger than {0} bytes")]
    ResourceConstraint(usize),
}

impl From<SaxError> for StreamError {
    fn from(err: SaxError) -> Self {
        match err {
            SaxError::BadXml(msg) => StreamError::NotWellFormed(msg),
            SaxError::InvalidChar(msg) => StreamError::InvalidXml(msg),
            SaxError::NotSupported(msg) => StreamError::RestrictedXml(msg),
            SaxError::BufferLimit(size) => StreamError::ResourceConstraint(size),
        }
    }
}

impl From<NamespaceError> for StreamError {
    fn from(err: NamespaceError) -> Self {
        match err {
            NamespaceError::Reserved(_) => StreamError::NotWellFormed(description::RESERVED_PREFIX),
            NamespaceError::EmptyNamespace(_) => {
                StreamError::NotWellFormed(description::EMPTY_PREFIX_NAMESPACE)
            }
        }
    }
}

pub(crate) mod description {
    pub(crate) const TAG_MISMATCH: &str = "start and end tags have different names";
    pub(crate) const CLOSE_WITHOUT_OPEN: &str = "close tag without open";
    pub(crate) const DUPLICATE_ATTRIBUTE: &str = "attribute name already used in this tag";
    pub(crate) const UNBOUND_PREFIX: &str = "element prefix is not bound to a namespace";
    pub(crate) const RESERVED_PREFIX: &str = "reserved prefixes cannot be redefined";
    pub(crate) const EMPTY_PREFIX_NAMESPACE: &str = "prefix cannot be bound to an empty namespace";
    pub(crate) const TEXT_OUTSIDE_STANZA: &str = "character data is not allowed between stanzas";
    pub(crate) const NESTED_STREAM: &str = "stream header can only be the outermost element";
    pub(crate) const OPEN_ELEMENTS: &str = "input ends with unclosed elements";
    pub(crate) const NOT_SINGLE_ELEMENT: &str = "input is not a single element";
}
