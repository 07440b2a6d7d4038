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

/// Type of the error which happened while tokenizing the XML stream.
///
/// These categories are kept as few as possible and correspond to the distinct
/// actions the caller might take based on the problem. The location of the error
/// is available via the [location()](super::SaxParser::location) method.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SaxError {
    /// A syntax error is encountered in the XML input.
    ///
    /// Malformed markup, mismatched quotes, unknown entity references and bad
    /// UTF-8 sequences all end up here.
    #[error("invalid xml syntax: {0}")]
    BadXml(&'static str),

    /// The input contains a character which is not allowed in XML documents.
    #[error("invalid xml character: {0}")]
    InvalidChar(&'static str),

    /// A valid XML construct which is not allowed in XML streams.
    ///
    /// Document type declarations are the only such construct at the moment.
    #[error("xml construct not supported: {0}")]
    NotSupported(&'static str),

    /// An incomplete construct grew beyond the configured buffer limit.
    #[error("unparsed input exceeds the limit of {0} bytes")]
    BufferLimit(usize),
}

pub(super) mod description {
    pub(in super::super) const PARSER_REUSE_WITHOUT_RESET: &str =
        "cannot continue after an error without a reset";
    pub(in super::super) const UTF8_INVALID: &str = "invalid UTF-8 sequence";
    pub(in super::super) const CHAR_INVALID: &str = "control characters are not allowed";
    pub(in super::super) const CHAR_REFERENCE_INVALID: &str =
        "character reference points to an invalid character";
    pub(in super::super) const DOC_OPEN_MARKUP: &str = "input ends inside an unfinished construct";
    pub(in super::super) const TAG_EMPTY_NAME: &str = "tag has no name";
    pub(in super::super) const TAG_BAD_NAME: &str = "tag name contains an invalid character";
    pub(in super::super) const TAG_END_TAG_ATTRIBUTES: &str = "end tag cannot have attributes";
    pub(in super::super) const TAG_ATTRIBUTE_WITHOUT_EQUAL: &str =
        "tag attributes must have '=' before the value";
    pub(in super::super) const TAG_ATTRIBUTE_WITHOUT_QUOTE: &str =
        "tag attribute value must be in double or single quotes";
    pub(in super::super) const TAG_ATTRIBUTE_WITHOUT_SPACE: &str =
        "tag attributes must be separated by whitespace";
    pub(in super::super) const TAG_ATTRIBUTE_BAD_NAME: &str =
        "tag attribute name contains an invalid character";
    pub(in super::super) const TAG_ATTRIBUTE_BAD_VALUE: &str =
        "tag attribute value cannot have '<' character without a reference";
    pub(in super::super) const REFERENCE_UNTERMINATED: &str = "reference is not terminated with ';'";
    pub(in super::super) const REFERENCE_BAD_NAME: &str = "reference has an invalid name";
    pub(in super::super) const REFERENCE_INVALID_DECIMAL: &str =
        "non digit in decimal character reference";
    pub(in super::super) const REFERENCE_INVALID_HEX: &str =
        "non hex digit in hexadecimal character reference";
    pub(in super::super) const REFERENCE_CUSTOM_ENTITY: &str =
        "non-predefined entity references are not supported";
    pub(in super::super) const MARKUP_UNRECOGNIZED: &str =
        "markup is not a comment, character data section, or document type declaration";
    pub(in super::super) const MARKUP_DOCTYPE: &str =
        "document type declarations are not allowed in streams";
}
