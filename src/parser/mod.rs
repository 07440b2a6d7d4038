/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod location;
mod token;

use memchr::memchr;
use memchr::memchr2;

pub use error::SaxError;
use error::description;
pub use location::Location;
pub use token::Token;
pub use token::TokenKind;
use token::COMMENT_CLOSE;
use token::COMMENT_OPEN;
use token::Scan;
use token::is_name_byte;
use token::is_whitespace;
use token::scan_cdata_section;
use token::scan_content;
use token::scan_reference;

/// An XML event produced by the tokenizer.
#[derive(Debug, Eq, PartialEq)]
pub enum SaxElement<'a> {
    /// A start tag or empty element tag.
    ///
    /// The argument is the full name of the tag including the prefix.
    StartTag(&'a str),

    /// A tag attribute for the last StartTag.
    ///
    /// First argument is the attribute name and the second argument is the attribute value.
    /// All references in the attribute value are replaced with the actual characters.
    Attribute(&'a str, &'a str),

    /// Indicates that the last StartTag is complete and will have content.
    StartTagContent,

    /// Indicates that the last StartTag was an empty element tag and will have no content.
    StartTagEmpty,

    /// An end tag element.
    ///
    /// The argument is the full name of the end tag.
    EndTag(&'a str),

    /// A character data element.
    ///
    /// Text runs, decoded references and character data sections are all sent with
    /// this element. A single continuous block of text might be split into several
    /// parts, the stream builder concatenates them.
    CData(&'a str),

    /// Interior of a comment.
    Comment(&'a str),
}

/// Receiver of the tokenizer events.
///
/// The handler decides its own error type which must be able to carry
/// tokenizer errors, so that the builder level failures can abort the
/// parsing without being squeezed into [SaxError].
pub trait SaxHandler {
    type Error: From<SaxError>;

    fn handle_element(&mut self, element: &SaxElement) -> Result<(), Self::Error>;
}

/// Default upper bound for the unconsumed input.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Resumable XML stream tokenizer.
///
/// Input is appended to an internal buffer with [parse_bytes()](SaxParser::parse_bytes)
/// and every complete lexical unit is classified and sent to the handler. When the
/// buffer ends in the middle of a construct, scanning stops and the unconsumed tail is
/// kept for the next call. The input can be split at any byte position, including
/// inside multi-byte UTF-8 sequences, and the handler still receives the same events.
///
/// # Examples
///
/// ```
/// use ikstream::{SaxElement, SaxError, SaxHandler, SaxParser};
///
/// struct Printer {}
///
/// impl SaxHandler for Printer {
///     type Error = SaxError;
///
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
///         println!("{element:?}");
///         Ok(())
///     }
/// }
///
/// let mut parser = SaxParser::new();
/// let mut printer = Printer {};
/// parser.parse_bytes(&mut printer, b"<message><bo")?;
/// parser.parse_bytes(&mut printer, b"dy>hi</body></message>")?;
/// # Ok::<(), SaxError>(())
/// ```
pub struct SaxParser {
    buffer: Vec<u8>,
    in_cdata: bool,
    failed: bool,
    max_buffer_size: usize,
    value: String,
    location: Location,
}

const INITIAL_BUFFER_CAPACITY: usize = 4096;

fn text(bytes: &[u8]) -> Result<&str, SaxError> {
    if bytes
        .iter()
        .any(|c| *c < 0x20 && !matches!(c, b'\t' | b'\n' | b'\r'))
    {
        return Err(SaxError::InvalidChar(description::CHAR_INVALID));
    }
    std::str::from_utf8(bytes).map_err(|_| SaxError::BadXml(description::UTF8_INVALID))
}

fn name<'a>(bytes: &'a [u8], error: &'static str) -> Result<&'a str, SaxError> {
    match bytes.first() {
        None => return Err(SaxError::BadXml(description::TAG_EMPTY_NAME)),
        Some(b'0'..=b'9' | b'-' | b'.') => return Err(SaxError::BadXml(error)),
        Some(_) => (),
    }
    if bytes.iter().any(|c| !is_name_byte(*c)) {
        return Err(SaxError::BadXml(error));
    }
    text(bytes)
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|c| is_whitespace(**c)).count();
    &bytes[skip..]
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let keep = bytes.len() - bytes.iter().rev().take_while(|c| is_whitespace(**c)).count();
    &bytes[..keep]
}

impl SaxParser {
    /// Creates a new tokenizer with the default buffer limit.
    pub fn new() -> SaxParser {
        SaxParser::with_max_buffer_size(DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Creates a new tokenizer which refuses to keep more than `max` unconsumed bytes.
    pub fn with_max_buffer_size(max: usize) -> SaxParser {
        SaxParser {
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY.min(max)),
            in_cdata: false,
            failed: false,
            max_buffer_size: max,
            value: String::new(),
            location: Location::new(),
        }
    }

    /// Resets the tokenizer into a clean state for a new stream.
    ///
    /// Any buffered partial input is discarded.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_cdata = false;
        self.failed = false;
        self.value.clear();
        self.location = Location::new();
    }

    /// Position of the last consumed byte, or of the failing construct after an error.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Number of buffered bytes waiting for the rest of their construct.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Checks that no unfinished construct is left in the buffer.
    ///
    /// Trailing whitespace is allowed.
    pub fn parse_finish(&mut self) -> Result<(), SaxError> {
        if self.in_cdata || self.buffer.iter().any(|c| !is_whitespace(*c)) {
            return Err(SaxError::BadXml(description::DOC_OPEN_MARKUP));
        }
        Ok(())
    }

    /// Parses the given bytes, sending the complete constructs to the handler.
    ///
    /// After an error the tokenizer must be [reset](SaxParser::reset) before reuse.
    pub fn parse_bytes<H: SaxHandler>(
        &mut self,
        handler: &mut H,
        bytes: &[u8],
    ) -> Result<(), H::Error> {
        if self.failed {
            return Err(SaxError::BadXml(description::PARSER_REUSE_WITHOUT_RESET).into());
        }
        self.buffer.extend_from_slice(bytes);

        let mut pos = 0;
        let result = loop {
            if pos >= self.buffer.len() {
                break Ok(());
            }
            let scan = if self.in_cdata {
                Ok(scan_cdata_section(&self.buffer, pos))
            } else {
                scan_content(&self.buffer, pos)
            };
            let token = match scan {
                Ok(Scan::Token(token)) => token,
                Ok(Scan::Partial) => break Ok(()),
                Err(err) => break Err(err.into()),
            };
            if let Err(err) = self.dispatch(handler, &token) {
                break Err(err);
            }
            self.location.advance(&self.buffer[token.start..token.end]);
            pos = token.end;
        };

        self.buffer.drain(..pos);
        if result.is_ok() && self.buffer.len() > self.max_buffer_size {
            self.failed = true;
            return Err(SaxError::BufferLimit(self.max_buffer_size).into());
        }
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn dispatch<H: SaxHandler>(&mut self, handler: &mut H, token: &Token) -> Result<(), H::Error> {
        let span = &self.buffer[token.start..token.end];
        match token.kind {
            TokenKind::StartTag => {
                let body = &span[1..span.len() - 1];
                parse_tag(handler, &mut self.value, body)?;
                handler.handle_element(&SaxElement::StartTagContent)
            }
            TokenKind::EmptyElement => {
                let body = &span[1..span.len() - 2];
                parse_tag(handler, &mut self.value, body)?;
                handler.handle_element(&SaxElement::StartTagEmpty)
            }
            TokenKind::EndTag => {
                let body = trim_end(&span[2..span.len() - 1]);
                if body.iter().any(|c| is_whitespace(*c)) {
                    return Err(SaxError::BadXml(description::TAG_END_TAG_ATTRIBUTES).into());
                }
                let tag = name(body, description::TAG_BAD_NAME)?;
                handler.handle_element(&SaxElement::EndTag(tag))
            }
            TokenKind::Text => handler.handle_element(&SaxElement::CData(text(span)?)),
            TokenKind::CharRef(c) => {
                let mut buf = [0u8; 4];
                handler.handle_element(&SaxElement::CData(c.encode_utf8(&mut buf)))
            }
            TokenKind::EntityRef => {
                Err(SaxError::BadXml(description::REFERENCE_CUSTOM_ENTITY).into())
            }
            TokenKind::CDataOpen => {
                self.in_cdata = true;
                Ok(())
            }
            TokenKind::CDataClose => {
                self.in_cdata = false;
                Ok(())
            }
            TokenKind::Comment => {
                let body = &span[COMMENT_OPEN.len()..span.len() - COMMENT_CLOSE.len()];
                handler.handle_element(&SaxElement::Comment(text(body)?))
            }
            TokenKind::ProcessingInstruction => Ok(()),
        }
    }
}

/// Splits the inside of a start tag into its name and attributes.
fn parse_tag<H: SaxHandler>(
    handler: &mut H,
    value: &mut String,
    body: &[u8],
) -> Result<(), H::Error> {
    let name_end = body
        .iter()
        .position(|c| is_whitespace(*c))
        .unwrap_or(body.len());
    let tag = name(&body[..name_end], description::TAG_BAD_NAME)?;
    handler.handle_element(&SaxElement::StartTag(tag))?;

    let mut rest = &body[name_end..];
    loop {
        let trimmed = trim_start(rest);
        if trimmed.is_empty() {
            return Ok(());
        }
        if trimmed.len() == rest.len() {
            return Err(SaxError::BadXml(description::TAG_ATTRIBUTE_WITHOUT_SPACE).into());
        }
        let Some(eq) = memchr(b'=', trimmed) else {
            return Err(SaxError::BadXml(description::TAG_ATTRIBUTE_WITHOUT_EQUAL).into());
        };
        let attr_name = name(
            trim_end(&trimmed[..eq]),
            description::TAG_ATTRIBUTE_BAD_NAME,
        )?;
        let after_eq = trim_start(&trimmed[eq + 1..]);
        let quote = match after_eq.first() {
            Some(q @ (b'"' | b'\'')) => *q,
            _ => {
                return Err(SaxError::BadXml(description::TAG_ATTRIBUTE_WITHOUT_QUOTE).into());
            }
        };
        let Some(close) = memchr(quote, &after_eq[1..]) else {
            return Err(SaxError::BadXml(description::TAG_ATTRIBUTE_WITHOUT_QUOTE).into());
        };
        normalize_value(value, &after_eq[1..close + 1])?;
        handler.handle_element(&SaxElement::Attribute(attr_name, value.as_str()))?;
        rest = &after_eq[close + 2..];
    }
}

/// Decodes references and normalizes whitespace of an attribute value into `value`.
fn normalize_value(value: &mut String, raw: &[u8]) -> Result<(), SaxError> {
    value.clear();
    let mut pos = 0;
    while pos < raw.len() {
        let run_end = match memchr2(b'&', b'<', &raw[pos..]) {
            Some(len) => pos + len,
            None => raw.len(),
        };
        for c in text(&raw[pos..run_end])?.chars() {
            value.push(match c {
                '\t' | '\n' | '\r' => ' ',
                c => c,
            });
        }
        if run_end == raw.len() {
            break;
        }
        if raw[run_end] == b'<' {
            return Err(SaxError::BadXml(description::TAG_ATTRIBUTE_BAD_VALUE));
        }
        match scan_reference(raw, run_end)? {
            Scan::Token(Token {
                kind: TokenKind::CharRef(c),
                end,
                ..
            }) => {
                value.push(c);
                pos = end;
            }
            Scan::Token(_) => {
                return Err(SaxError::BadXml(description::REFERENCE_CUSTOM_ENTITY));
            }
            Scan::Partial => return Err(SaxError::BadXml(description::REFERENCE_UNTERMINATED)),
        }
    }
    Ok(())
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}


mod nocompile;
