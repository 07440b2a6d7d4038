/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use memchr::memchr;
use memchr::memchr2;
use memchr::memchr3_iter;
use memchr::memmem;

use super::SaxError;
use super::error::description;

/// Lexical unit kinds recognized by the scanner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// `<name ...>`
    StartTag,
    /// `<name .../>`
    EmptyElement,
    /// `</name>`
    EndTag,
    /// Character data, either in content or inside a CDATA section.
    Text,
    /// `<![CDATA[`
    CDataOpen,
    /// `]]>`
    CDataClose,
    /// `<!-- ... -->`
    Comment,
    /// A character or predefined entity reference with its decoded value.
    CharRef(char),
    /// A reference to an entity which is not one of the predefined ones.
    EntityRef,
    /// `<? ... ?>`, including the XML declaration.
    ProcessingInstruction,
}

/// A classified lexical unit as a byte span of the tokenizer buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Token { kind, start, end }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub(super) enum Scan {
    Token(Token),
    /// The construct at the scan position is cut by the end of the buffer.
    Partial,
}

pub(super) const COMMENT_OPEN: &[u8] = b"<!--";
pub(super) const COMMENT_CLOSE: &[u8] = b"-->";
const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";
const DOCTYPE_OPEN: &[u8] = b"<!DOCTYPE";
const PI_CLOSE: &[u8] = b"?>";

// Longest predefined entity is "&quot;", longest character
// reference is "&#x0010FFFF;" with some leading zeros.
const MAX_REFERENCE_LEN: usize = 16;

macro_rules! xml_error {
    ($a:ident) => {
        return Err(SaxError::BadXml(description::$a))
    };
}

pub(super) fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

pub(super) fn is_valid_xml_char(c: u32) -> bool {
    matches!(c, 0x09 | 0x0a | 0x0d | 0x20..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff)
}

/// Decides whether `rest` starts with `pattern` when `rest` may be a cut prefix.
///
/// Returns None when there are not enough bytes to decide yet.
fn starts_with_partial(rest: &[u8], pattern: &[u8]) -> Option<bool> {
    if rest.len() < pattern.len() {
        if pattern.starts_with(rest) {
            None
        } else {
            Some(false)
        }
    } else {
        Some(rest.starts_with(pattern))
    }
}

/// Classifies the unit starting at `pos` in content mode.
pub(super) fn scan_content(buf: &[u8], pos: usize) -> Result<Scan, SaxError> {
    let rest = &buf[pos..];
    match rest[0] {
        b'<' => scan_markup(buf, pos),
        b'&' => scan_reference(buf, pos),
        // A text run is only complete once its terminator is visible,
        // otherwise split input would produce different runs.
        _ => match memchr2(b'<', b'&', rest) {
            Some(len) => Ok(Scan::Token(Token::new(TokenKind::Text, pos, pos + len))),
            None => Ok(Scan::Partial),
        },
    }
}

/// Classifies the unit starting at `pos` inside a CDATA section.
pub(super) fn scan_cdata_section(buf: &[u8], pos: usize) -> Scan {
    match memmem::find(&buf[pos..], CDATA_CLOSE) {
        Some(0) => Scan::Token(Token::new(
            TokenKind::CDataClose,
            pos,
            pos + CDATA_CLOSE.len(),
        )),
        Some(len) => Scan::Token(Token::new(TokenKind::Text, pos, pos + len)),
        None => Scan::Partial,
    }
}

fn scan_markup(buf: &[u8], pos: usize) -> Result<Scan, SaxError> {
    let rest = &buf[pos..];
    if rest.len() < 2 {
        return Ok(Scan::Partial);
    }
    match rest[1] {
        b'/' => Ok(match memchr(b'>', rest) {
            Some(end) => Scan::Token(Token::new(TokenKind::EndTag, pos, pos + end + 1)),
            None => Scan::Partial,
        }),
        b'?' => Ok(match memmem::find(&rest[2..], PI_CLOSE) {
            Some(end) => Scan::Token(Token::new(
                TokenKind::ProcessingInstruction,
                pos,
                pos + 2 + end + PI_CLOSE.len(),
            )),
            None => Scan::Partial,
        }),
        b'!' => scan_declaration(buf, pos),
        _ => Ok(scan_tag(buf, pos)),
    }
}

fn scan_declaration(buf: &[u8], pos: usize) -> Result<Scan, SaxError> {
    let rest = &buf[pos..];
    match starts_with_partial(rest, COMMENT_OPEN) {
        None => return Ok(Scan::Partial),
        Some(true) => {
            let body = &rest[COMMENT_OPEN.len()..];
            return Ok(match memmem::find(body, COMMENT_CLOSE) {
                Some(end) => Scan::Token(Token::new(
                    TokenKind::Comment,
                    pos,
                    pos + COMMENT_OPEN.len() + end + COMMENT_CLOSE.len(),
                )),
                None => Scan::Partial,
            });
        }
        Some(false) => (),
    }
    match starts_with_partial(rest, CDATA_OPEN) {
        None => return Ok(Scan::Partial),
        Some(true) => {
            return Ok(Scan::Token(Token::new(
                TokenKind::CDataOpen,
                pos,
                pos + CDATA_OPEN.len(),
            )));
        }
        Some(false) => (),
    }
    match starts_with_partial(rest, DOCTYPE_OPEN) {
        None => Ok(Scan::Partial),
        Some(true) => Err(SaxError::NotSupported(description::MARKUP_DOCTYPE)),
        Some(false) => xml_error!(MARKUP_UNRECOGNIZED),
    }
}

fn scan_tag(buf: &[u8], pos: usize) -> Scan {
    let rest = &buf[pos..];
    let mut quote: Option<u8> = None;
    for i in memchr3_iter(b'>', b'"', b'\'', rest) {
        let c = rest[i];
        match quote {
            Some(q) if q == c => quote = None,
            Some(_) => (),
            None if c == b'>' => {
                let kind = if rest[i - 1] == b'/' {
                    TokenKind::EmptyElement
                } else {
                    TokenKind::StartTag
                };
                return Scan::Token(Token::new(kind, pos, pos + i + 1));
            }
            None => quote = Some(c),
        }
    }
    Scan::Partial
}

/// Classifies the reference starting with the `&` at `pos`.
///
/// This is used both for element content and for re-scanning attribute values.
pub(super) fn scan_reference(buf: &[u8], pos: usize) -> Result<Scan, SaxError> {
    let rest = &buf[pos..];
    let window = &rest[..rest.len().min(MAX_REFERENCE_LEN)];
    let Some(end) = memchr(b';', window) else {
        if rest.len() < MAX_REFERENCE_LEN {
            return Ok(Scan::Partial);
        }
        xml_error!(REFERENCE_UNTERMINATED);
    };
    let kind = match decode_reference(&rest[1..end])? {
        Some(c) => TokenKind::CharRef(c),
        None => TokenKind::EntityRef,
    };
    Ok(Scan::Token(Token::new(kind, pos, pos + end + 1)))
}

fn decode_reference(body: &[u8]) -> Result<Option<char>, SaxError> {
    let value = match body {
        b"amp" => return Ok(Some('&')),
        b"lt" => return Ok(Some('<')),
        b"gt" => return Ok(Some('>')),
        b"quot" => return Ok(Some('"')),
        b"apos" => return Ok(Some('\'')),
        [b'#', b'x', hex @ ..] => parse_number(hex, 16, description::REFERENCE_INVALID_HEX)?,
        [b'#', decimal @ ..] => {
            parse_number(decimal, 10, description::REFERENCE_INVALID_DECIMAL)?
        }
        _ => {
            if body.is_empty() || body.iter().any(|c| !is_name_byte(*c)) {
                xml_error!(REFERENCE_BAD_NAME);
            }
            return Ok(None);
        }
    };
    if !is_valid_xml_char(value) {
        return Err(SaxError::InvalidChar(description::CHAR_REFERENCE_INVALID));
    }
    match char::from_u32(value) {
        Some(c) => Ok(Some(c)),
        None => Err(SaxError::InvalidChar(description::CHAR_REFERENCE_INVALID)),
    }
}

fn parse_number(digits: &[u8], radix: u32, error: &'static str) -> Result<u32, SaxError> {
    if digits.is_empty() {
        return Err(SaxError::BadXml(error));
    }
    let mut value: u32 = 0;
    for c in digits {
        let digit = (*c as char).to_digit(radix).ok_or(SaxError::BadXml(error))?;
        value = value
            .checked_mul(radix)
            .and_then(|v| v.checked_add(digit))
            .ok_or(SaxError::InvalidChar(description::CHAR_REFERENCE_INVALID))?;
    }
    Ok(value)
}

/// Bytes allowed in tag, attribute and entity names.
///
/// Non-ASCII bytes are accepted as is, UTF-8 validity is checked when
/// the name is extracted.
pub(super) fn is_name_byte(c: u8) -> bool {
    !is_whitespace(c)
        && !matches!(
            c,
            b'<' | b'>' | b'/' | b'=' | b'"' | b'\'' | b'&' | b';' | b'!' | b'?'
        )
}
