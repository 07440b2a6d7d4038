/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

/// A position in the parser input byte stream.
///
/// This struct is returned from the [location()](crate::SaxParser::location)
/// method and gives the position right after the last fully consumed token.
/// When parsing fails, it points to the start of the offending construct.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Location {
    /// Byte position in the input stream.
    pub bytes: usize,
    /// How many lines have been consumed. Lines are separated by the newline character.
    pub lines: usize,
    /// How many bytes after the last newline character.
    pub column: usize,
}

impl Location {
    /// Creates a new location at the beginning of the input stream.
    pub fn new() -> Self {
        Location::default()
    }

    pub(super) fn advance(&mut self, consumed: &[u8]) {
        self.bytes += consumed.len();
        match memchr::memrchr(b'\n', consumed) {
            Some(last) => {
                self.lines += memchr::memchr_iter(b'\n', consumed).count();
                self.column = consumed.len() - last - 1;
            }
            None => self.column += consumed.len(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "byte: {}, line: {}, column: {}",
            self.bytes, self.lines, self.column
        )
    }
}
