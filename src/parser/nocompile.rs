/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

/// # Must not compile tests
///
/// Elements borrow the parser buffer and cannot be kept by the handler:
/// ```compile_fail
/// use ikstream::{SaxElement, SaxError, SaxHandler};
///
/// struct Keeper<'a> {
///     last: Option<&'a str>,
/// }
///
/// impl<'a> SaxHandler for Keeper<'a> {
///     type Error = SaxError;
///
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
///         if let SaxElement::StartTag(name) = element {
///             self.last = Some(name);
///         }
///         Ok(())
///     }
/// }
/// ```
///
/// The stream parser needs a handler to deliver the events to:
/// ```compile_fail
/// use ikstream::StreamParser;
///
/// let mut parser = StreamParser::new();
/// parser.parse_bytes(b"<stream:stream>");
/// ```
#[cfg(doctest)]
struct MustNotCompileTests;
