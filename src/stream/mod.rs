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

use std::collections::HashMap;

use crate::Element;
use crate::Location;
use crate::NamespaceStack;
use crate::SaxElement;
use crate::SaxHandler;
use crate::SaxParser;
use crate::constants::ns;

pub(crate) use error::description;
pub use error::StreamError;

/// Lifecycle events of an XML stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamEvent {
    /// The stream header is received. The element has no children.
    Open(Element),
    /// A complete top-level element is received.
    Stanza(Element),
    /// The stream header is closed.
    Close,
}

/// Receiver of the stream lifecycle events.
pub trait StreamHandler {
    fn stream_open(&mut self, header: Element);
    fn stanza(&mut self, stanza: Element);
    fn stream_close(&mut self);
}

impl StreamHandler for Vec<StreamEvent> {
    fn stream_open(&mut self, header: Element) {
        self.push(StreamEvent::Open(header));
    }

    fn stanza(&mut self, stanza: Element) {
        self.push(StreamEvent::Stanza(stanza));
    }

    fn stream_close(&mut self) {
        self.push(StreamEvent::Close);
    }
}

/// Assembles tokenizer events into stanzas.
///
/// The builder keeps the stack of open elements, resolves their namespaces and
/// queues the lifecycle events. The stream header is reported as soon as its start
/// tag is complete and is never made a parent of the stanzas.
pub struct StreamBuilder {
    namespaces: NamespaceStack,
    stack: Vec<Element>,
    pending: Option<Element>,
    stream_name: Option<String>,
    defaults: HashMap<String, String>,
    events: Vec<StreamEvent>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        let mut builder = StreamBuilder {
            namespaces: NamespaceStack::new(),
            stack: Vec::new(),
            pending: None,
            stream_name: None,
            defaults: HashMap::new(),
            events: Vec::new(),
        };
        for name in ["iq", "message", "presence"] {
            builder.register_default_namespace(name, ns::CLIENT);
        }
        builder
    }

    /// Sets the namespace of an unprefixed top-level element which has no namespace
    /// in scope.
    pub fn register_default_namespace(&mut self, local_name: &str, namespace: &str) {
        self.defaults
            .insert(local_name.to_string(), namespace.to_string());
    }

    pub fn reset(&mut self) {
        self.namespaces.reset();
        self.stack.clear();
        self.pending = None;
        self.stream_name = None;
        self.events.clear();
    }

    pub fn is_stream_open(&self) -> bool {
        self.stream_name.is_some()
    }

    /// Sends the queued events to the handler in arrival order.
    pub fn flush(&mut self, handler: &mut impl StreamHandler) {
        for event in self.events.drain(..) {
            match event {
                StreamEvent::Open(header) => handler.stream_open(header),
                StreamEvent::Stanza(stanza) => handler.stanza(stanza),
                StreamEvent::Close => handler.stream_close(),
            }
        }
    }

    fn resolve(&self, element: &Element) -> Result<Option<String>, StreamError> {
        match element.prefix() {
            Some(prefix) => match self.namespaces.lookup(prefix) {
                Some(uri) => Ok(Some(uri.to_string())),
                None => Err(StreamError::NotWellFormed(description::UNBOUND_PREFIX)),
            },
            None => match self.namespaces.lookup("") {
                Some(uri) => Ok(Some(uri.to_string())),
                None if self.stack.is_empty() => {
                    Ok(self.defaults.get(element.local_name()).cloned())
                }
                None => Ok(None),
            },
        }
    }

    fn finish_start_tag(&mut self, is_empty: bool) -> Result<(), StreamError> {
        let Some(mut element) = self.pending.take() else {
            return Ok(());
        };
        let namespace = self.resolve(&element)?;
        element.set_resolved_namespace(namespace.as_deref());

        if element.is("stream", ns::STREAM) {
            if !self.stack.is_empty() || self.stream_name.is_some() {
                return Err(StreamError::NotWellFormed(description::NESTED_STREAM));
            }
            self.events.push(StreamEvent::Open(element));
            if is_empty {
                self.namespaces.pop_scope();
                self.events.push(StreamEvent::Close);
            } else {
                self.stream_name = self.events.last().and_then(|event| match event {
                    StreamEvent::Open(header) => Some(header.name().to_string()),
                    _ => None,
                });
            }
            return Ok(());
        }

        if is_empty {
            self.namespaces.pop_scope();
            self.close_element(element);
        } else {
            self.stack.push(element);
        }
        Ok(())
    }

    fn close_element(&mut self, element: Element) {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.add_child(element);
            }
            None => self.events.push(StreamEvent::Stanza(element)),
        }
    }

    fn end_tag(&mut self, name: &str) -> Result<(), StreamError> {
        let Some(element) = self.stack.pop() else {
            if self.stream_name.as_deref() == Some(name) {
                self.namespaces.pop_scope();
                self.stream_name = None;
                self.events.push(StreamEvent::Close);
                return Ok(());
            }
            return Err(StreamError::NotWellFormed(description::CLOSE_WITHOUT_OPEN));
        };
        if element.name() != name {
            return Err(StreamError::NotWellFormed(description::TAG_MISMATCH));
        }
        self.namespaces.pop_scope();
        self.close_element(element);
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<(), StreamError> {
        let Some(element) = self.pending.as_mut() else {
            return Ok(());
        };
        if element.has_attribute(name) {
            return Err(StreamError::NotWellFormed(description::DUPLICATE_ATTRIBUTE));
        }
        element.set_attribute(name, Some(value));
        if name == "xmlns" {
            self.namespaces.add("", value)?;
        } else if let Some(prefix) = name.strip_prefix("xmlns:") {
            self.namespaces.add(prefix, value)?;
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), StreamError> {
        match self.stack.last_mut() {
            Some(element) => element.append_text(text),
            None => {
                if !text.chars().all(char::is_whitespace) {
                    return Err(StreamError::NotWellFormed(description::TEXT_OUTSIDE_STANZA));
                }
            }
        }
        Ok(())
    }
}

impl SaxHandler for StreamBuilder {
    type Error = StreamError;

    fn handle_element(&mut self, element: &SaxElement) -> Result<(), StreamError> {
        match element {
            SaxElement::StartTag(name) => {
                self.namespaces.push_scope();
                self.pending = Some(Element::new(name));
                Ok(())
            }
            SaxElement::Attribute(name, value) => self.attribute(name, value),
            SaxElement::StartTagContent => self.finish_start_tag(false),
            SaxElement::StartTagEmpty => self.finish_start_tag(true),
            SaxElement::EndTag(name) => self.end_tag(name),
            SaxElement::CData(text) => self.text(text),
            SaxElement::Comment(_) => Ok(()),
        }
    }
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental parser of an XML stream.
///
/// Combines the tokenizer with the [StreamBuilder]. Bytes can be fed in chunks of
/// any size, and events are delivered as soon as they are complete.
///
/// ```
/// use ikstream::{StreamEvent, StreamParser};
///
/// let mut parser = StreamParser::new();
/// let mut events = Vec::new();
/// parser.parse_bytes(b"<message><body>Hi", &mut events)?;
/// assert!(events.is_empty());
/// parser.parse_bytes(b"</body></message>", &mut events)?;
/// match &events[0] {
///     StreamEvent::Stanza(message) => assert_eq!(message.get_tag("body", None), Some("Hi")),
///     _ => unreachable!(),
/// }
/// # Ok::<(), ikstream::StreamError>(())
/// ```
pub struct StreamParser {
    parser: SaxParser,
    builder: StreamBuilder,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            parser: SaxParser::new(),
            builder: StreamBuilder::new(),
        }
    }

    /// Creates a parser which fails when an element grows beyond `max` bytes.
    pub fn with_max_buffer_size(max: usize) -> Self {
        Self {
            parser: SaxParser::with_max_buffer_size(max),
            builder: StreamBuilder::new(),
        }
    }

    pub fn builder_mut(&mut self) -> &mut StreamBuilder {
        &mut self.builder
    }

    /// Parses the bytes and delivers the completed events.
    ///
    /// Events completed before an error are still delivered.
    pub fn parse_bytes(
        &mut self,
        bytes: &[u8],
        handler: &mut impl StreamHandler,
    ) -> Result<(), StreamError> {
        let result = self.parser.parse_bytes(&mut self.builder, bytes);
        self.builder.flush(handler);
        result
    }

    /// Checks that the input ended at an element boundary.
    pub fn parse_finish(&mut self) -> Result<(), StreamError> {
        self.parser.parse_finish()?;
        if !self.builder.stack.is_empty() || self.builder.pending.is_some() {
            return Err(StreamError::NotWellFormed(description::OPEN_ELEMENTS));
        }
        Ok(())
    }

    /// Prepares the parser for a restarted stream.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.builder.reset();
    }

    pub fn is_stream_open(&self) -> bool {
        self.builder.is_stream_open()
    }

    pub fn location(&self) -> Location {
        self.parser.location()
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
