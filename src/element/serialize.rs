/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Write;

use crate::entities::escape_fmt;
use crate::entities::escaped_size;

use super::Element;

/// Output of the serializer. Sizing and formatting share the same walk,
/// so the precomputed size is always exact.
trait Sink {
    fn raw(&mut self, s: &str) -> std::fmt::Result;
    fn escaped(&mut self, s: &str) -> std::fmt::Result;
}

struct SizeCounter(usize);

impl Sink for SizeCounter {
    fn raw(&mut self, s: &str) -> std::fmt::Result {
        self.0 += s.len();
        Ok(())
    }

    fn escaped(&mut self, s: &str) -> std::fmt::Result {
        self.0 += escaped_size(s);
        Ok(())
    }
}

struct Writer<'a, W: Write>(&'a mut W);

impl<W: Write> Sink for Writer<'_, W> {
    fn raw(&mut self, s: &str) -> std::fmt::Result {
        self.0.write_str(s)
    }

    fn escaped(&mut self, s: &str) -> std::fmt::Result {
        escape_fmt(s, self.0)
    }
}

impl Element {
    /// Namespace declaration to write which the attributes and parent do not imply.
    fn implied_declaration(&self, parent: Option<&Element>) -> Option<(String, &str)> {
        let namespace = self.namespace()?;
        match self.prefix() {
            Some(prefix) => {
                let declaration = format!("xmlns:{prefix}");
                if self.has_attribute(&declaration)
                    || parent.and_then(|p| p.prefix_namespace(prefix)) == Some(namespace)
                {
                    return None;
                }
                Some((declaration, namespace))
            }
            None => {
                if self.has_attribute("xmlns")
                    || parent.and_then(Element::default_namespace) == Some(namespace)
                {
                    return None;
                }
                Some(("xmlns".to_string(), namespace))
            }
        }
    }

    fn write_start(&self, parent: Option<&Element>, sink: &mut impl Sink) -> std::fmt::Result {
        sink.raw("<")?;
        sink.raw(&self.name)?;
        if let Some((name, value)) = self.implied_declaration(parent) {
            write_attribute(sink, &name, value)?;
        }
        for (name, value) in &self.attributes {
            write_attribute(sink, name, value)?;
        }
        Ok(())
    }

    fn write(&self, parent: Option<&Element>, sink: &mut impl Sink) -> std::fmt::Result {
        self.write_start(parent, sink)?;
        if self.children.is_empty() && self.text.is_none() {
            return sink.raw("/>");
        }
        sink.raw(">")?;
        if let Some(text) = &self.text {
            sink.escaped(text)?;
        }
        for child in &self.children {
            child.write(Some(self), sink)?;
        }
        sink.raw("</")?;
        sink.raw(&self.name)?;
        sink.raw(">")
    }

    /// Size of the serialized element in bytes.
    pub fn str_size(&self) -> usize {
        let mut counter = SizeCounter(0);
        // Counting cannot fail.
        let _ = self.write(None, &mut counter);
        counter.0
    }

    #[allow(
        clippy::inherent_to_string_shadow_display,
        reason = "prereserving exact capacity avoids reallocations while serializing"
    )]
    pub fn to_string(&self) -> String {
        let mut s = String::with_capacity(self.str_size());
        let _ = self.write(None, &mut Writer(&mut s));
        s
    }

    /// Serializes only the start tag, without closing the element.
    ///
    /// This is used for the stream header which stays open for the
    /// lifetime of the stream.
    pub fn start_tag(&self) -> String {
        let mut s = String::new();
        let mut writer = Writer(&mut s);
        let _ = self
            .write_start(None, &mut writer)
            .and_then(|_| writer.raw(">"));
        s
    }
}

fn write_attribute(sink: &mut impl Sink, name: &str, value: &str) -> std::fmt::Result {
    sink.raw(" ")?;
    sink.raw(name)?;
    sink.raw("=\"")?;
    sink.escaped(value)?;
    sink.raw("\"")
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write(None, &mut Writer(f))
    }
}
