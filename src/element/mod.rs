/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod cursor;
mod serialize;

use std::str::FromStr;

use crate::StreamError;
use crate::StreamEvent;
use crate::StreamParser;

pub use cursor::Cursor;

/// A generic XML element.
///
/// Stanzas, stream headers and every payload inside them are represented with this
/// single type. The element owns its children by value, so a subtree can be moved
/// out of its parent and handed over to another task without any cleanup.
///
/// The namespace of an element is resolved when it is parsed or attached to a
/// parent with [add_child()](Element::add_child), and kept when the element is
/// removed from the tree later. Serialization only writes `xmlns` declarations
/// which are not implied by the parent.
///
/// Text content of an element is kept as a single value. Text runs separated by
/// child elements are concatenated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    name: String,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    /// Creates an element without a namespace.
    ///
    /// The name can have a prefix, such as `stream:features`. The namespace is
    /// inherited when the element is attached to a parent.
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Creates an element in the given namespace.
    ///
    /// For prefixed names the prefix declaration is added as an attribute.
    pub fn with_namespace(name: &str, namespace: &str) -> Element {
        let mut element = Element::new(name);
        element.set_namespace(namespace);
        element
    }

    /// Qualified name of the element, including the prefix if any.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the element without the prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Name in `{namespace}local` notation, or the local name without a namespace.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{{{namespace}}}{}", self.local_name()),
            None => self.local_name().to_string(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Sets the namespace and keeps a matching `xmlns` declaration in sync.
    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = Some(namespace.to_string());
        match self.prefix() {
            Some(prefix) => {
                let declaration = format!("xmlns:{prefix}");
                self.set_attribute(&declaration, Some(namespace));
            }
            None => {
                if self.has_attribute("xmlns") {
                    self.set_attribute("xmlns", Some(namespace));
                }
            }
        }
    }

    /// True if the element has the given local name and namespace.
    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.local_name() == name && self.namespace() == Some(namespace)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets or replaces an attribute, or removes it when the value is None.
    pub fn set_attribute(&mut self, name: &str, value: Option<&str>) {
        let existing = self.attributes.iter().position(|(n, _)| n == name);
        match (existing, value) {
            (Some(index), Some(value)) => self.attributes[index].1 = value.to_string(),
            (Some(index), None) => {
                self.attributes.remove(index);
            }
            (None, Some(value)) => self
                .attributes
                .push((name.to_string(), value.to_string())),
            (None, None) => (),
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Chaining version of [set_attribute()](Element::set_attribute).
    pub fn attr(mut self, name: &str, value: &str) -> Element {
        self.set_attribute(name, Some(value));
        self
    }

    /// Chaining version of [add_child()](Element::add_child).
    pub fn child(mut self, child: Element) -> Element {
        self.add_child(child);
        self
    }

    /// Chaining version of [set_value()](Element::set_value).
    pub fn text(mut self, value: &str) -> Element {
        self.set_value(Some(value));
        self
    }

    /// Appends a child element and returns a reference to it.
    ///
    /// A child without a namespace inherits the one in effect at this element.
    pub fn add_child(&mut self, mut child: Element) -> &mut Element {
        if child.namespace.is_none() {
            let inherited = match child.prefix() {
                Some(prefix) => child
                    .prefix_namespace(prefix)
                    .or_else(|| self.prefix_namespace(prefix))
                    .map(str::to_string),
                None => match child.get_attribute("xmlns") {
                    Some(declared) => Some(declared.to_string()).filter(|ns| !ns.is_empty()),
                    None => self.default_namespace().map(str::to_string),
                },
            };
            child.namespace = inherited;
        }
        let default = child.default_namespace().map(str::to_string);
        for grandchild in &mut child.children {
            grandchild.inherit_default_namespace(default.as_deref());
        }
        let index = self.children.len();
        self.children.push(child);
        &mut self.children[index]
    }

    fn inherit_default_namespace(&mut self, namespace: Option<&str>) {
        if self.namespace.is_none() && self.prefix().is_none() {
            self.namespace = match self.get_attribute("xmlns") {
                Some(declared) => Some(declared.to_string()).filter(|ns| !ns.is_empty()),
                None => namespace.map(str::to_string),
            };
        }
        let default = self.default_namespace().map(str::to_string);
        for child in &mut self.children {
            child.inherit_default_namespace(default.as_deref());
        }
    }

    /// Namespace an unprefixed child would be in.
    fn default_namespace(&self) -> Option<&str> {
        match self.get_attribute("xmlns") {
            Some(declared) => Some(declared).filter(|ns| !ns.is_empty()),
            None if self.prefix().is_none() => self.namespace(),
            None => None,
        }
    }

    /// Namespace bound to the prefix at this element.
    fn prefix_namespace(&self, prefix: &str) -> Option<&str> {
        let declaration = format!("xmlns:{prefix}");
        match self.get_attribute(&declaration) {
            Some(declared) => Some(declared),
            None if self.prefix() == Some(prefix) => self.namespace(),
            None => None,
        }
    }

    /// Removes the child at the given position.
    ///
    /// The removed element keeps its resolved namespace.
    pub fn remove_child(&mut self, index: usize) -> Option<Element> {
        if index < self.children.len() {
            Some(self.children.remove(index))
        } else {
            None
        }
    }

    /// Removes the first child with the given local name and optional namespace.
    pub fn remove_tag(&mut self, name: &str, namespace: Option<&str>) -> Option<Element> {
        let index = self.find_child(name, namespace)?;
        self.remove_child(index)
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Element] {
        &mut self.children
    }

    /// First child element, which is the payload for most stanzas.
    pub fn first_child(&self) -> Option<&Element> {
        self.children.first()
    }

    fn find_child(&self, name: &str, namespace: Option<&str>) -> Option<usize> {
        self.children.iter().position(|child| {
            child.local_name() == name
                && match namespace {
                    Some(ns) => child.namespace() == Some(ns),
                    None => true,
                }
        })
    }

    /// First child with the given local name and, if given, namespace.
    pub fn get_child(&self, name: &str, namespace: Option<&str>) -> Option<&Element> {
        self.find_child(name, namespace)
            .map(|index| &self.children[index])
    }

    pub fn get_child_mut(&mut self, name: &str, namespace: Option<&str>) -> Option<&mut Element> {
        self.find_child(name, namespace)
            .map(|index| &mut self.children[index])
    }

    /// Text value of the first matching child.
    pub fn get_tag(&self, name: &str, namespace: Option<&str>) -> Option<&str> {
        self.get_child(name, namespace).and_then(Element::value)
    }

    /// Sets the text value of the first matching child, creating it if needed.
    ///
    /// A None value removes the child.
    pub fn set_tag(&mut self, name: &str, namespace: Option<&str>, value: Option<&str>) {
        match value {
            None => {
                self.remove_tag(name, namespace);
            }
            Some(text) => match self.find_child(name, namespace) {
                Some(index) => self.children[index].set_value(Some(text)),
                None => {
                    let child = match namespace {
                        Some(ns) => Element::with_namespace(name, ns),
                        None => Element::new(name),
                    };
                    self.add_child(child).set_value(Some(text));
                }
            },
        }
    }

    pub fn has_tag(&self, name: &str, namespace: Option<&str>) -> bool {
        self.find_child(name, namespace).is_some()
    }

    pub fn value(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_value(&mut self, value: Option<&str>) {
        self.text = value.map(str::to_string);
    }

    pub(crate) fn append_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    pub(crate) fn set_resolved_namespace(&mut self, namespace: Option<&str>) {
        self.namespace = namespace.map(str::to_string);
    }
}

impl FromStr for Element {
    type Err = StreamError;

    /// Parses a single standalone element.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = StreamParser::new();
        let mut events = Vec::new();
        parser.parse_bytes(s.as_bytes(), &mut events)?;
        parser.parse_finish()?;
        match events.pop() {
            Some(StreamEvent::Stanza(element)) if events.is_empty() => Ok(element),
            _ => Err(StreamError::NotWellFormed(
                crate::stream::description::NOT_SINGLE_ELEMENT,
            )),
        }
    }
}

#[cfg(test)]
mod tests;
