/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::Element;

/// Read-only navigation inside an element tree.
///
/// Elements do not point back at their parents. The cursor keeps the path
/// from the root instead, so the parent of the current element is always
/// reachable while the tree is borrowed.
///
/// ```
/// use ikstream::Element;
///
/// let iq: Element = "<iq><query xmlns='jabber:iq:roster'><item/></query></iq>".parse().unwrap();
/// let mut cursor = iq.cursor();
/// assert!(cursor.down_tag("query", None));
/// assert!(cursor.down(0));
/// assert_eq!(cursor.element().name(), "item");
/// assert_eq!(cursor.parent().map(Element::name), Some("query"));
/// ```
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    ancestors: Vec<&'a Element>,
    current: &'a Element,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(root: &'a Element) -> Self {
        Cursor {
            ancestors: Vec::new(),
            current: root,
        }
    }

    pub fn element(&self) -> &'a Element {
        self.current
    }

    /// Parent of the current element, None at the root.
    pub fn parent(&self) -> Option<&'a Element> {
        self.ancestors.last().copied()
    }

    /// Number of steps from the root.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Moves to the child at the given position.
    pub fn down(&mut self, index: usize) -> bool {
        match self.current.children().get(index) {
            Some(child) => {
                self.ancestors.push(self.current);
                self.current = child;
                true
            }
            None => false,
        }
    }

    /// Moves to the first child with the given local name and namespace.
    pub fn down_tag(&mut self, name: &str, namespace: Option<&str>) -> bool {
        match self.current.get_child(name, namespace) {
            Some(child) => {
                self.ancestors.push(self.current);
                self.current = child;
                true
            }
            None => false,
        }
    }

    /// Moves to the parent, fails at the root.
    pub fn up(&mut self) -> bool {
        match self.ancestors.pop() {
            Some(parent) => {
                self.current = parent;
                true
            }
            None => false,
        }
    }

    /// Moves to the following sibling of the current element.
    pub fn next_sibling(&mut self) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        let siblings = parent.children();
        let position = siblings
            .iter()
            .position(|sibling| std::ptr::eq(sibling, self.current));
        match position.and_then(|index| siblings.get(index + 1)) {
            Some(next) => {
                self.current = next;
                true
            }
            None => false,
        }
    }
}

impl Element {
    /// Starts navigating the tree rooted at this element.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }
}
