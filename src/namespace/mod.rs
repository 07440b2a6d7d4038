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

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace bound to the reserved `xmlns` prefix.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum NamespaceError {
    #[error("prefix '{0}' is reserved and cannot be redefined")]
    Reserved(String),

    #[error("prefix '{0}' cannot be bound to an empty namespace")]
    EmptyNamespace(String),
}

/// Scoped prefix to namespace table.
///
/// A scope is pushed for every element start and popped at its end. The
/// empty prefix holds the default namespace. The root scope carries the
/// reserved `xml` and `xmlns` bindings and is never popped.
#[derive(Debug)]
pub struct NamespaceStack {
    bindings: Vec<(String, String)>,
    // Number of bindings visible at each pushed scope start.
    scopes: Vec<usize>,
}

const ROOT_BINDINGS: usize = 2;

impl NamespaceStack {
    pub fn new() -> Self {
        NamespaceStack {
            bindings: vec![
                ("xml".to_string(), XML_NAMESPACE.to_string()),
                ("xmlns".to_string(), XMLNS_NAMESPACE.to_string()),
            ],
            scopes: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(self.bindings.len());
    }

    /// Drops the innermost scope with its bindings.
    ///
    /// Returns false if only the root scope is left.
    pub fn pop_scope(&mut self) -> bool {
        match self.scopes.pop() {
            Some(start) => {
                self.bindings.truncate(start);
                true
            }
            None => false,
        }
    }

    /// Binds a prefix in the innermost scope.
    pub fn add(&mut self, prefix: &str, uri: &str) -> Result<(), NamespaceError> {
        if prefix == "xml" || prefix == "xmlns" {
            return Err(NamespaceError::Reserved(prefix.to_string()));
        }
        if !prefix.is_empty() && uri.trim().is_empty() {
            return Err(NamespaceError::EmptyNamespace(prefix.to_string()));
        }
        let start = self.scopes.last().copied().unwrap_or(ROOT_BINDINGS);
        match self.bindings[start..].iter_mut().find(|(p, _)| p == prefix) {
            Some(binding) => binding.1 = uri.to_string(),
            None => self.bindings.push((prefix.to_string(), uri.to_string())),
        }
        Ok(())
    }

    /// Finds the nearest binding of the prefix.
    ///
    /// An empty default namespace declaration (`xmlns=''`) undeclares the
    /// default namespace, so it is reported as None.
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Number of pushed scopes above the root.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn reset(&mut self) {
        self.bindings.truncate(ROOT_BINDINGS);
        self.scopes.clear();
    }
}

impl Default for NamespaceStack {
    fn default() -> Self {
        Self::new()
    }
}
