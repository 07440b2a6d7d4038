/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Pluggable credential exchange.
//!
//! The connection does not know any authentication mechanism itself. It
//! asks a [MechanismFactory] for a [CredentialExchange] by name and routes
//! the SASL elements of the stream to it until the exchange reports a
//! result.

mod plain;

use crate::Element;

use super::condition::SaslCondition;

pub use plain::PlainClient;
pub use plain::PlainServer;

/// Outcome of one credential exchange step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Exchange {
    /// The exchange needs more data. The element, if any, is sent to the peer.
    Continue(Option<Element>),
    /// Authentication is complete. The element, if any, is sent to the peer.
    Success(Option<Element>),
    /// Authentication failed.
    Failure(SaslCondition, Option<String>),
}

/// One side of a SASL mechanism.
pub trait CredentialExchange: Send {
    fn mechanism(&self) -> &str;

    /// Element which starts the exchange.
    ///
    /// Clients return their `<auth/>` element. Servers start by receiving it,
    /// so they return None.
    fn initial(&mut self) -> Option<Element>;

    /// Processes a SASL element received from the peer.
    fn step(&mut self, element: &Element) -> Exchange;

    /// Identity established by a successful exchange.
    fn authenticated(&self) -> Option<&str>;
}

/// Creates credential exchanges by mechanism name.
pub trait MechanismFactory: Send + Sync {
    /// Supported mechanism names in preference order.
    fn names(&self) -> Vec<String>;

    fn create(&self, name: &str) -> Option<Box<dyn CredentialExchange>>;
}

/// Checks the credentials presented by a client.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, user: &str, password: &str) -> bool;
}

impl<F> PasswordVerifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn verify(&self, user: &str, password: &str) -> bool {
        self(user, password)
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn CredentialExchange> + Send + Sync>;

/// A [MechanismFactory] populated with explicit constructors.
///
/// ```
/// use std::sync::Arc;
/// use ikstream::sasl::{MechanismFactory, Mechanisms};
///
/// let verifier = Arc::new(|user: &str, password: &str| user == "juliet" && password == "r0m30");
/// let mechanisms = Mechanisms::plain_server(verifier);
/// assert_eq!(mechanisms.names(), vec!["PLAIN"]);
/// assert!(mechanisms.create("PLAIN").is_some());
/// assert!(mechanisms.create("X-OAUTH2").is_none());
/// ```
#[derive(Default)]
pub struct Mechanisms {
    entries: Vec<(String, Constructor)>,
}

impl Mechanisms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mechanism after the already registered ones.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> Box<dyn CredentialExchange> + Send + Sync + 'static,
    {
        self.entries.push((name.to_string(), Box::new(constructor)));
    }

    /// Client mechanisms authenticating with the given password.
    pub fn plain_client(user: &str, password: &str) -> Self {
        let user = user.to_string();
        let password = password.to_string();
        let mut mechanisms = Mechanisms::new();
        mechanisms.register(plain::NAME, move || {
            Box::new(PlainClient::new(None, &user, &password))
        });
        mechanisms
    }

    /// Server mechanisms checking passwords with the verifier.
    pub fn plain_server<V: PasswordVerifier + 'static>(verifier: std::sync::Arc<V>) -> Self {
        let mut mechanisms = Mechanisms::new();
        mechanisms.register(plain::NAME, move || {
            Box::new(PlainServer::new(verifier.clone()))
        });
        mechanisms
    }
}

impl MechanismFactory for Mechanisms {
    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn create(&self, name: &str) -> Option<Box<dyn CredentialExchange>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, constructor)| constructor())
    }
}
