/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::Element;
use crate::constants::ns;
use crate::xmpp::condition::SaslCondition;
use crate::xmpp::protocol;

use super::CredentialExchange;
use super::Exchange;
use super::PasswordVerifier;

pub(super) const NAME: &str = "PLAIN";

/// Client side of the PLAIN mechanism (RFC 4616).
pub struct PlainClient {
    message: String,
    user: String,
    authenticated: bool,
}

impl PlainClient {
    pub fn new(authzid: Option<&str>, user: &str, password: &str) -> Self {
        let mut message = Vec::new();
        message.extend_from_slice(authzid.unwrap_or_default().as_bytes());
        message.push(0);
        message.extend_from_slice(user.as_bytes());
        message.push(0);
        message.extend_from_slice(password.as_bytes());
        PlainClient {
            message: STANDARD.encode(message),
            user: user.to_string(),
            authenticated: false,
        }
    }
}

impl CredentialExchange for PlainClient {
    fn mechanism(&self) -> &str {
        NAME
    }

    fn initial(&mut self) -> Option<Element> {
        Some(protocol::auth(NAME, Some(&self.message)))
    }

    fn step(&mut self, element: &Element) -> Exchange {
        if element.namespace() != Some(ns::SASL) {
            return Exchange::Failure(SaslCondition::MalformedRequest, None);
        }
        match element.local_name() {
            "success" => {
                self.authenticated = true;
                Exchange::Success(None)
            }
            "failure" => {
                let (condition, text) = protocol::parse_sasl_failure(element);
                Exchange::Failure(condition, text)
            }
            _ => Exchange::Failure(SaslCondition::MalformedRequest, None),
        }
    }

    fn authenticated(&self) -> Option<&str> {
        self.authenticated.then_some(self.user.as_str())
    }
}

/// Server side of the PLAIN mechanism.
///
/// The message is `authzid NUL authcid NUL password`. A message without the
/// authorization identity is accepted too.
pub struct PlainServer {
    verifier: Arc<dyn PasswordVerifier>,
    user: Option<String>,
    challenged: bool,
}

impl PlainServer {
    pub fn new(verifier: Arc<dyn PasswordVerifier>) -> Self {
        PlainServer {
            verifier,
            user: None,
            challenged: false,
        }
    }

    fn check(&mut self, data: &str) -> Exchange {
        let Ok(message) = STANDARD.decode(data) else {
            return Exchange::Failure(SaslCondition::IncorrectEncoding, None);
        };
        let parts: Vec<&[u8]> = message.split(|c| *c == 0).collect();
        let (authzid, user, password) = match parts.as_slice() {
            [authzid, user, password] => (*authzid, *user, *password),
            [user, password] => (&[][..], *user, *password),
            _ => return Exchange::Failure(SaslCondition::MalformedRequest, None),
        };
        let (Ok(authzid), Ok(user), Ok(password)) = (
            std::str::from_utf8(authzid),
            std::str::from_utf8(user),
            std::str::from_utf8(password),
        ) else {
            return Exchange::Failure(SaslCondition::MalformedRequest, None);
        };
        if user.is_empty() {
            return Exchange::Failure(SaslCondition::MalformedRequest, None);
        }
        if !authzid.is_empty() && authzid != user && !authzid.starts_with(&format!("{user}@")) {
            return Exchange::Failure(SaslCondition::InvalidAuthzid, None);
        }
        if !self.verifier.verify(user, password) {
            return Exchange::Failure(SaslCondition::NotAuthorized, None);
        }
        self.user = Some(user.to_string());
        Exchange::Success(None)
    }
}

impl CredentialExchange for PlainServer {
    fn mechanism(&self) -> &str {
        NAME
    }

    fn initial(&mut self) -> Option<Element> {
        None
    }

    fn step(&mut self, element: &Element) -> Exchange {
        match (element.local_name(), protocol::sasl_data(element)) {
            ("auth" | "response", Some(data)) if !data.is_empty() => self.check(data),
            ("auth", _) if !self.challenged => {
                self.challenged = true;
                Exchange::Continue(Some(protocol::sasl("challenge", Some(""))))
            }
            _ => Exchange::Failure(SaslCondition::MalformedRequest, None),
        }
    }

    fn authenticated(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> Arc<dyn PasswordVerifier> {
        Arc::new(|user: &str, password: &str| user == "juliet" && password == "r0m30")
    }

    fn response(message: &[u8]) -> Element {
        protocol::sasl("response", Some(&STANDARD.encode(message)))
    }

    #[test]
    fn client_initial_response() {
        let mut client = PlainClient::new(None, "juliet", "r0m30");
        let auth = client.initial().unwrap();
        assert_eq!(auth.get_attribute("mechanism"), Some("PLAIN"));
        assert_eq!(auth.value(), Some("AGp1bGlldAByMG0zMA=="));
        assert_eq!(client.authenticated(), None);
        assert_eq!(
            client.step(&protocol::sasl("success", None)),
            Exchange::Success(None)
        );
        assert_eq!(client.authenticated(), Some("juliet"));
    }

    #[test]
    fn client_failure() {
        let mut client = PlainClient::new(Some("juliet@example.com"), "juliet", "x");
        let failure = protocol::sasl_failure(SaslCondition::AccountDisabled, None);
        assert_eq!(
            client.step(&failure),
            Exchange::Failure(SaslCondition::AccountDisabled, None)
        );
        assert_eq!(client.authenticated(), None);
    }

    #[test]
    fn server_accepts_both_forms() {
        let mut server = PlainServer::new(verifier());
        let mut client = PlainClient::new(None, "juliet", "r0m30");
        let auth = client.initial().unwrap();
        assert_eq!(server.step(&auth), Exchange::Success(None));
        assert_eq!(server.authenticated(), Some("juliet"));

        let mut server = PlainServer::new(verifier());
        assert_eq!(server.step(&response(b"juliet\0r0m30")), Exchange::Success(None));
    }

    #[test]
    fn server_challenges_empty_auth() {
        let mut server = PlainServer::new(verifier());
        match server.step(&protocol::auth("PLAIN", None)) {
            Exchange::Continue(Some(challenge)) => assert_eq!(challenge.local_name(), "challenge"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            server.step(&response(b"\0juliet\0r0m30")),
            Exchange::Success(None)
        );
    }

    #[test]
    fn server_rejects() {
        let mut server = PlainServer::new(verifier());
        assert_eq!(
            server.step(&response(b"\0juliet\0wrong")),
            Exchange::Failure(SaslCondition::NotAuthorized, None)
        );
        assert_eq!(
            server.step(&response(b"romeo\0juliet\0r0m30")),
            Exchange::Failure(SaslCondition::InvalidAuthzid, None)
        );
        assert_eq!(
            server.step(&response(b"juliet")),
            Exchange::Failure(SaslCondition::MalformedRequest, None)
        );
        assert_eq!(
            server.step(&protocol::sasl("response", Some("!!notbase64"))),
            Exchange::Failure(SaslCondition::IncorrectEncoding, None)
        );
        assert_eq!(server.authenticated(), None);
    }
}
