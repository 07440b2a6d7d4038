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

use tracing::debug;
use tracing::info;
use uuid::Uuid;

use crate::Element;
use crate::constants::ns;

use super::BindRegistry;
use super::ConnectionError;
use super::Jid;
use super::SaslCondition;
use super::StanzaCondition;
use super::StreamCondition;
use super::StreamUpgrade;
use super::Transport;
use super::connection::AccessFlags;
use super::connection::Connection;
use super::connection::ConnectionConfig;
use super::connection::ConnectionState;
use super::connection::EventReceiver;
use super::connection::Flow;
use super::connection::Handlers;
use super::connection::Negotiator;
use super::connection::Role;
use super::connection::Shared;
use super::connection::StanzaHandler;
use super::connection::TlsPolicy;
use super::connection::Wire;
use super::connection::spawn;
use super::error::description;
use super::protocol;
use super::sasl::CredentialExchange;
use super::sasl::Exchange;
use super::sasl::MechanismFactory;
use super::sasl::Mechanisms;

/// Server side of the stream negotiation.
pub(crate) struct ServerNegotiator {
    domain: String,
    mechanisms: Arc<dyn MechanismFactory>,
    acceptor: Option<Arc<dyn StreamUpgrade>>,
    session_required: bool,
    exchange: Option<Box<dyn CredentialExchange>>,
    failures: usize,
    starttls_offered: bool,
    bound: bool,
}

impl ServerNegotiator {
    pub(crate) fn stream_open(&mut self, wire: &mut Wire, header: &Element) -> Result<Flow, ConnectionError> {
        // The header goes out first so a stream error can follow it.
        let id = Uuid::new_v4().to_string();
        let reply = protocol::stream_header(
            ns::CLIENT,
            Some(&self.domain),
            header.get_attribute("from"),
            Some(&id),
        );
        wire.shared.send_header(&reply);
        wire.shared.set_stream_id(Some(&id));

        if header.get_attribute("xmlns") != Some(ns::CLIENT) {
            return Err(ConnectionError::Protocol(
                StreamCondition::InvalidNamespace,
                description::BAD_HEADER,
            ));
        }
        if let Some(to) = header.get_attribute("to") {
            if !to.eq_ignore_ascii_case(&self.domain) {
                return Err(ConnectionError::Protocol(
                    StreamCondition::HostUnknown,
                    description::HOST_MISMATCH,
                ));
            }
        }
        self.send_features(wire);
        Ok(Flow::Next)
    }

    fn send_features(&mut self, wire: &Wire) {
        let state = wire.shared.state();
        let policy = wire.shared.config.tls_policy;
        let mut features = protocol::features();
        if state.is_authenticated() {
            features.add_child(protocol::bind_feature());
            features.add_child(protocol::session_feature(!self.session_required));
        } else {
            let encrypted = state >= ConnectionState::Encrypted;
            self.starttls_offered =
                !encrypted && self.acceptor.is_some() && policy != TlsPolicy::Disabled;
            if self.starttls_offered {
                features.add_child(protocol::starttls(policy == TlsPolicy::Required));
            }
            if encrypted || policy != TlsPolicy::Required {
                let names = self.mechanisms.names();
                features.add_child(protocol::mechanisms(names.iter().map(String::as_str)));
            }
        }
        wire.send(&features);
    }

    pub(crate) async fn stanza(&mut self, wire: &mut Wire, stanza: Element) -> Result<Flow, ConnectionError> {
        if !wire.shared.state().is_authenticated() {
            return match (stanza.namespace(), stanza.local_name()) {
                (Some(ns::TLS), "starttls") => self.starttls(wire).await,
                (Some(ns::SASL), _) => self.sasl(wire, &stanza),
                _ => Err(ConnectionError::Protocol(
                    StreamCondition::NotAuthorized,
                    description::UNEXPECTED_ELEMENT,
                )),
            };
        }
        if stanza.name() == "iq" && stanza.get_attribute("type") == Some("set") {
            match stanza.first_child() {
                Some(payload) if payload.is("bind", ns::BIND) => return self.bind(wire, &stanza),
                Some(payload) if payload.is("session", ns::SESSION) => {
                    wire.send(&protocol::iq_result(&stanza));
                    wire.shared.advance(ConnectionState::SessionStarted)?;
                    return Ok(Flow::Next);
                }
                _ => {}
            }
        }
        wire.dispatch(stanza);
        Ok(Flow::Next)
    }

    async fn starttls(&mut self, wire: &mut Wire) -> Result<Flow, ConnectionError> {
        let Some(acceptor) = self.acceptor.clone().filter(|_| self.starttls_offered) else {
            return Err(ConnectionError::Protocol(
                StreamCondition::PolicyViolation,
                description::STARTTLS_NOT_OFFERED,
            ));
        };
        wire.shared.clear_flags(AccessFlags::READABLE);
        wire.send(&protocol::proceed());
        wire.upgrade(acceptor.as_ref()).await?;
        self.starttls_offered = false;
        Ok(Flow::Restart)
    }

    fn reject(
        &mut self,
        wire: &Wire,
        condition: SaslCondition,
        text: Option<&str>,
    ) -> Result<Flow, ConnectionError> {
        debug!(%condition, "authentication rejected");
        self.exchange = None;
        wire.send(&protocol::sasl_failure(condition, text));
        self.failures += 1;
        if self.failures >= wire.shared.config.max_auth_attempts {
            return Err(ConnectionError::Protocol(
                StreamCondition::PolicyViolation,
                description::TOO_MANY_ATTEMPTS,
            ));
        }
        Ok(Flow::Next)
    }

    fn sasl(&mut self, wire: &mut Wire, element: &Element) -> Result<Flow, ConnectionError> {
        if wire.shared.config.tls_policy == TlsPolicy::Required
            && wire.shared.state() < ConnectionState::Encrypted
        {
            wire.send(&protocol::sasl_failure(SaslCondition::EncryptionRequired, None));
            return Err(ConnectionError::Authentication(SaslCondition::EncryptionRequired));
        }
        match element.local_name() {
            "auth" => {
                let mechanism = element.get_attribute("mechanism").unwrap_or_default();
                let offered = self.mechanisms.names().iter().any(|name| name == mechanism);
                match self.mechanisms.create(mechanism).filter(|_| offered) {
                    Some(exchange) => self.exchange = Some(exchange),
                    None => return self.reject(wire, SaslCondition::InvalidMechanism, None),
                }
            }
            "abort" => {
                self.exchange = None;
                wire.send(&protocol::sasl_failure(SaslCondition::Aborted, None));
                return Ok(Flow::Next);
            }
            _ => {}
        }
        let Some(exchange) = self.exchange.as_mut() else {
            return Err(ConnectionError::Protocol(
                StreamCondition::NotAuthorized,
                description::UNEXPECTED_ELEMENT,
            ));
        };
        match exchange.step(element) {
            Exchange::Continue(reply) => {
                if let Some(reply) = reply {
                    wire.send(&reply);
                }
                Ok(Flow::Next)
            }
            Exchange::Success(reply) => {
                let user = exchange.authenticated().unwrap_or_default();
                let jid = if user.contains(['@', '/']) {
                    None
                } else {
                    Jid::new(&format!("{user}@{}", self.domain)).ok()
                };
                let Some(jid) = jid else {
                    return self.reject(wire, SaslCondition::NotAuthorized, None);
                };
                info!(jid = %jid, "authenticated");
                self.exchange = None;
                wire.send(&reply.unwrap_or_else(|| protocol::sasl("success", None)));
                wire.shared.set_jid(jid);
                wire.shared.advance(ConnectionState::Authenticated)?;
                wire.restart();
                Ok(Flow::Restart)
            }
            Exchange::Failure(condition, text) => self.reject(wire, condition, text.as_deref()),
        }
    }

    fn bind(&mut self, wire: &mut Wire, iq: &Element) -> Result<Flow, ConnectionError> {
        if self.bound {
            wire.send(&protocol::stanza_error(iq, StanzaCondition::NotAllowed));
            return Ok(Flow::Next);
        }
        let resource = iq
            .first_child()
            .and_then(|bind| bind.get_tag("resource", None))
            .map(str::trim)
            .filter(|resource| !resource.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let Some(jid) = wire
            .shared
            .jid()
            .and_then(|jid| jid.with_resource(&resource).ok())
        else {
            wire.send(&protocol::stanza_error(iq, StanzaCondition::BadRequest));
            return Ok(Flow::Next);
        };
        if let Some(registry) = wire.shared.registry() {
            if !registry.try_bind(&jid) {
                debug!(jid = %jid, "resource conflict");
                wire.send(&protocol::stanza_error(iq, StanzaCondition::Conflict));
                return Ok(Flow::Next);
            }
            wire.shared.set_binding(jid.clone());
        }
        info!(jid = %jid, "resource bound");
        self.bound = true;
        let id = iq.get_attribute("id").unwrap_or_default();
        wire.send(&protocol::bind_result(id, jid.full()));
        wire.shared.set_jid(jid);
        wire.shared.advance(ConnectionState::ResourceBound)?;
        Ok(Flow::Next)
    }
}

pub struct ServerBuilder {
    domain: String,
    mechanisms: Option<Arc<dyn MechanismFactory>>,
    acceptor: Option<Arc<dyn StreamUpgrade>>,
    registry: Option<Arc<dyn BindRegistry>>,
    config: ConnectionConfig,
    session_required: bool,
    handlers: Vec<(String, String, Arc<dyn StanzaHandler>)>,
}

impl ServerBuilder {
    pub fn new(domain: &str) -> Self {
        ServerBuilder {
            domain: domain.to_string(),
            mechanisms: None,
            acceptor: None,
            registry: None,
            config: ConnectionConfig::default(),
            session_required: false,
            handlers: Vec::new(),
        }
    }

    pub fn mechanisms(mut self, mechanisms: Arc<dyn MechanismFactory>) -> Self {
        self.mechanisms = Some(mechanisms);
        self
    }

    /// Transport upgrade offered as starttls, usually a [super::RustlsAcceptor].
    pub fn acceptor(mut self, acceptor: Arc<dyn StreamUpgrade>) -> Self {
        self.acceptor = Some(acceptor);
        self
    }

    /// Registry of bound resources shared by the connections of the server.
    pub fn registry(mut self, registry: Arc<dyn BindRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.config.tls_policy = policy;
        self
    }

    /// Passes unhandled stanzas to the application instead of rejecting them.
    pub fn deliver_stanzas(mut self, deliver: bool) -> Self {
        self.config.deliver_stanzas = deliver;
        self
    }

    /// Advertises session establishment as mandatory.
    pub fn session_required(mut self, required: bool) -> Self {
        self.session_required = required;
        self
    }

    pub fn handler<H: StanzaHandler + 'static>(mut self, namespace: &str, name: &str, handler: H) -> Self {
        self.handlers
            .push((namespace.to_string(), name.to_string(), Arc::new(handler)));
        self
    }

    pub fn build(self) -> XmppServer {
        let mut handlers = Handlers::new(&self.config);
        for (namespace, name, handler) in self.handlers {
            handlers.insert(&namespace, &name, handler);
        }
        XmppServer {
            domain: self.domain,
            mechanisms: self
                .mechanisms
                .unwrap_or_else(|| Arc::new(Mechanisms::new())),
            acceptor: self.acceptor,
            registry: self.registry,
            config: self.config,
            session_required: self.session_required,
            handlers,
        }
    }
}

/// Accepts client streams for a domain.
pub struct XmppServer {
    domain: String,
    mechanisms: Arc<dyn MechanismFactory>,
    acceptor: Option<Arc<dyn StreamUpgrade>>,
    registry: Option<Arc<dyn BindRegistry>>,
    config: ConnectionConfig,
    session_required: bool,
    handlers: Handlers,
}

impl XmppServer {
    pub fn builder(domain: &str) -> ServerBuilder {
        ServerBuilder::new(domain)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Runs the server side of a stream over an accepted transport.
    ///
    /// Must be called within a tokio runtime.
    pub fn accept<T: Transport>(&self, transport: T) -> Result<(Connection, EventReceiver), ConnectionError> {
        let (shared, events) = Shared::new(
            Role::Server,
            self.config.clone(),
            self.handlers.clone(),
            self.registry.clone(),
        );
        let negotiator = ServerNegotiator {
            domain: self.domain.clone(),
            mechanisms: self.mechanisms.clone(),
            acceptor: self.acceptor.clone(),
            session_required: self.session_required,
            exchange: None,
            failures: 0,
            starttls_offered: false,
            bound: false,
        };
        let wire = Wire::new(shared.clone(), Box::new(transport))?;
        shared.set_state(ConnectionState::Connected)?;
        shared.set_flags(AccessFlags::ALL);
        spawn(wire, Negotiator::Server(negotiator));
        Ok((Connection::new(shared), events))
    }
}
