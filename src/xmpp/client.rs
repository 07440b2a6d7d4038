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
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;
use tracing::info;

use crate::Element;
use crate::constants::CLIENT_PORT;
use crate::constants::ns;

use super::BoxedTransport;
use super::ConnectionError;
use super::Jid;
use super::RustlsConnector;
use super::SaslCondition;
use super::StanzaCondition;
use super::StreamCondition;
use super::StreamUpgrade;
use super::Transport;
use super::connection::AccessFlags;
use super::connection::Connection;
use super::connection::ConnectionConfig;
use super::connection::ConnectionEvent;
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
use super::connection::next_stanza;
use super::connection::session_started;
use super::connection::spawn;
use super::error::description;
use super::protocol;
use super::protocol::FeatureSet;
use super::sasl::CredentialExchange;
use super::sasl::Exchange;
use super::sasl::MechanismFactory;
use super::sasl::Mechanisms;

const BIND_ID: &str = "bind_1";
const SESSION_ID: &str = "sess_1";

/// Client side of the stream negotiation.
pub(crate) struct ClientNegotiator {
    jid: Jid,
    resource: Option<String>,
    mechanisms: Arc<dyn MechanismFactory>,
    upgrade: Option<Arc<dyn StreamUpgrade>>,
    direct_tls: bool,
    exchange: Option<Box<dyn CredentialExchange>>,
    session_required: bool,
}

impl ClientNegotiator {
    fn upgrade(&self) -> Result<Arc<dyn StreamUpgrade>, ConnectionError> {
        self.upgrade.clone().ok_or(ConnectionError::Protocol(
            StreamCondition::UndefinedCondition,
            description::NO_UPGRADE,
        ))
    }

    fn send_header(&self, wire: &Wire) {
        let header =
            protocol::stream_header(ns::CLIENT, None, Some(self.jid.domainpart()), None);
        wire.shared.send_header(&header);
    }

    pub(crate) async fn start(&mut self, wire: &mut Wire) -> Result<(), ConnectionError> {
        if self.direct_tls {
            let upgrade = self.upgrade()?;
            wire.upgrade(upgrade.as_ref()).await?;
        }
        self.send_header(wire);
        Ok(())
    }

    pub(crate) fn stream_open(&mut self, wire: &mut Wire, header: &Element) -> Result<Flow, ConnectionError> {
        if header.get_attribute("xmlns") != Some(ns::CLIENT) {
            return Err(ConnectionError::Protocol(
                StreamCondition::InvalidNamespace,
                description::BAD_HEADER,
            ));
        }
        wire.shared.set_stream_id(header.get_attribute("id"));
        Ok(Flow::Next)
    }

    pub(crate) async fn stanza(&mut self, wire: &mut Wire, stanza: Element) -> Result<Flow, ConnectionError> {
        if stanza.is("features", ns::STREAM) {
            return self.features(wire, &FeatureSet::parse(&stanza));
        }
        match stanza.namespace() {
            Some(ns::TLS) if stanza.local_name() == "proceed" => return self.proceed(wire).await,
            Some(ns::TLS) => {
                return Err(ConnectionError::Protocol(
                    StreamCondition::UndefinedCondition,
                    description::TLS_REFUSED,
                ));
            }
            Some(ns::SASL) => return self.sasl(wire, &stanza),
            _ => {}
        }
        if !wire.shared.state().is_authenticated() {
            return Err(ConnectionError::Protocol(
                StreamCondition::PolicyViolation,
                description::UNEXPECTED_ELEMENT,
            ));
        }
        if stanza.name() == "iq" {
            match stanza.get_attribute("id") {
                Some(BIND_ID) => return self.bound(wire, &stanza),
                Some(SESSION_ID) => return self.session_started(wire, &stanza),
                _ => {}
            }
        }
        wire.dispatch(stanza);
        Ok(Flow::Next)
    }

    fn features(&mut self, wire: &mut Wire, features: &FeatureSet) -> Result<Flow, ConnectionError> {
        let shared = wire.shared.clone();
        let state = shared.state();
        if state.is_authenticated() {
            if features.bind {
                self.session_required = features.session && !features.session_optional;
                wire.send(&protocol::bind_request(BIND_ID, self.resource.as_deref()));
            } else {
                shared.advance(ConnectionState::SessionStarted)?;
            }
            return Ok(Flow::Next);
        }

        if state < ConnectionState::Encrypted {
            let policy = shared.config.tls_policy;
            if features.starttls && policy != TlsPolicy::Disabled {
                if self.upgrade.is_some() {
                    wire.send(&protocol::starttls(false));
                    return Ok(Flow::Next);
                }
                if policy == TlsPolicy::Required {
                    return Err(ConnectionError::Protocol(
                        StreamCondition::UndefinedCondition,
                        description::NO_UPGRADE,
                    ));
                }
            }
            if policy == TlsPolicy::Required {
                return Err(ConnectionError::Protocol(
                    StreamCondition::PolicyViolation,
                    description::STARTTLS_MISSING,
                ));
            }
            if features.starttls_required {
                return Err(ConnectionError::Protocol(
                    StreamCondition::PolicyViolation,
                    description::STARTTLS_FORCED,
                ));
            }
        }

        let name = self
            .mechanisms
            .names()
            .into_iter()
            .find(|name| features.mechanisms.contains(name));
        let Some(mut exchange) = name.and_then(|name| self.mechanisms.create(&name)) else {
            debug!(offered = ?features.mechanisms, "{}", description::NO_MECHANISM);
            return Err(ConnectionError::Authentication(SaslCondition::InvalidMechanism));
        };
        debug!(mechanism = exchange.mechanism(), "authenticating");
        if let Some(auth) = exchange.initial() {
            wire.send(&auth);
        }
        self.exchange = Some(exchange);
        Ok(Flow::Next)
    }

    async fn proceed(&mut self, wire: &mut Wire) -> Result<Flow, ConnectionError> {
        let upgrade = self.upgrade()?;
        wire.upgrade(upgrade.as_ref()).await?;
        self.send_header(wire);
        Ok(Flow::Restart)
    }

    fn sasl(&mut self, wire: &mut Wire, element: &Element) -> Result<Flow, ConnectionError> {
        let Some(exchange) = self.exchange.as_mut() else {
            return Err(ConnectionError::Protocol(
                StreamCondition::PolicyViolation,
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
                if let Some(reply) = reply {
                    wire.send(&reply);
                }
                self.exchange = None;
                wire.shared.set_jid(self.jid.to_bare());
                wire.shared.advance(ConnectionState::Authenticated)?;
                wire.restart();
                self.send_header(wire);
                Ok(Flow::Restart)
            }
            Exchange::Failure(condition, text) => {
                debug!(%condition, ?text, "authentication failed");
                Err(ConnectionError::Authentication(condition))
            }
        }
    }

    fn bound(&mut self, wire: &mut Wire, result: &Element) -> Result<Flow, ConnectionError> {
        if result.get_attribute("type") == Some("error") {
            let condition = protocol::parse_stanza_error(result)
                .unwrap_or(StanzaCondition::UndefinedCondition);
            return Err(ConnectionError::Bind(condition));
        }
        let jid = result
            .get_child("bind", Some(ns::BIND))
            .and_then(|bind| bind.get_tag("jid", None))
            .ok_or(ConnectionError::Bind(StanzaCondition::UndefinedCondition))?;
        let jid = Jid::new(jid.trim())?;
        info!(jid = %jid, "resource bound");
        wire.shared.set_jid(jid);
        wire.shared.advance(ConnectionState::ResourceBound)?;
        if self.session_required {
            wire.send(&protocol::session_request(SESSION_ID));
        } else {
            wire.shared.advance(ConnectionState::SessionStarted)?;
        }
        Ok(Flow::Next)
    }

    fn session_started(&mut self, wire: &mut Wire, result: &Element) -> Result<Flow, ConnectionError> {
        if result.get_attribute("type") == Some("error") {
            let condition = protocol::parse_stanza_error(result)
                .unwrap_or(StanzaCondition::UndefinedCondition);
            return Err(ConnectionError::Session(condition));
        }
        wire.shared.advance(ConnectionState::SessionStarted)?;
        Ok(Flow::Next)
    }
}

// The resolver needs a port, so the default one is added unless the host
// already has it. IPv6 addresses must be in brackets.
fn has_port(host: &str) -> bool {
    match (host.rfind(':'), host.rfind(']')) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(colon), Some(bracket)) => colon > bracket,
    }
}

async fn resolve_and_connect(host: &str, default_port: u16) -> std::io::Result<TcpStream> {
    if has_port(host) {
        TcpStream::connect(host).await
    } else {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        TcpStream::connect((host, default_port)).await
    }
}

pub(crate) async fn connect_tcp(
    host: &str,
    default_port: u16,
    timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    debug!(host, "connecting");
    let stream = tokio::time::timeout(timeout, resolve_and_connect(host, default_port))
        .await
        .map_err(|_| ConnectionError::Timeout("connecting"))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

pub struct ClientBuilder {
    jid: Jid,
    password: Option<String>,
    resource: Option<String>,
    server: Option<String>,
    config: ConnectionConfig,
    upgrade: Option<Arc<dyn StreamUpgrade>>,
    mechanisms: Option<Arc<dyn MechanismFactory>>,
    direct_tls: bool,
    handlers: Vec<(String, String, Arc<dyn StanzaHandler>)>,
}

impl ClientBuilder {
    pub fn new(jid: Jid) -> Self {
        let resource = jid.resourcepart().map(str::to_string);
        ClientBuilder {
            jid,
            password: None,
            resource,
            server: None,
            config: ConnectionConfig::default(),
            upgrade: None,
            mechanisms: None,
            direct_tls: false,
            handlers: Vec::new(),
        }
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Resource to request at bind time, the server picks one otherwise.
    pub fn resource(mut self, resource: Option<&str>) -> Self {
        self.resource = resource.map(str::to_string);
        self
    }

    /// Host to connect instead of the domain of the JID, with an optional port.
    pub fn server(mut self, server: Option<String>) -> Self {
        self.server = server;
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

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.config.disconnect_timeout = timeout;
        self
    }

    /// Transport upgrade for starttls, a [RustlsConnector] by default.
    pub fn upgrade(mut self, upgrade: Arc<dyn StreamUpgrade>) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    /// Authentication mechanisms, PLAIN with the password by default.
    pub fn mechanisms(mut self, mechanisms: Arc<dyn MechanismFactory>) -> Self {
        self.mechanisms = Some(mechanisms);
        self
    }

    /// Upgrades the transport before sending the stream header.
    pub fn direct_tls(mut self, direct_tls: bool) -> Self {
        self.direct_tls = direct_tls;
        self
    }

    pub fn handler<H: StanzaHandler + 'static>(mut self, namespace: &str, name: &str, handler: H) -> Self {
        self.handlers
            .push((namespace.to_string(), name.to_string(), Arc::new(handler)));
        self
    }

    fn prepare(&self) -> (Arc<Shared>, EventReceiver) {
        let mut handlers = Handlers::new(&self.config);
        for (namespace, name, handler) in &self.handlers {
            handlers.insert(namespace, name, handler.clone());
        }
        Shared::new(Role::Client, self.config.clone(), handlers, None)
    }

    /// Connects over TCP and starts the stream negotiation.
    pub async fn connect(mut self) -> Result<XmppClient, ConnectionError> {
        if self.upgrade.is_none() && self.config.tls_policy != TlsPolicy::Disabled {
            self.upgrade = Some(Arc::new(RustlsConnector::new(self.jid.domainpart())?));
        }
        let (shared, events) = self.prepare();
        shared.set_state(ConnectionState::Connecting)?;
        let host = self
            .server
            .clone()
            .unwrap_or_else(|| self.jid.domainpart().to_string());
        let stream = connect_tcp(&host, CLIENT_PORT, self.config.connection_timeout).await?;
        self.launch(shared, events, Box::new(stream))
    }

    /// Starts the stream negotiation over an already connected transport.
    pub async fn connect_transport<T: Transport>(self, transport: T) -> Result<XmppClient, ConnectionError> {
        let (shared, events) = self.prepare();
        shared.set_state(ConnectionState::Connecting)?;
        self.launch(shared, events, Box::new(transport))
    }

    fn launch(
        self,
        shared: Arc<Shared>,
        events: EventReceiver,
        transport: BoxedTransport,
    ) -> Result<XmppClient, ConnectionError> {
        let mechanisms = match self.mechanisms {
            Some(mechanisms) => mechanisms,
            None => Arc::new(Mechanisms::plain_client(
                self.jid.localpart().unwrap_or_default(),
                self.password.as_deref().unwrap_or_default(),
            )),
        };
        let negotiator = ClientNegotiator {
            jid: self.jid,
            resource: self.resource,
            mechanisms,
            upgrade: self.upgrade,
            direct_tls: self.direct_tls,
            exchange: None,
            session_required: false,
        };
        let wire = Wire::new(shared.clone(), transport)?;
        shared.set_state(ConnectionState::Connected)?;
        shared.set_flags(AccessFlags::ALL);
        spawn(wire, Negotiator::Client(negotiator));
        Ok(XmppClient {
            connection: Connection::new(shared),
            events,
        })
    }
}

/// An XMPP client connection and its events.
pub struct XmppClient {
    connection: Connection,
    events: EventReceiver,
}

impl XmppClient {
    pub fn builder(jid: Jid) -> ClientBuilder {
        ClientBuilder::new(jid)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn send(&self, element: &Element) -> Result<(), ConnectionError> {
        self.connection.send(element)
    }

    /// Next event, None after the connection is gone.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    /// Waits for the next stanza, skipping the other events.
    pub async fn wait_for_stanza(&mut self) -> Result<Element, ConnectionError> {
        next_stanza(&mut self.events).await
    }

    /// Waits until the negotiation is complete.
    pub async fn wait_for_session(&mut self) -> Result<(), ConnectionError> {
        session_started(&self.connection, &mut self.events).await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect(None).await;
    }

    pub fn into_parts(self) -> (Connection, EventReceiver) {
        (self.connection, self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_ports() {
        assert!(!has_port("example.com"));
        assert!(has_port("example.com:5223"));
        assert!(!has_port("[::1]"));
        assert!(has_port("[::1]:5222"));
    }
}
