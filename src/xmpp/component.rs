/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! External components (XEP-0114).
//!
//! A component connects to a server under its own domain and proves the
//! shared secret with a handshake digest instead of SASL. There is no
//! encryption, resource binding or session on these streams.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use sha1::Digest;
use sha1::Sha1;
use tracing::debug;
use tracing::info;

use crate::Element;
use crate::constants::COMPONENT_PORT;
use crate::constants::ns;

use super::BoxedTransport;
use super::ConnectionError;
use super::Jid;
use super::StreamCondition;
use super::Transport;
use super::client::connect_tcp;
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
use super::connection::Wire;
use super::connection::next_stanza;
use super::connection::session_started;
use super::connection::spawn;
use super::error::description;
use super::protocol;

/// Handshake value for a stream: the hex SHA-1 of the stream id and the secret.
pub fn handshake_digest(stream_id: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(stream_id.as_bytes());
    hasher.update(secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(40), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

/// Component side of the stream negotiation.
pub(crate) struct ComponentNegotiator {
    domain: Jid,
    secret: String,
}

impl ComponentNegotiator {
    pub(crate) fn start(&mut self, wire: &mut Wire) {
        let header = protocol::stream_header(
            ns::COMPONENT_ACCEPT,
            None,
            Some(self.domain.domainpart()),
            None,
        );
        wire.shared.send_header(&header);
    }

    pub(crate) fn stream_open(&mut self, wire: &mut Wire, header: &Element) -> Result<Flow, ConnectionError> {
        if header.get_attribute("xmlns") != Some(ns::COMPONENT_ACCEPT) {
            return Err(ConnectionError::Protocol(
                StreamCondition::InvalidNamespace,
                description::BAD_HEADER,
            ));
        }
        let Some(id) = header.get_attribute("id").filter(|id| !id.is_empty()) else {
            return Err(ConnectionError::Protocol(
                StreamCondition::InvalidXml,
                description::NO_STREAM_ID,
            ));
        };
        wire.shared.set_stream_id(Some(id));
        debug!(id, "sending handshake");
        wire.send(&protocol::handshake(Some(&handshake_digest(id, &self.secret))));
        Ok(Flow::Next)
    }

    pub(crate) fn stanza(&mut self, wire: &mut Wire, stanza: Element) -> Result<Flow, ConnectionError> {
        if wire.shared.state().is_authenticated() {
            wire.dispatch(stanza);
            return Ok(Flow::Next);
        }
        if !stanza.is("handshake", ns::COMPONENT_ACCEPT) {
            return Err(ConnectionError::Protocol(
                StreamCondition::PolicyViolation,
                description::UNEXPECTED_ELEMENT,
            ));
        }
        info!(domain = %self.domain, "component authenticated");
        wire.shared.set_jid(self.domain.clone());
        wire.shared.advance(ConnectionState::Authenticated)?;
        wire.shared.advance(ConnectionState::SessionStarted)?;
        Ok(Flow::Next)
    }
}

pub struct ComponentBuilder {
    domain: Jid,
    secret: String,
    server: Option<String>,
    config: ConnectionConfig,
    handlers: Vec<(String, String, Arc<dyn StanzaHandler>)>,
}

impl ComponentBuilder {
    pub fn new(domain: Jid, secret: &str) -> Self {
        ComponentBuilder {
            domain: domain.to_bare(),
            secret: secret.to_string(),
            server: None,
            config: ConnectionConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Server to connect, with an optional port. The component domain otherwise.
    pub fn server(mut self, server: Option<String>) -> Self {
        self.server = server;
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
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
        Shared::new(Role::Component, self.config.clone(), handlers, None)
    }

    /// Connects over TCP, port 5347 unless the server names one.
    pub async fn connect(self) -> Result<XmppComponent, ConnectionError> {
        let (shared, events) = self.prepare();
        shared.set_state(ConnectionState::Connecting)?;
        let host = self
            .server
            .clone()
            .unwrap_or_else(|| self.domain.domainpart().to_string());
        let stream = connect_tcp(&host, COMPONENT_PORT, self.config.connection_timeout).await?;
        self.launch(shared, events, Box::new(stream))
    }

    pub async fn connect_transport<T: Transport>(self, transport: T) -> Result<XmppComponent, ConnectionError> {
        let (shared, events) = self.prepare();
        shared.set_state(ConnectionState::Connecting)?;
        self.launch(shared, events, Box::new(transport))
    }

    fn launch(
        self,
        shared: Arc<Shared>,
        events: EventReceiver,
        transport: BoxedTransport,
    ) -> Result<XmppComponent, ConnectionError> {
        let negotiator = ComponentNegotiator {
            domain: self.domain,
            secret: self.secret,
        };
        let wire = Wire::new(shared.clone(), transport)?;
        shared.set_state(ConnectionState::Connected)?;
        shared.set_flags(AccessFlags::ALL);
        spawn(wire, Negotiator::Component(negotiator));
        Ok(XmppComponent {
            connection: Connection::new(shared),
            events,
        })
    }
}

/// An external component connection and its events.
pub struct XmppComponent {
    connection: Connection,
    events: EventReceiver,
}

impl XmppComponent {
    pub fn builder(domain: Jid, secret: &str) -> ComponentBuilder {
        ComponentBuilder::new(domain, secret)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn send(&self, element: &Element) -> Result<(), ConnectionError> {
        self.connection.send(element)
    }

    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    pub async fn wait_for_stanza(&mut self) -> Result<Element, ConnectionError> {
        next_stanza(&mut self.events).await
    }

    /// Waits until the server accepted the handshake.
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
