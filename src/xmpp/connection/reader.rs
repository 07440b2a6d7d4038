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

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use crate::Element;
use crate::StreamEvent;
use crate::StreamParser;
use crate::constants::ns;
use crate::xmpp::BoxedTransport;
use crate::xmpp::ConnectionError;
use crate::xmpp::StanzaCondition;
use crate::xmpp::StreamCondition;
use crate::xmpp::StreamUpgrade;
use crate::xmpp::client::ClientNegotiator;
use crate::xmpp::component::ComponentNegotiator;
use crate::xmpp::error::description;
use crate::xmpp::protocol;
use crate::xmpp::server::ServerNegotiator;

use super::AccessFlags;
use super::ConnectionEvent;
use super::ConnectionState;
use super::SHUTDOWN_TIMEOUT;
use super::Shared;
use super::WriteOutcome;
use super::wait_closed;
use super::wait_flags;

/// What the read loop does with the rest of a received batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Flow {
    Next,
    /// The stream restarted, the remaining events belong to the old stream.
    Restart,
    Stop,
}

/// Role specific handling of the stream negotiation.
pub(crate) enum Negotiator {
    Client(ClientNegotiator),
    Server(ServerNegotiator),
    Component(ComponentNegotiator),
}

impl Negotiator {
    async fn start(&mut self, wire: &mut Wire) -> Result<(), ConnectionError> {
        match self {
            Negotiator::Client(client) => client.start(wire).await,
            Negotiator::Server(_) => Ok(()),
            Negotiator::Component(component) => {
                component.start(wire);
                Ok(())
            }
        }
    }

    fn stream_open(&mut self, wire: &mut Wire, header: &Element) -> Result<Flow, ConnectionError> {
        match self {
            Negotiator::Client(client) => client.stream_open(wire, header),
            Negotiator::Server(server) => server.stream_open(wire, header),
            Negotiator::Component(component) => component.stream_open(wire, header),
        }
    }

    async fn stanza(&mut self, wire: &mut Wire, stanza: Element) -> Result<Flow, ConnectionError> {
        match self {
            Negotiator::Client(client) => client.stanza(wire, stanza).await,
            Negotiator::Server(server) => server.stanza(wire, stanza).await,
            Negotiator::Component(component) => component.stanza(wire, stanza),
        }
    }
}

/// The receiving half of a connection and its stream parser.
pub(crate) struct Wire {
    reader: Option<ReadHalf<BoxedTransport>>,
    parser: StreamParser,
    pub(crate) shared: Arc<Shared>,
}

impl Wire {
    pub(crate) fn new(shared: Arc<Shared>, transport: BoxedTransport) -> Result<Wire, ConnectionError> {
        let (reader, writer) = tokio::io::split(transport);
        shared.attach(writer)?;
        Ok(Wire {
            reader: Some(reader),
            parser: shared.new_parser(),
            shared,
        })
    }

    pub(crate) fn send(&self, element: &Element) {
        self.shared.send(element);
    }

    /// Starts parsing a new stream from the peer.
    pub(crate) fn restart(&mut self) {
        self.parser.reset();
    }

    /// Swaps the transport for an upgraded one.
    ///
    /// Reads are paused for the duration. The queued writes are drained to the
    /// old transport first, then the handshake runs on the reunited halves.
    pub(crate) async fn upgrade(&mut self, upgrade: &dyn StreamUpgrade) -> Result<(), ConnectionError> {
        let shared = self.shared.clone();
        shared.clear_flags(AccessFlags::READABLE);

        let drained = shared.drained();
        match tokio::time::timeout(shared.config.upgrade_drain_timeout, drained.wait()).await {
            Ok(WriteOutcome::Written) => {}
            Ok(_) => return Err(ConnectionError::Closed),
            Err(_) => return Err(ConnectionError::Timeout("draining writes for the upgrade")),
        }

        if !shared.state().is_open() {
            return Err(ConnectionError::Closed);
        }
        shared.clear_flags(AccessFlags::WRITABLE);
        let writer = shared.writer().lock().await.take();
        let (Some(reader), Some(writer)) = (self.reader.take(), writer) else {
            return Err(ConnectionError::Protocol(
                StreamCondition::InternalServerError,
                description::NO_TRANSPORT,
            ));
        };
        let transport = reader.unsplit(writer);
        let upgraded =
            tokio::time::timeout(shared.config.tls_handshake_timeout, upgrade.upgrade(transport))
                .await
                .map_err(|_| ConnectionError::Timeout("negotiating tls"))??;

        // The disconnect may have run its course during the handshake, then
        // the upgraded transport has no owner and is closed here.
        let mut slot = shared.writer().lock().await;
        if !shared.state().is_open() {
            drop(slot);
            let mut upgraded = upgraded;
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, upgraded.shutdown()).await;
            debug!("connection closed during the upgrade");
            return Err(ConnectionError::Closed);
        }
        let (reader, writer) = tokio::io::split(upgraded);
        *slot = Some(writer);
        drop(slot);
        self.reader = Some(reader);
        self.parser.reset();
        shared.advance(ConnectionState::Encrypted)?;
        if shared.state().is_open() {
            shared.set_flags(AccessFlags::ALL);
        }
        debug!("transport upgraded");
        Ok(())
    }

    /// Routes a stanza received after the negotiation.
    ///
    /// Replies to pending requests go to their waiters. Otherwise a handler
    /// registered for the payload gets the first chance. Stanzas
    /// without one are delivered to the application, or answered with
    /// feature-not-implemented when delivery is off.
    pub(crate) fn dispatch(&self, stanza: Element) {
        let Some(stanza) = self.shared.resolve_request(stanza) else {
            return;
        };
        if let Some(handler) = self.shared.handlers().find(&stanza) {
            if let Some(reply) = handler.handle(&stanza) {
                self.send(&reply);
            }
            return;
        }
        let is_stanza = matches!(stanza.name(), "iq" | "message" | "presence");
        if is_stanza && self.shared.config.deliver_stanzas {
            self.shared.emit(ConnectionEvent::Stanza(stanza));
            return;
        }
        if !protocol::is_response(&stanza) {
            debug!(element = stanza.name(), "not implemented");
            self.send(&protocol::stanza_error(
                &stanza,
                StanzaCondition::FeatureNotImplemented,
            ));
        }
    }

    async fn handle(
        &mut self,
        event: StreamEvent,
        negotiator: &mut Negotiator,
    ) -> Result<Flow, ConnectionError> {
        match event {
            StreamEvent::Open(header) => {
                self.shared.emit(ConnectionEvent::StreamOpen(header.clone()));
                negotiator.stream_open(self, &header)
            }
            StreamEvent::Stanza(stanza) if stanza.is("error", ns::STREAM) => {
                let (condition, text) = protocol::parse_stream_error(&stanza);
                Err(ConnectionError::Remote(condition, text))
            }
            StreamEvent::Stanza(stanza) => negotiator.stanza(self, stanza).await,
            StreamEvent::Close => {
                debug!("peer closed the stream");
                self.shared.emit(ConnectionEvent::StreamClose);
                self.shared.begin_disconnect(None);
                Ok(Flow::Stop)
            }
        }
    }

    async fn process(
        &mut self,
        bytes: &[u8],
        negotiator: &mut Negotiator,
    ) -> Result<(), ConnectionError> {
        trace!(bytes = %String::from_utf8_lossy(bytes), "received");
        let mut events = Vec::new();
        let parsed = self.parser.parse_bytes(bytes, &mut events);
        for event in events {
            if self.handle(event, negotiator).await? != Flow::Next {
                return Ok(());
            }
        }
        parsed.map_err(ConnectionError::from)
    }
}

/// Reads from the transport while the connection is readable.
#[instrument(name = "reader", skip_all, fields(role = %wire.shared.role))]
pub(super) async fn read_loop(mut wire: Wire, mut negotiator: Negotiator) {
    let shared = wire.shared.clone();
    let mut flags = shared.flags.subscribe();
    let mut closed = shared.closed.subscribe();
    if let Err(err) = negotiator.start(&mut wire).await {
        shared.fail(err);
    }
    let mut buffer = vec![0; shared.config.recv_buffer_size];
    loop {
        tokio::select! {
            readable = wait_flags(&mut flags, |f| f.contains(AccessFlags::READABLE)) => {
                if !readable {
                    break;
                }
            }
            _ = wait_closed(&mut closed) => break,
        }
        let Some(reader) = wire.reader.as_mut() else {
            break;
        };
        let read = tokio::select! {
            read = reader.read(&mut buffer) => read,
            _ = wait_flags(&mut flags, |f| !f.contains(AccessFlags::READABLE)) => continue,
            _ = wait_closed(&mut closed) => break,
        };
        match read {
            Ok(0) => {
                debug!("transport closed by peer");
                shared.begin_disconnect(None);
                break;
            }
            Ok(n) => {
                if let Err(err) = wire.process(&buffer[..n], &mut negotiator).await {
                    shared.fail(err);
                }
            }
            Err(err) => {
                shared.fail(err.into());
                break;
            }
        }
    }
    debug!("reader stopped");
}
