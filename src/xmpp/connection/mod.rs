/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! The connection state machine.
//!
//! Every connection runs two tasks. The reader feeds the received bytes to
//! the stream parser and hands the events to the role specific negotiator.
//! The writer sends the payloads of the write queue. Both tasks park on
//! the access flags, so reads can be paused during a transport upgrade and
//! writes can be cut off when a disconnect runs out of time.

mod config;
mod event;
mod queue;
mod reader;
mod state;
mod writer;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::io::WriteHalf;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::Element;
use crate::StreamParser;
use crate::constants::STREAM_CLOSE;
use crate::constants::ns;

use super::BindRegistry;
use super::BoxedTransport;
use super::ConnectionError;
use super::Jid;
use super::protocol;

pub use config::ConnectionConfig;
pub use config::TlsPolicy;
pub use event::ConnectionEvent;
pub use event::EventReceiver;
pub use queue::Completion;
pub use queue::WriteOutcome;
pub use state::AccessFlags;
pub use state::ConnectionState;
pub use state::StateError;

pub(crate) use reader::Flow;
pub(crate) use reader::Negotiator;
pub(crate) use reader::Wire;

use queue::WriteQueue;

// Time left for the queue after a write failed.
const FAILED_DRAIN_TIMEOUT: Duration = Duration::from_millis(160);

// Bound of the transport shutdown, a TLS close can block on the peer.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
    Component,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Client => "client",
            Role::Server => "server",
            Role::Component => "component",
        })
    }
}

/// Processes the stanzas whose first child has a given name and namespace.
pub trait StanzaHandler: Send + Sync {
    /// Returns the reply to send, if any.
    fn handle(&self, stanza: &Element) -> Option<Element>;
}

impl<F> StanzaHandler for F
where
    F: Fn(&Element) -> Option<Element> + Send + Sync,
{
    fn handle(&self, stanza: &Element) -> Option<Element> {
        self(stanza)
    }
}

/// Stanza handlers keyed by the namespace and local name of the payload.
#[derive(Clone, Default)]
pub(crate) struct Handlers {
    map: HashMap<(String, String), Arc<dyn StanzaHandler>>,
}

impl Handlers {
    pub(crate) fn new(config: &ConnectionConfig) -> Self {
        let mut handlers = Handlers::default();
        if config.auto_reply_ping {
            handlers.insert(ns::PING, "ping", Arc::new(reply_ping));
        }
        handlers
    }

    pub(crate) fn insert(&mut self, namespace: &str, name: &str, handler: Arc<dyn StanzaHandler>) {
        self.map
            .insert((namespace.to_string(), name.to_string()), handler);
    }

    fn find(&self, stanza: &Element) -> Option<&Arc<dyn StanzaHandler>> {
        let payload = stanza.first_child()?;
        let key = (
            payload.namespace()?.to_string(),
            payload.local_name().to_string(),
        );
        self.map.get(&key)
    }
}

fn reply_ping(stanza: &Element) -> Option<Element> {
    if stanza.name() == "iq" && stanza.get_attribute("type") == Some("get") {
        Some(protocol::iq_result(stanza))
    } else {
        None
    }
}

struct Status {
    state: ConnectionState,
    flags: AccessFlags,
    jid: Option<Jid>,
    stream_id: Option<String>,
    header_sent: bool,
    // Full JID claimed in the bind registry, released at teardown.
    binding: Option<Jid>,
    // Set by the end of the disconnect, the state stays Disconnected.
    torn_down: bool,
}

/// State shared by the connection handle and the two tasks.
pub(crate) struct Shared {
    pub(crate) role: Role,
    pub(crate) config: ConnectionConfig,
    status: Mutex<Status>,
    flags: watch::Sender<AccessFlags>,
    closed: watch::Sender<bool>,
    queue: WriteQueue,
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedTransport>>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    handlers: Handlers,
    registry: Option<Arc<dyn BindRegistry>>,
    // Waiters of request replies keyed by the stanza id.
    pending: Mutex<HashMap<String, oneshot::Sender<Element>>>,
}

async fn wait_flags(
    rx: &mut watch::Receiver<AccessFlags>,
    condition: impl Fn(AccessFlags) -> bool,
) -> bool {
    rx.wait_for(|flags| condition(*flags)).await.is_ok()
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

impl Shared {
    pub(crate) fn new(
        role: Role,
        config: ConnectionConfig,
        handlers: Handlers,
        registry: Option<Arc<dyn BindRegistry>>,
    ) -> (Arc<Shared>, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            role,
            config,
            status: Mutex::new(Status {
                state: ConnectionState::Disconnected,
                flags: AccessFlags::NONE,
                jid: None,
                stream_id: None,
                header_sent: false,
                binding: None,
                torn_down: false,
            }),
            flags: watch::Sender::new(AccessFlags::NONE),
            closed: watch::Sender::new(false),
            queue: WriteQueue::new(),
            writer: tokio::sync::Mutex::new(None),
            events,
            handlers,
            registry,
            pending: Mutex::new(HashMap::new()),
        };
        (Arc::new(shared), receiver)
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // Events are dropped if the application is not listening.
        let _ = self.events.send(event);
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub(crate) fn set_state(&self, next: ConnectionState) -> Result<(), StateError> {
        let previous = {
            let mut status = self.status.lock();
            let previous = status.state;
            if status.torn_down && next != ConnectionState::Disconnected {
                return Err(StateError::TornDown);
            }
            status.state = previous.transition(next)?;
            previous
        };
        if previous != next {
            info!(role = %self.role, from = %previous, to = %next, "state changed");
            self.emit(ConnectionEvent::StateChanged(next));
        }
        Ok(())
    }

    /// Moves to the state unless the connection is already past it.
    pub(crate) fn advance(&self, next: ConnectionState) -> Result<(), StateError> {
        if self.state() < next {
            self.set_state(next)
        } else {
            Ok(())
        }
    }

    pub(crate) fn flags(&self) -> AccessFlags {
        self.status.lock().flags
    }

    pub(crate) fn set_flags(&self, flags: AccessFlags) {
        self.update_flags(|current| current.insert(flags));
    }

    pub(crate) fn clear_flags(&self, flags: AccessFlags) {
        self.update_flags(|current| current.remove(flags));
    }

    fn update_flags(&self, change: impl FnOnce(&mut AccessFlags)) {
        let flags = {
            let mut status = self.status.lock();
            if status.torn_down {
                return;
            }
            change(&mut status.flags);
            status.flags
        };
        self.flags.send_replace(flags);
    }

    pub(crate) fn jid(&self) -> Option<Jid> {
        self.status.lock().jid.clone()
    }

    pub(crate) fn set_jid(&self, jid: Jid) {
        self.status.lock().jid = Some(jid);
    }

    pub(crate) fn stream_id(&self) -> Option<String> {
        self.status.lock().stream_id.clone()
    }

    pub(crate) fn set_stream_id(&self, id: Option<&str>) {
        self.status.lock().stream_id = id.map(str::to_string);
    }

    pub(crate) fn set_binding(&self, jid: Jid) {
        self.status.lock().binding = Some(jid);
    }

    pub(crate) fn registry(&self) -> Option<&Arc<dyn BindRegistry>> {
        self.registry.as_ref()
    }

    pub(crate) fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub(crate) fn new_parser(&self) -> StreamParser {
        StreamParser::with_max_buffer_size(self.config.max_stanza_size)
    }

    pub(crate) fn send(&self, element: &Element) {
        debug!(role = %self.role, element = element.name(), "queued");
        self.queue.push(Bytes::from(element.to_string()));
    }

    pub(crate) fn send_with_completion(&self, element: &Element) -> Completion {
        self.queue
            .push_with_completion(Bytes::from(element.to_string()))
    }

    /// Queues the start tag of an outgoing stream.
    pub(crate) fn send_header(&self, header: &Element) {
        self.status.lock().header_sent = true;
        self.queue.push(Bytes::from(header.start_tag()));
    }

    /// Hands a reply to the request waiting for it.
    ///
    /// Returns the stanza back if it is not a reply to a pending request.
    pub(crate) fn resolve_request(&self, stanza: Element) -> Option<Element> {
        if !protocol::is_response(&stanza) {
            return Some(stanza);
        }
        let waiter = match stanza.get_attribute("id") {
            Some(id) => self.pending.lock().remove(id),
            None => None,
        };
        match waiter {
            Some(waiter) => {
                debug!(role = %self.role, id = stanza.get_attribute("id"), "request answered");
                // The requester may have timed out in the meantime.
                let _ = waiter.send(stanza);
                None
            }
            None => Some(stanza),
        }
    }

    pub(crate) fn drained(&self) -> Completion {
        self.queue.drained()
    }

    pub(crate) fn attach(&self, writer: WriteHalf<BoxedTransport>) -> Result<(), ConnectionError> {
        match self.writer.try_lock() {
            Ok(mut slot) => {
                *slot = Some(writer);
                Ok(())
            }
            Err(_) => Err(ConnectionError::Closed),
        }
    }

    pub(crate) fn writer(&self) -> &tokio::sync::Mutex<Option<WriteHalf<BoxedTransport>>> {
        &self.writer
    }

    // Final state change, no later transition or flag change is accepted.
    fn tear_down(&self) {
        let previous = {
            let mut status = self.status.lock();
            status.torn_down = true;
            status.flags = AccessFlags::NONE;
            std::mem::replace(&mut status.state, ConnectionState::Disconnected)
        };
        // Dropping the waiters fails the outstanding requests.
        self.pending.lock().clear();
        self.flags.send_replace(AccessFlags::NONE);
        if previous != ConnectionState::Disconnected {
            info!(role = %self.role, from = %previous, to = %ConnectionState::Disconnected, "state changed");
            self.emit(ConnectionEvent::StateChanged(ConnectionState::Disconnected));
        }
        self.closed.send_replace(true);
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.status.lock().torn_down
    }

    /// Reports a fatal error and closes the connection.
    pub(crate) fn fail(self: &Arc<Self>, err: ConnectionError) {
        if self.is_torn_down()
            || (matches!(err, ConnectionError::Closed) && !self.state().is_open())
        {
            debug!(role = %self.role, error = %err, "error after the disconnect");
            return;
        }
        let closing = err
            .condition()
            .map(|condition| protocol::stream_error(condition, None));
        warn!(role = %self.role, error = %err, "connection failed");
        self.emit(ConnectionEvent::Error(err));
        self.begin_disconnect(closing);
    }

    /// First phase of the disconnect.
    ///
    /// Stops the reads and queues the closing payload. The second phase runs
    /// as its own task. Returns false if a disconnect is already running.
    pub(crate) fn begin_disconnect(self: &Arc<Self>, closing: Option<Element>) -> bool {
        let header_sent = {
            let mut status = self.status.lock();
            if !status.state.is_open() {
                return false;
            }
            status.state = ConnectionState::Disconnecting;
            status.header_sent
        };
        info!(role = %self.role, "disconnecting");
        self.emit(ConnectionEvent::StateChanged(ConnectionState::Disconnecting));
        self.clear_flags(AccessFlags::READABLE);
        if header_sent && !self.queue.has_failed() {
            if let Some(closing) = closing {
                self.send(&closing);
            }
            self.queue.push(Bytes::from_static(STREAM_CLOSE.as_bytes()));
        }
        tokio::spawn(finish_disconnect(self.clone()));
        true
    }
}

/// Second phase of the disconnect, bounded by the disconnect timeout.
async fn finish_disconnect(shared: Arc<Shared>) {
    let timeout = if shared.queue.has_failed() {
        FAILED_DRAIN_TIMEOUT
    } else {
        shared.config.effective_disconnect_timeout()
    };
    let drained = shared.queue.drained();
    if tokio::time::timeout(timeout, drained.wait()).await.is_err() {
        debug!(role = %shared.role, "write queue did not drain in time");
    }

    shared.clear_flags(AccessFlags::WRITABLE);
    let cancelled = shared.queue.cancel_all();
    if cancelled > 0 {
        debug!(role = %shared.role, cancelled, "cancelled queued writes");
    }
    let writer = shared.writer.lock().await.take();
    if let Some(mut writer) = writer {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await;
    }
    let binding = shared.status.lock().binding.take();
    if let (Some(jid), Some(registry)) = (binding, &shared.registry) {
        debug!(jid = %jid, "released binding");
        registry.release(&jid);
    }
    shared.tear_down();
}

/// Starts the reader and writer tasks of a connection.
pub(crate) fn spawn(wire: Wire, negotiator: Negotiator) {
    tokio::spawn(writer::write_loop(wire.shared.clone()));
    tokio::spawn(reader::read_loop(wire, negotiator));
}

/// Handle of a running connection.
///
/// Cloning the handle is cheap, every clone refers to the same connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Connection { shared }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn flags(&self) -> AccessFlags {
        self.shared.flags()
    }

    /// Authenticated address, the full JID once a resource is bound.
    pub fn jid(&self) -> Option<Jid> {
        self.shared.jid()
    }

    /// Id of the current stream, assigned by the server.
    pub fn stream_id(&self) -> Option<String> {
        self.shared.stream_id()
    }

    fn check_open(&self) -> Result<(), ConnectionError> {
        if !self.shared.state().is_open() || self.shared.queue.has_failed() {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    /// Queues an element for sending.
    pub fn send(&self, element: &Element) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.shared.send(element);
        Ok(())
    }

    /// Queues an element and waits until it is written to the transport.
    pub async fn send_awaiting_completion(&self, element: &Element) -> Result<(), ConnectionError> {
        self.check_open()?;
        match self.shared.send_with_completion(element).wait().await {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::Failed => Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "transport write failed",
            ))),
            WriteOutcome::Cancelled => Err(ConnectionError::Closed),
        }
    }

    /// Sends a stanza and waits for the reply with the same id.
    ///
    /// A stanza without an id gets a generated one. The reply is a stanza of
    /// type result or error, which is not delivered as an event.
    pub async fn request(&self, stanza: &Element, wait: Duration) -> Result<Element, ConnectionError> {
        self.check_open()?;
        let mut stanza = stanza.clone();
        let id = match stanza.get_attribute("id") {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().simple().to_string();
                stanza.set_attribute("id", Some(&id));
                id
            }
        };
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);
        self.shared.send(&stanza);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(ConnectionError::Timeout("waiting for a reply"))
            }
        }
    }

    /// Closes the stream gracefully and waits for the connection to end.
    ///
    /// The optional element, usually a stream error, is sent before the
    /// stream close tag.
    pub async fn disconnect(&self, closing: Option<Element>) {
        self.shared.begin_disconnect(closing);
        self.closed().await;
    }

    /// Resolves once the connection is fully disconnected.
    pub async fn closed(&self) {
        let mut closed = self.shared.closed.subscribe();
        wait_closed(&mut closed).await;
    }
}

/// Waits for the next stanza, skipping the other events.
pub(crate) async fn next_stanza(events: &mut EventReceiver) -> Result<Element, ConnectionError> {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Stanza(stanza) => return Ok(stanza),
            ConnectionEvent::Error(err) => return Err(err),
            ConnectionEvent::StreamClose => return Err(ConnectionError::Closed),
            _ => {}
        }
    }
    Err(ConnectionError::Closed)
}

/// Waits until the negotiation is complete.
pub(crate) async fn session_started(
    connection: &Connection,
    events: &mut EventReceiver,
) -> Result<(), ConnectionError> {
    if connection.state() == ConnectionState::SessionStarted {
        return Ok(());
    }
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::StateChanged(ConnectionState::SessionStarted) => return Ok(()),
            ConnectionEvent::StateChanged(ConnectionState::Disconnecting) => {
                return Err(ConnectionError::Closed);
            }
            ConnectionEvent::Error(err) => return Err(err),
            _ => {}
        }
    }
    Err(ConnectionError::Closed)
}
