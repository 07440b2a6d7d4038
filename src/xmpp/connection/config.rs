/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

/// Use of transport encryption during the negotiation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TlsPolicy {
    /// The stream must be encrypted before authentication.
    #[default]
    Required,
    /// Encryption is used when both sides support it.
    Optional,
    /// Encryption is never negotiated.
    Disabled,
}

/// Settings shared by the client and server connections.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Size of the transport read buffer.
    pub recv_buffer_size: usize,
    /// Upper bound of the graceful close. Values under one second are raised to one second.
    pub disconnect_timeout: Duration,
    /// How long the queued writes can take before a transport upgrade.
    pub upgrade_drain_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    /// Client only, bound of the TCP connect.
    pub connection_timeout: Duration,
    /// Largest incomplete element kept while waiting for the rest.
    pub max_stanza_size: usize,
    pub tls_policy: TlsPolicy,
    /// Pass stanzas without a handler to the application.
    pub deliver_stanzas: bool,
    /// Answer XEP-0199 pings without involving the application.
    pub auto_reply_ping: bool,
    /// Server only, failed authentications before the stream is closed.
    pub max_auth_attempts: usize,
}

const MIN_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            recv_buffer_size: 4096,
            disconnect_timeout: Duration::from_secs(3),
            upgrade_drain_timeout: Duration::from_secs(5),
            tls_handshake_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(30),
            max_stanza_size: 1024 * 1024,
            tls_policy: TlsPolicy::Required,
            deliver_stanzas: true,
            auto_reply_ping: true,
            max_auth_attempts: 3,
        }
    }
}

impl ConnectionConfig {
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(1);
        self
    }

    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    pub fn upgrade_drain_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_drain_timeout = timeout;
        self
    }

    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.tls_handshake_timeout = timeout;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn max_stanza_size(mut self, size: usize) -> Self {
        self.max_stanza_size = size;
        self
    }

    pub fn tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = policy;
        self
    }

    pub fn deliver_stanzas(mut self, deliver: bool) -> Self {
        self.deliver_stanzas = deliver;
        self
    }

    pub fn auto_reply_ping(mut self, reply: bool) -> Self {
        self.auto_reply_ping = reply;
        self
    }

    pub fn max_auth_attempts(mut self, attempts: usize) -> Self {
        self.max_auth_attempts = attempts.max(1);
        self
    }

    pub(crate) fn effective_disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout.max(MIN_DISCONNECT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.recv_buffer_size, 4096);
        assert_eq!(config.disconnect_timeout, Duration::from_secs(3));
        assert_eq!(config.max_stanza_size, 1024 * 1024);
        assert_eq!(config.tls_policy, TlsPolicy::Required);
        assert!(config.deliver_stanzas && config.auto_reply_ping);
        assert_eq!(config.max_auth_attempts, 3);
    }

    #[test]
    fn disconnect_timeout_floor() {
        let config = ConnectionConfig::default().disconnect_timeout(Duration::from_millis(10));
        assert_eq!(config.effective_disconnect_timeout(), Duration::from_secs(1));
        let config = config.disconnect_timeout(Duration::from_secs(7));
        assert_eq!(config.effective_disconnect_timeout(), Duration::from_secs(7));
    }
}
