/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;
use std::ops::BitOr;

use thiserror::Error;

/// Negotiation phase of a connection.
///
/// The phases are ordered, and a connection only moves forward through
/// them. The only exception is the final return to `Disconnected`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Encrypted,
    Authenticated,
    ResourceBound,
    SessionStarted,
    Disconnecting,
}

impl ConnectionState {
    /// Checks a transition from this state.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, StateError> {
        if next == ConnectionState::Disconnected || next >= self {
            Ok(next)
        } else {
            Err(StateError::Regression {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_authenticated(self) -> bool {
        self >= ConnectionState::Authenticated && self < ConnectionState::Disconnecting
    }

    /// True while the connection is usable for sending.
    pub fn is_open(self) -> bool {
        self > ConnectionState::Disconnected && self < ConnectionState::Disconnecting
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Encrypted => "encrypted",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::ResourceBound => "resource-bound",
            ConnectionState::SessionStarted => "session-started",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum StateError {
    #[error("connection state cannot go back from {from} to {to}")]
    Regression {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("connection is already torn down")]
    TornDown,
}

/// Read and write permissions of the transport.
///
/// These are independent of the negotiation phase. Reads are paused while
/// the transport is being upgraded, and both directions are closed during
/// the disconnect.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct AccessFlags(u8);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0);
    pub const READABLE: AccessFlags = AccessFlags(1);
    pub const WRITABLE: AccessFlags = AccessFlags(2);
    pub const ALL: AccessFlags = AccessFlags(3);

    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: AccessFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: AccessFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_advance() {
        use ConnectionState::*;
        let order = [
            Disconnected,
            Connecting,
            Connected,
            Encrypted,
            Authenticated,
            ResourceBound,
            SessionStarted,
            Disconnecting,
        ];
        for (i, from) in order.iter().enumerate() {
            for (j, to) in order.iter().enumerate() {
                let result = from.transition(*to);
                if j >= i || *to == Disconnected {
                    assert_eq!(result, Ok(*to));
                } else {
                    assert_eq!(
                        result,
                        Err(StateError::Regression {
                            from: *from,
                            to: *to
                        })
                    );
                }
            }
        }
        // Encryption is optional, skipping it is a forward move.
        assert_eq!(Connected.transition(Authenticated), Ok(Authenticated));
    }

    #[test]
    fn state_predicates() {
        assert!(!ConnectionState::Disconnected.is_open());
        assert!(ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::Disconnecting.is_open());
        assert!(!ConnectionState::Encrypted.is_authenticated());
        assert!(ConnectionState::ResourceBound.is_authenticated());
        assert_eq!(
            StateError::Regression {
                from: ConnectionState::SessionStarted,
                to: ConnectionState::Connected,
            }
            .to_string(),
            "connection state cannot go back from session-started to connected"
        );
    }

    #[test]
    fn flags() {
        let mut flags = AccessFlags::READABLE | AccessFlags::WRITABLE;
        assert_eq!(flags, AccessFlags::ALL);
        flags.remove(AccessFlags::READABLE);
        assert!(!flags.contains(AccessFlags::READABLE));
        assert!(flags.contains(AccessFlags::WRITABLE));
        flags.insert(AccessFlags::READABLE);
        assert!(flags.contains(AccessFlags::ALL));
        assert!(AccessFlags::NONE.contains(AccessFlags::NONE));
    }
}
