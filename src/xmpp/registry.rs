/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::HashSet;

use parking_lot::Mutex;

use super::Jid;

/// Full JIDs bound by the connections of a server.
pub trait BindRegistry: Send + Sync {
    /// Claims the JID, returns false if another connection holds it.
    fn try_bind(&self, jid: &Jid) -> bool;

    fn release(&self, jid: &Jid);
}

/// In-memory registry for a single server process.
#[derive(Debug, Default)]
pub struct LocalRegistry {
    bound: Mutex<HashSet<Jid>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, jid: &Jid) -> bool {
        self.bound.lock().contains(jid)
    }

    pub fn len(&self) -> usize {
        self.bound.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.lock().is_empty()
    }
}

impl BindRegistry for LocalRegistry {
    fn try_bind(&self, jid: &Jid) -> bool {
        self.bound.lock().insert(jid.clone())
    }

    fn release(&self, jid: &Jid) {
        self.bound.lock().remove(jid);
    }
}
