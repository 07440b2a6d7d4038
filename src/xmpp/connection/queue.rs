/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::oneshot;

/// Final result of a queued write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    Written,
    Failed,
    Cancelled,
}

/// Receiver side of a write completion.
pub struct Completion(oneshot::Receiver<WriteOutcome>);

impl Completion {
    fn resolved(outcome: WriteOutcome) -> Completion {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Completion(rx)
    }

    pub async fn wait(self) -> WriteOutcome {
        self.0.await.unwrap_or(WriteOutcome::Cancelled)
    }
}

pub(crate) struct Entry {
    pub(crate) payload: Bytes,
    completion: Option<oneshot::Sender<WriteOutcome>>,
}

impl Entry {
    pub(crate) fn complete(self, outcome: WriteOutcome) {
        if let Some(completion) = self.completion {
            let _ = completion.send(outcome);
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: VecDeque<Entry>,
    failed: bool,
}

/// Ordered queue of outgoing payloads.
///
/// A single writer task consumes the entries in order. Once a write fails
/// the queue stays failed and refuses new entries.
#[derive(Default)]
pub(crate) struct WriteQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self, payload: Bytes, completion: Option<oneshot::Sender<WriteOutcome>>) {
        let mut inner = self.inner.lock();
        if inner.failed {
            drop(inner);
            Entry {
                payload,
                completion,
            }
            .complete(WriteOutcome::Failed);
            return;
        }
        inner.entries.push_back(Entry {
            payload,
            completion,
        });
        drop(inner);
        self.notify.notify_one();
    }

    pub(crate) fn push(&self, payload: Bytes) {
        self.enqueue(payload, None);
    }

    pub(crate) fn push_with_completion(&self, payload: Bytes) -> Completion {
        if self.has_failed() {
            return Completion::resolved(WriteOutcome::Failed);
        }
        let (tx, rx) = oneshot::channel();
        self.enqueue(payload, Some(tx));
        Completion(rx)
    }

    /// Completes once every entry queued before the call is written.
    pub(crate) fn drained(&self) -> Completion {
        self.push_with_completion(Bytes::new())
    }

    /// Waits for the next entry.
    pub(crate) async fn pop(&self) -> Entry {
        loop {
            let entry = self.inner.lock().entries.pop_front();
            if let Some(entry) = entry {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    pub(crate) fn mark_failed(&self) {
        self.inner.lock().failed = true;
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.inner.lock().failed
    }

    /// Resolves every waiting entry as cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        let entries: Vec<Entry> = self.inner.lock().entries.drain(..).collect();
        let count = entries.len();
        for entry in entries {
            entry.complete(WriteOutcome::Cancelled);
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
