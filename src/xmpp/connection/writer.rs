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

use tokio::io::AsyncWriteExt;
use tokio::io::WriteHalf;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use crate::xmpp::BoxedTransport;

use super::AccessFlags;
use super::Shared;
use super::WriteOutcome;
use super::wait_closed;
use super::wait_flags;

async fn write_payload(writer: &mut WriteHalf<BoxedTransport>, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Writes the queued payloads in order while the connection is writable.
#[instrument(name = "writer", skip_all, fields(role = %shared.role))]
pub(super) async fn write_loop(shared: Arc<Shared>) {
    let mut flags = shared.flags.subscribe();
    let mut closed = shared.closed.subscribe();
    loop {
        tokio::select! {
            writable = wait_flags(&mut flags, |f| f.contains(AccessFlags::WRITABLE)) => {
                if !writable {
                    break;
                }
            }
            _ = wait_closed(&mut closed) => break,
        }
        let entry = tokio::select! {
            entry = shared.queue.pop() => entry,
            _ = wait_flags(&mut flags, |f| !f.contains(AccessFlags::WRITABLE)) => continue,
            _ = wait_closed(&mut closed) => break,
        };
        if shared.queue.has_failed() {
            entry.complete(WriteOutcome::Failed);
            continue;
        }
        if entry.payload.is_empty() {
            entry.complete(WriteOutcome::Written);
            continue;
        }

        let mut guard = shared.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            entry.complete(WriteOutcome::Cancelled);
            continue;
        };
        let result = tokio::select! {
            result = write_payload(writer, &entry.payload) => result,
            _ = wait_flags(&mut flags, |f| !f.contains(AccessFlags::WRITABLE)) => {
                debug!("write abandoned");
                entry.complete(WriteOutcome::Cancelled);
                continue;
            }
        };
        drop(guard);

        match result {
            Ok(()) => {
                trace!(bytes = %String::from_utf8_lossy(&entry.payload), "sent");
                entry.complete(WriteOutcome::Written);
            }
            Err(err) => {
                shared.queue.mark_failed();
                entry.complete(WriteOutcome::Failed);
                shared.fail(err.into());
            }
        }
    }
    debug!("writer stopped");
}
