//! Connection registry - the set of currently open connections.
//!
//! Pure bookkeeping owned by the `HubActor`. Every operation is total:
//! registering a present id or unregistering an absent one is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};

use codeplay_core::ConnectionId;

/// Outbound queue of one connection, carrying pre-encoded protocol lines.
///
/// Bounded: a recipient that stops draining only fills its own queue.
pub type Outbox = mpsc::Sender<Arc<str>>;

/// A registered connection.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Where broadcasts for this connection are queued
    pub outbox: Outbox,

    /// When the connection was registered
    pub connected_at: DateTime<Utc>,
}

/// Outcome of delivering one line to every selected recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Recipients whose queue accepted the line
    pub delivered: usize,

    /// Recipients skipped because their queue was full
    pub dropped_full: usize,

    /// Recipients skipped because their writer already went away
    pub dropped_closed: usize,
}

impl FanOutReport {
    /// Total number of recipients the line was addressed to.
    pub fn addressed(&self) -> usize {
        self.delivered + self.dropped_full + self.dropped_closed
    }
}

/// Set of currently open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, Recipient>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns false (and keeps the existing entry)
    /// if the id is already registered.
    pub fn register(&mut self, id: ConnectionId, outbox: Outbox) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(
            id,
            Recipient {
                outbox,
                connected_at: Utc::now(),
            },
        );
        true
    }

    /// Removes a connection. Returns the removed entry, or `None` if the
    /// id was not registered.
    pub fn unregister(&mut self, id: &ConnectionId) -> Option<Recipient> {
        self.entries.remove(id)
    }

    /// Number of registered connections.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Recipient> {
        self.entries.get(id)
    }

    /// Removes every connection, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Queues `line` for every registered connection except `exclude`.
    ///
    /// Never waits: each recipient gets a non-blocking enqueue, and a full
    /// or closed queue only costs that recipient this one line.
    pub fn fan_out(&self, line: &Arc<str>, exclude: Option<&ConnectionId>) -> FanOutReport {
        let mut report = FanOutReport::default();

        for (id, recipient) in &self.entries {
            if exclude == Some(id) {
                continue;
            }

            match recipient.outbox.try_send(Arc::clone(line)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(connection_id = %id, "Outbox full, dropping delivery");
                    report.dropped_full += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "Outbox closed, dropping delivery");
                    report.dropped_closed += 1;
                }
            }
        }

        report
    }
}
