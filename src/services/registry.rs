//! Connection registry: live connections and their rate-limit records.
//!
//! DESIGN
//! ======
//! The active set and the last-accepted timestamps live in one struct
//! behind one mutex, so `unregister` removes both in a single critical
//! section and no reader can see a connection in one map but not the other.
//!
//! The mutex is a leaf lock: it is held only for map access and sender
//! cloning, never across an `.await`, and nothing else is locked while it
//! is held. Callers may take it while holding the grid lock, never the
//! reverse.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::message::Outbound;

/// Sender half of a connection's outbound queue.
pub type ClientTx = mpsc::Sender<Outbound>;

#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    clients: HashMap<Uuid, ClientTx>,
    last_accepted: HashMap<Uuid, Instant>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection with no rate-limit record.
    pub fn register(&self, client_id: Uuid, tx: ClientTx) {
        let mut inner = self.lock();
        inner.last_accepted.remove(&client_id);
        inner.clients.insert(client_id, tx);
    }

    /// Remove a connection and its rate-limit record together. Returns
    /// `false` if it was not registered.
    pub fn unregister(&self, client_id: Uuid) -> bool {
        let mut inner = self.lock();
        inner.last_accepted.remove(&client_id);
        inner.clients.remove(&client_id).is_some()
    }

    #[cfg(test)]
    #[must_use]
    pub fn contains(&self, client_id: Uuid) -> bool {
        self.lock().clients.contains_key(&client_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current members and their senders, in one consistent view.
    #[must_use]
    pub fn senders(&self) -> Vec<(Uuid, ClientTx)> {
        self.lock()
            .clients
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }

    #[cfg(test)]
    #[must_use]
    pub fn last_accepted(&self, client_id: Uuid) -> Option<Instant> {
        self.lock().last_accepted.get(&client_id).copied()
    }

    /// Ask `decide` whether to record a new accepted-update timestamp.
    ///
    /// `decide` sees the current record and returns the timestamp to store,
    /// or `None` to reject. Unknown connections are always rejected and
    /// never gain a record.
    pub(crate) fn try_record(
        &self,
        client_id: Uuid,
        decide: impl FnOnce(Option<Instant>) -> Option<Instant>,
    ) -> bool {
        let mut inner = self.lock();
        if !inner.clients.contains_key(&client_id) {
            return false;
        }
        let last = inner.last_accepted.get(&client_id).copied();
        match decide(last) {
            Some(at) => {
                inner.last_accepted.insert(client_id, at);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn record_count(&self) -> usize {
        self.lock().last_accepted.len()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
