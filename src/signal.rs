//! Mutation signalling between cache containers and the saver
//!
//! Containers raise a signal whenever their persisted contents change.
//! The signal is a generation counter published on a `watch` channel, so a
//! listener only learns that *something* changed since it last looked and a
//! burst of raises collapses into a single wake-up.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared "state changed" signal
#[derive(Debug, Clone)]
pub struct MutationSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl MutationSignal {
    /// Create a new signal at generation 0
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Record a mutation. Never blocks, works with no listeners.
    pub fn raise(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    /// Number of mutations raised so far
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Subscribe to future mutations
    pub fn subscribe(&self) -> MutationListener {
        MutationListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for MutationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`MutationSignal`]
#[derive(Debug)]
pub struct MutationListener {
    rx: watch::Receiver<u64>,
}

impl MutationListener {
    /// Wait until a mutation newer than the last observed one is raised.
    ///
    /// Returns the generation seen. Mutations raised before `subscribe`
    /// are not reported.
    pub async fn changed(&mut self) -> u64 {
        // The sender lives inside the signal we were created from, and
        // every holder of the signal keeps it alive.
        if self.rx.changed().await.is_err() {
            return *self.rx.borrow();
        }
        *self.rx.borrow_and_update()
    }
}
