//! Atomic config snapshot with subscribers (§2, §4.10, §9 "Atomic config
//! snapshots replace dynamic singletons").

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::model::ConfigSnapshot;

/// Holds the current config snapshot behind an atomic pointer. `load()` is
/// the hot path: one atomic load, no locks. `store()` swaps the pointer and
/// notifies anyone watching for reloads.
pub struct LiveConfig {
    current: ArcSwap<ConfigSnapshot>,
    notify: watch::Sender<()>,
}

impl LiveConfig {
    pub fn new(initial: ConfigSnapshot) -> Self {
        let (notify, _rx) = watch::channel(());
        Self {
            current: ArcSwap::from_pointee(initial),
            notify,
        }
    }

    /// Per-request read. Readers always observe one complete snapshot, never
    /// a torn mix of an old and new config.
    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Atomically swap in a new snapshot and wake subscribers.
    pub fn store(&self, new: ConfigSnapshot) {
        self.current.store(Arc::new(new));
        // No receivers is not an error; it just means nobody is watching.
        let _ = self.notify.send(());
    }

    /// Subscribe to reload notifications. The receiver carries no payload;
    /// callers re-`load()` to see the new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.notify.subscribe()
    }
}
