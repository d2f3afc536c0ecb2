//! Debug switches consulted by the sync engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Runtime switches. Checked synchronously, so toggling takes effect for
/// the very next `enqueue`.
#[derive(Debug, Default)]
pub struct SyncFlags {
    syncing_disabled: AtomicBool,
}

static GLOBAL_FLAGS: OnceLock<Arc<SyncFlags>> = OnceLock::new();

impl SyncFlags {
    pub fn new(syncing_disabled: bool) -> Self {
        Self {
            syncing_disabled: AtomicBool::new(syncing_disabled),
        }
    }

    /// Process-wide instance shared by every queue created with defaults.
    pub fn global() -> Arc<SyncFlags> {
        GLOBAL_FLAGS.get_or_init(|| Arc::new(SyncFlags::default())).clone()
    }

    pub fn syncing_disabled(&self) -> bool {
        self.syncing_disabled.load(Ordering::SeqCst)
    }

    pub fn set_syncing_disabled(&self, disabled: bool) {
        let previous = self.syncing_disabled.swap(disabled, Ordering::SeqCst);
        if previous != disabled {
            tracing::info!("Syncing {}", if disabled { "disabled" } else { "enabled" });
        }
    }
}
