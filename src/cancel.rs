//! Tab identity tracking
//!
//! Only one module is displayed at a time. [`ActiveTab`] records which
//! activation currently owns the display, and each module's refresh loop
//! holds an [`ActivationToken`] it checks between ticks. Switching tabs
//! never interrupts a device read; the loop notices at its next check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sentinel meaning no module is active
const NONE_ACTIVE: u64 = 0;

/// Shared record of the currently displayed module
#[derive(Debug, Clone, Default)]
pub struct ActiveTab {
    current: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
}

impl ActiveTab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a new activation current, superseding any previous one
    pub fn activate(&self) -> ActivationToken {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(id, Ordering::SeqCst);
        ActivationToken {
            active: Arc::clone(&self.current),
            mine: id,
        }
    }

    /// Mark no module as active
    pub fn deactivate(&self) {
        self.current.store(NONE_ACTIVE, Ordering::SeqCst);
    }

    pub fn current_id(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// A module activation's claim on the display
#[derive(Debug, Clone)]
pub struct ActivationToken {
    active: Arc<AtomicU64>,
    mine: u64,
}

impl ActivationToken {
    /// A token from a private registry that stays active until dropped
    pub fn standalone() -> Self {
        ActiveTab::new().activate()
    }

    pub fn id(&self) -> u64 {
        self.mine
    }

    /// True while this activation still owns the display
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.mine
    }
}
