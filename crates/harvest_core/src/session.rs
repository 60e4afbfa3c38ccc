use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a text run currently is; reported to the UI as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    ResolvingChapters,
    AwaitingConfirmation,
    FetchingChapters,
    Saving,
    Finished,
}

/// "A task is running" flag shared by everyone who can start a run.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot; `None` if another run holds it.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the whole run; dropping it releases the slot on every exit path.
#[derive(Debug)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
