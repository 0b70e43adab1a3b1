use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Why a one-shot refresh timer is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Backoff after a failed refresh attempt.
    Retry,

    /// Short wait after a new symbol was added.
    WarmUp,
}

struct ArmedTimer {
    id: u64,
    purpose: TimerPurpose,
    handle: JoinHandle<()>,
}

/// Single slot holding at most one outstanding one-shot timer.
///
/// Arming cancels whatever is in the slot first, so there is never
/// more than one live timer per coordinator. A timer that fires
/// clears itself from the slot before running its callback.
#[derive(Default)]
pub struct RefreshTimer {
    slot: Arc<Mutex<Option<ArmedTimer>>>,
    next_id: AtomicU64,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer that runs `on_fire` after `delay`, replacing any
    /// outstanding one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, delay: Duration, purpose: TimerPurpose, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // The slot stays locked until the new entry is stored, so a
        // zero-delay timer cannot clear the slot before it is filled.
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.take() {
            previous.handle.abort();
        }

        let shared = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            {
                let mut slot = shared.lock();
                if slot.as_ref().is_some_and(|t| t.id == id) {
                    *slot = None;
                }
            }
            on_fire();
        });

        *slot = Some(ArmedTimer { id, purpose, handle });
    }

    /// Cancels the outstanding timer, if any.
    pub fn cancel(&self) -> Option<TimerPurpose> {
        let armed = self.slot.lock().take()?;
        armed.handle.abort();
        Some(armed.purpose)
    }

    /// Cancels the outstanding timer only if it was armed for `purpose`.
    pub fn cancel_if(&self, purpose: TimerPurpose) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(armed) if armed.purpose == purpose => {
                if let Some(armed) = slot.take() {
                    armed.handle.abort();
                }
                true
            }
            _ => false,
        }
    }

    /// Purpose of the outstanding timer.
    pub fn armed(&self) -> Option<TimerPurpose> {
        self.slot.lock().as_ref().map(|t| t.purpose)
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
