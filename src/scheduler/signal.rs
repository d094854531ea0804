use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct SignalState {
    fired: AtomicBool,
    notify: Notify,
}

/// One-shot completion notification shared by a job and its executor.
///
/// Firing is idempotent: only the first call wakes waiters, later calls
/// return `false` and do nothing else. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    state: Arc<SignalState>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self.state.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.notify.notify_waiters();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Wait until the signal has fired. Returns immediately if it already has.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `fire` between the check and the await is not missed.
            let notified = self.state.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fire_is_idempotent() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[test]
    fn clones_share_state() {
        let signal = CompletionSignal::new();
        let other = signal.clone();
        other.fire();
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn wait_returns_after_fire() {
        let signal = CompletionSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.fire();
        signal.fire();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_on_fired_signal_is_immediate() {
        let signal = CompletionSignal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .expect("already fired signal should not block");
    }
}
