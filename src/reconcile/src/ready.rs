//! A once-closeable readiness gate (§5): "the `ReadyChan` close happens-before
//! the orchestrator observes the close and before any downstream reconciler
//! proceeds." `tokio::sync::Notify` gives us exactly that ordering without a
//! channel buffer to manage.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
pub struct ReadySignal {
    closed: AtomicBool,
    notify: Notify,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: closing an already-closed signal is a no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_closed() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_returns_immediately_once_closed() {
        let signal = ReadySignal::new();
        signal.close();
        signal.wait().await;
        assert!(signal.is_closed());
    }

    #[tokio::test]
    async fn wait_blocks_until_closed() {
        let signal = Arc::new(ReadySignal::new());
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        signal.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("wait should unblock after close")
            .unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let signal = ReadySignal::new();
        signal.close();
        signal.close();
        assert!(signal.is_closed());
    }
}
