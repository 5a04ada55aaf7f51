//! The `Orchestrator`'s debouncer (§4.2): coalesces cache-update bursts into
//! at most one `AllocationEngine` invocation per quiescent window.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Action = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// `Trigger()` (re)arms a timer of `interval`; a trigger received before the
/// timer fires resets it. On fire, `action` runs exactly once.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    pub fn new<F, Fut>(interval: Duration, cancel: CancellationToken, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Box::new(move || Box::pin(action()));
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(Self::run(interval, cancel, rx, action));
        Self { tx }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    async fn run(
        interval: Duration,
        cancel: CancellationToken,
        mut rx: mpsc::UnboundedReceiver<()>,
        action: Action,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                signal = rx.recv() => {
                    if signal.is_none() {
                        return;
                    }
                }
            }

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => break,
                    more = rx.recv() => {
                        if more.is_none() {
                            return;
                        }
                        // a fresh trigger arrived before quiescence: restart the wait
                    }
                }
            }

            (action)().await;
        }
    }
}
