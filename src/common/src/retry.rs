//! C1 — bounded exponential-backoff retry with cancellation (§4.1).

use crate::error::ProviderErrorKind;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The delay before the `attempt`-th retry (0-indexed), clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, a `Permanent` error is returned, the cancellation
/// token fires, or `MaxRetries` attempts are exhausted (whichever comes first).
///
/// A `Permanent` error short-circuits without consuming retry budget — this
/// refines the distilled contract ("failure only when `op` keeps failing for
/// `MaxRetries` attempts") by acting on the taxonomy §7 already establishes:
/// retrying an authorization failure ten times wastes the whole backoff window.
pub async fn run<F, Fut, T>(
    cancel: &CancellationToken,
    config: RetryConfig,
    name: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderErrorKind>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(anyhow::anyhow!("{name} cancelled"));
            }
            outcome = op() => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_permanent() => {
                return Err(anyhow::anyhow!(err).context(format!("{name} failed permanently")));
            }
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_retries {
                    return Err(
                        anyhow::anyhow!(err).context(format!(
                            "{name} failed after {attempt} attempts"
                        )),
                    );
                }

                let delay = config.delay_for_attempt(attempt - 1);
                warn!(attempt, ?delay, "{name} failed, retrying: {err}");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(anyhow::anyhow!("{name} cancelled during backoff"));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_sequence_clamps_to_max() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_secs(40));
        assert_eq!(cfg.delay_for_attempt(4), Duration::from_secs(60));
        assert_eq!(cfg.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = run(&cancel, RetryConfig::default(), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderErrorKind>(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        };
        let result = run(&cancel, cfg, "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ProviderErrorKind::transient(anyhow::anyhow!("boom")))
            } else {
                Ok::<_, ProviderErrorKind>("done")
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let result: anyhow::Result<()> = run(&cancel, cfg, "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderErrorKind::permanent(anyhow::anyhow!("denied")))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let result: anyhow::Result<()> = run(&cancel, cfg, "my-op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderErrorKind::transient(anyhow::anyhow!("boom")))
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("my-op failed after 3 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_surfaces_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: anyhow::Result<()> = run(&cancel, RetryConfig::default(), "op", || async {
            Err(ProviderErrorKind::transient(anyhow::anyhow!("boom")))
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("cancelled"));
    }
}
