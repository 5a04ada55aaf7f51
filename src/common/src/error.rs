//! The error taxonomy behind §7: reconcilers and `RetryDriver` only ever need
//! to know whether a provider failure is worth retrying.

use thiserror::Error;

/// Tags a `CloudProvider` failure as retryable or terminal, per §7's taxonomy.
///
/// Reconcilers downgrade both kinds to a `data_last_success=0` gauge and keep
/// going; only `RetryDriver` treats them differently (a `Permanent` error
/// aborts the retry loop immediately rather than burning its budget).
#[derive(Error, Debug)]
pub enum ProviderErrorKind {
    /// Network error, throttling, 5xx — worth retrying.
    #[error("transient provider error: {source}")]
    Transient {
        #[source]
        source: anyhow::Error,
    },
    /// Authorization failure, malformed request — retrying won't help.
    #[error("permanent provider error: {source}")]
    Permanent {
        #[source]
        source: anyhow::Error,
    },
}

impl ProviderErrorKind {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        ProviderErrorKind::Transient { source: err.into() }
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        ProviderErrorKind::Permanent { source: err.into() }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderErrorKind::Permanent { .. })
    }
}
