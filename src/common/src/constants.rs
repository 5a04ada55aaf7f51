//! Defaults named throughout §6/§8. Centralized so the config loader and the
//! engine's fallback-multiplier lookup agree on the same numbers.

use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-west-2";

pub const DEFAULT_EC2_RECONCILE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RISP_RECONCILE_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_PRICING_RECONCILE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SPOT_PRICING_RECONCILE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_SP_RATE_RECONCILE_INTERVAL: Duration = Duration::from_secs(15);

pub const DEFAULT_SPOT_PRICE_CACHE_EXPIRATION: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_ACCOUNT_VALIDATION_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_HEALTH_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Tier-2 (estimated) fallback multiplier for EC2-Instance Savings Plans,
/// applied to the on-demand rate when no accurate rate is cached (§4.9).
pub const DEFAULT_EC2_INSTANCE_SP_DISCOUNT: f64 = 0.72;
/// Tier-2 fallback multiplier for Compute Savings Plans.
pub const DEFAULT_COMPUTE_SP_DISCOUNT: f64 = 0.66;

/// Debounce window: at most one allocation pass per quiescent window (§4.2).
pub const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Float comparison epsilon used throughout the allocation engine (§3, §8).
pub const EPSILON: f64 = 1e-9;

pub const LUMINA_ENV_PREFIX: &str = "LUMINA";
