pub mod allocation;
pub mod cache;
pub mod debounce;

pub use allocation::{compute, publish_metrics, AllocationResult, EngineConfig};
pub use cache::{Ec2Cache, PricingCache, RispCache, RispStats};
pub use debounce::Debouncer;
