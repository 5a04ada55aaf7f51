pub mod ec2;
pub mod pricing;
pub mod risp;

pub use ec2::Ec2Cache;
pub use pricing::{build_spot_key, build_sp_rate_key, parse_sp_rate_key, PricingCache};
pub use risp::{RispCache, RispStats};
