pub mod commitment;
pub mod fleet;
pub mod inventory;
pub mod on_demand_pricing;
pub mod ready;
pub mod sp_rate;
pub mod spot_pricing;

pub use commitment::CommitmentReconciler;
pub use fleet::{AccountSpec, FleetConfig};
pub use inventory::InventoryReconciler;
pub use on_demand_pricing::OnDemandPricingReconciler;
pub use ready::ReadySignal;
pub use sp_rate::SPRateReconciler;
pub use spot_pricing::SpotPricingReconciler;
