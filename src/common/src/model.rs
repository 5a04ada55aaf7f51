//! Core data model shared by every reconciler, cache, and the allocation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AccountId = String;
pub type Region = String;
pub type InstanceId = String;

/// `family.size`, e.g. `m5.xlarge`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceType(pub String);

impl InstanceType {
    /// The family portion before the first `.`, e.g. `m5` for `m5.xlarge`.
    pub fn family(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceType {
    fn from(s: &str) -> Self {
        InstanceType(s.to_string())
    }
}

impl From<String> for InstanceType {
    fn from(s: String) -> Self {
        InstanceType(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    #[serde(rename = "ondemand")]
    OnDemand,
    #[serde(rename = "spot")]
    Spot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tenancy {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "dedicated")]
    Dedicated,
    #[serde(rename = "host")]
    Host,
}

impl fmt::Display for Tenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tenancy::Default => "default",
            Tenancy::Dedicated => "dedicated",
            Tenancy::Host => "host",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "linux")]
    Linux,
    #[serde(rename = "windows")]
    Windows,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        };
        write!(f, "{s}")
    }
}

/// The AWS spot/on-demand "product description" string derived from platform.
pub fn product_description(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "Windows",
        Platform::Linux => "Linux/UNIX",
    }
}

/// Operating system axis used when querying on-demand and SP rate tables.
/// A superset of `Platform` — `pricing.operatingSystems` can include OS
/// variants that never appear as a running instance's `Platform`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingSystem {
    Linux,
    Windows,
    Rhel,
    Suse,
}

impl OperatingSystem {
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Windows => "windows",
            OperatingSystem::Rhel => "rhel",
            OperatingSystem::Suse => "suse",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Some(OperatingSystem::Linux),
            "windows" => Some(OperatingSystem::Windows),
            "rhel" => Some(OperatingSystem::Rhel),
            "suse" => Some(OperatingSystem::Suse),
            _ => None,
        }
    }
}

impl From<Platform> for OperatingSystem {
    fn from(p: Platform) -> Self {
        match p {
            Platform::Linux => OperatingSystem::Linux,
            Platform::Windows => OperatingSystem::Windows,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    Running,
    Stopped,
    Stopping,
    Other(String),
}

impl InstanceState {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "running" => InstanceState::Running,
            "stopped" => InstanceState::Stopped,
            "stopping" => InstanceState::Stopping,
            other => InstanceState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }
}

/// A running (or otherwise tracked) cloud compute unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: InstanceId,
    pub instance_type: InstanceType,
    pub region: Region,
    pub availability_zone: String,
    pub account_id: AccountId,
    pub state: InstanceState,
    pub lifecycle: Lifecycle,
    pub tenancy: Tenancy,
    pub platform: Platform,
    pub launch_time: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservedInstanceScope {
    #[serde(rename = "AZ")]
    Az,
    #[serde(rename = "Region")]
    Region,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservedInstanceState {
    Active,
    PaymentPending,
    Other(String),
}

impl ReservedInstanceState {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "active" => ReservedInstanceState::Active,
            "payment-pending" => ReservedInstanceState::PaymentPending,
            other => ReservedInstanceState::Other(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ReservedInstanceState::Active)
    }
}

pub type ReservedInstanceId = String;

/// A purchased capacity reservation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReservedInstance {
    pub reserved_instance_id: ReservedInstanceId,
    pub instance_type: InstanceType,
    pub instance_count: u32,
    /// Empty for a regional RI.
    pub availability_zone: Option<String>,
    pub region: Region,
    pub account_id: AccountId,
    pub state: ReservedInstanceState,
    pub offering_class: String,
    pub scope: ReservedInstanceScope,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SavingsPlanType {
    #[serde(rename = "EC2Instance")]
    Ec2Instance,
    Compute,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SavingsPlanState {
    Active,
    Other(String),
}

impl SavingsPlanState {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "active" => SavingsPlanState::Active,
            other => SavingsPlanState::Other(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SavingsPlanState::Active)
    }
}

pub type SavingsPlanArn = String;
pub type SavingsPlanId = String;

/// A dollar-per-hour commitment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavingsPlan {
    pub savings_plan_arn: SavingsPlanArn,
    pub savings_plan_id: SavingsPlanId,
    pub account_id: AccountId,
    pub savings_plan_type: SavingsPlanType,
    pub state: SavingsPlanState,
    /// USD/hour.
    pub commitment: f64,
    /// Only meaningful for `SavingsPlanType::Ec2Instance`.
    pub region: Option<Region>,
    /// Only meaningful for `SavingsPlanType::Ec2Instance`.
    pub instance_family: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// `FetchedAt` is when *we* fetched it; staleness is `now - FetchedAt`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpotPriceEntry {
    pub instance_type: InstanceType,
    pub availability_zone: String,
    pub product_description: String,
    pub price: f64,
    /// Timestamp AWS reported for the price point.
    pub timestamp: DateTime<Utc>,
    /// When this entry was written into our cache.
    pub fetched_at: DateTime<Utc>,
}

/// A Savings-Plan rate table entry, or the `NotAvailable` sentinel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpRateValue {
    Rate(f64),
    /// AWS returned no rate for this combination — negative cache.
    NotAvailable,
}

impl SpRateValue {
    pub fn as_positive_rate(&self) -> Option<f64> {
        match self {
            SpRateValue::Rate(r) if *r > 0.0 => Some(*r),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageType {
    OnDemand,
    Spot,
    ReservedInstance,
    Ec2InstanceSavingsPlan,
    ComputeSavingsPlan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingAccuracy {
    Accurate,
    Estimated,
}

/// Per-instance allocation result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceCost {
    pub instance_id: InstanceId,
    pub account_id: AccountId,
    pub region: Region,
    pub instance_type: InstanceType,
    pub platform: Platform,
    /// On-demand rate, USD/hour.
    pub shelf_price: f64,
    pub effective_cost: f64,
    /// Portion billed at on-demand after discounts.
    pub on_demand_cost: f64,
    pub ri_coverage: f64,
    /// Consumed Savings Plan commitment.
    pub savings_plan_coverage: f64,
    pub savings_plan_arn: Option<SavingsPlanArn>,
    pub coverage_type: CoverageType,
    pub pricing_accuracy: PricingAccuracy,
}

/// Per-Savings-Plan output.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavingsPlanUtilization {
    pub current_utilization_rate: f64,
    pub remaining_capacity: f64,
    pub utilization_percent: f64,
}

/// Labels a cache partition for the `data_last_success`/`data_freshness_seconds`
/// gauge families (§6). Factors out the free-form `kind` string the distilled
/// spec leaves implicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Ec2Inventory,
    ReservedInstances,
    SavingsPlans,
    OnDemandPricing,
    SpotPricing,
    SpRates,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Ec2Inventory => "ec2_inventory",
            DataKind::ReservedInstances => "reserved_instances",
            DataKind::SavingsPlans => "savings_plans",
            DataKind::OnDemandPricing => "on_demand_pricing",
            DataKind::SpotPricing => "spot_pricing",
            DataKind::SpRates => "sp_rates",
        }
    }
}
