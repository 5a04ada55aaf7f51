//! The `MetricsSink` capability (§6) — out of scope per §1 as a concrete
//! exposition library, but the engine and reconcilers are written against
//! this trait so any exposition backend can be plugged in underneath.

use crate::model::{
    CoverageType, DataKind, InstanceCost, PricingAccuracy, SavingsPlanType, SavingsPlanUtilization,
};

/// Append-only metrics surface. Label cardinality discipline (bounded label
/// sets: account, region, instance type, coverage type, pricing accuracy,
/// platform) is the caller's responsibility, per §5.
pub trait MetricsSink: Send + Sync {
    fn set_data_last_success(&self, account: &str, region: &str, kind: DataKind, success: bool);

    fn set_data_freshness_seconds(
        &self,
        account: &str,
        region: &str,
        kind: DataKind,
        seconds: f64,
    );

    fn set_instance_effective_cost(&self, cost: &InstanceCost);

    fn set_savings_plan_utilization(&self, arn: &str, utilization: &SavingsPlanUtilization);

    /// Active Reserved Instance count for one (account, region, instance type)
    /// group (§4.4, §6).
    fn set_reserved_instance_inventory(&self, account: &str, region: &str, instance_type: &str, count: u32);

    /// A Savings Plan's committed USD/hour, independent of how much of that
    /// commitment is currently being consumed (that's utilization, §6).
    fn set_savings_plan_inventory(
        &self,
        arn: &str,
        account: &str,
        savings_plan_type: SavingsPlanType,
        commitment: f64,
    );
}

/// Discards everything. Used in tests and wherever a sink is required but
/// unobserved.
#[derive(Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn set_data_last_success(&self, _account: &str, _region: &str, _kind: DataKind, _success: bool) {}

    fn set_data_freshness_seconds(
        &self,
        _account: &str,
        _region: &str,
        _kind: DataKind,
        _seconds: f64,
    ) {
    }

    fn set_instance_effective_cost(&self, _cost: &InstanceCost) {}

    fn set_savings_plan_utilization(&self, _arn: &str, _utilization: &SavingsPlanUtilization) {}

    fn set_reserved_instance_inventory(&self, _account: &str, _region: &str, _instance_type: &str, _count: u32) {}

    fn set_savings_plan_inventory(
        &self,
        _arn: &str,
        _account: &str,
        _savings_plan_type: SavingsPlanType,
        _commitment: f64,
    ) {
    }
}

/// Label helper so every call site agrees on the string form of `CoverageType`
/// and `PricingAccuracy` for the `instance_effective_cost` gauge (§6).
pub fn coverage_type_label(coverage: CoverageType) -> &'static str {
    match coverage {
        CoverageType::OnDemand => "on_demand",
        CoverageType::Spot => "spot",
        CoverageType::ReservedInstance => "reserved_instance",
        CoverageType::Ec2InstanceSavingsPlan => "ec2_instance_savings_plan",
        CoverageType::ComputeSavingsPlan => "compute_savings_plan",
    }
}

pub fn pricing_accuracy_label(accuracy: PricingAccuracy) -> &'static str {
    match accuracy {
        PricingAccuracy::Accurate => "accurate",
        PricingAccuracy::Estimated => "estimated",
    }
}

pub fn savings_plan_type_label(savings_plan_type: SavingsPlanType) -> &'static str {
    match savings_plan_type {
        SavingsPlanType::Ec2Instance => "ec2_instance",
        SavingsPlanType::Compute => "compute",
    }
}
