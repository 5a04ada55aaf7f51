//! The `CloudProvider` capability (§6) — the one interface the core depends on
//! instead of talking to the AWS SDK directly. `lumina_aws` supplies the real
//! implementation; tests supply an in-memory one.

use crate::error::ProviderErrorKind;
use crate::model::{
    AccountId, Instance, InstanceType, OperatingSystem, Region, ReservedInstance, SavingsPlan,
    SavingsPlanArn, Tenancy,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub type ProviderResult<T> = Result<T, ProviderErrorKind>;

/// A single Savings-Plan rate returned by `DescribeSavingsPlanRates`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpRateRow {
    pub savings_plan_arn: SavingsPlanArn,
    pub instance_type: InstanceType,
    pub region: Region,
    pub tenancy: Tenancy,
    pub product_description: String,
    pub rate: f64,
}

/// A single spot price point returned by `DescribeSpotPriceHistory`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotPriceRow {
    pub instance_type: InstanceType,
    pub availability_zone: String,
    pub product_description: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// The abstract capability every reconciler is built against.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn list_instances(&self, account: &AccountId, region: &Region)
        -> ProviderResult<Vec<Instance>>;

    async fn list_reserved_instances(
        &self,
        account: &AccountId,
        regions: &[Region],
    ) -> ProviderResult<Vec<ReservedInstance>>;

    async fn list_savings_plans(&self, account: &AccountId) -> ProviderResult<Vec<SavingsPlan>>;

    async fn describe_savings_plan_rates(
        &self,
        account: &AccountId,
        savings_plan: &SavingsPlan,
        instance_types: &[InstanceType],
        regions: &[Region],
        oses: &[OperatingSystem],
        tenancies: &[Tenancy],
    ) -> ProviderResult<Vec<SpRateRow>>;

    async fn describe_spot_price_history(
        &self,
        account: &AccountId,
        region: &Region,
        instance_types: &[InstanceType],
        product_descriptions: &[String],
    ) -> ProviderResult<Vec<SpotPriceRow>>;

    /// `(region, type, os) -> USD/hour` for every combination requested.
    async fn load_all_on_demand_pricing(
        &self,
        regions: &[Region],
        oses: &[OperatingSystem],
    ) -> ProviderResult<HashMap<(Region, InstanceType, OperatingSystem), f64>>;
}
