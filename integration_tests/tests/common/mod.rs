//! An in-memory `CloudProvider` double for end-to-end orchestrator tests —
//! no AWS credentials or network access required.

use async_trait::async_trait;
use chrono::Utc;
use lumina_common::error::ProviderErrorKind;
use lumina_common::model::{
    AccountId, Instance, InstanceType, OperatingSystem, Region, ReservedInstance, SavingsPlan,
    Tenancy,
};
use lumina_common::provider::{CloudProvider, ProviderResult, SpRateRow, SpotPriceRow};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeCloudProvider {
    instances: Mutex<HashMap<(AccountId, Region), Vec<Instance>>>,
    reserved_instances: Mutex<HashMap<AccountId, Vec<ReservedInstance>>>,
    savings_plans: Mutex<HashMap<AccountId, Vec<SavingsPlan>>>,
    on_demand: Mutex<HashMap<(Region, InstanceType, OperatingSystem), f64>>,
    spot_prices: Mutex<Vec<SpotPriceRow>>,
    sp_rates: Mutex<Vec<SpRateRow>>,
    fail_on_demand_pricing: bool,
}

impl FakeCloudProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(self, account: &str, region: &str, instances: Vec<Instance>) -> Self {
        self.instances
            .lock()
            .unwrap()
            .insert((account.to_string(), region.to_string()), instances);
        self
    }

    pub fn with_reserved_instances(self, account: &str, ris: Vec<ReservedInstance>) -> Self {
        self.reserved_instances.lock().unwrap().insert(account.to_string(), ris);
        self
    }

    pub fn with_savings_plans(self, account: &str, sps: Vec<SavingsPlan>) -> Self {
        self.savings_plans.lock().unwrap().insert(account.to_string(), sps);
        self
    }

    pub fn with_on_demand_price(self, region: &str, instance_type: &str, os: OperatingSystem, rate: f64) -> Self {
        self.on_demand
            .lock()
            .unwrap()
            .insert((region.to_string(), InstanceType::from(instance_type), os), rate);
        self
    }

    pub fn failing_on_demand_pricing() -> Self {
        Self {
            fail_on_demand_pricing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CloudProvider for FakeCloudProvider {
    async fn list_instances(&self, account: &AccountId, region: &Region) -> ProviderResult<Vec<Instance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .get(&(account.clone(), region.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_reserved_instances(
        &self,
        account: &AccountId,
        _regions: &[Region],
    ) -> ProviderResult<Vec<ReservedInstance>> {
        Ok(self.reserved_instances.lock().unwrap().get(account).cloned().unwrap_or_default())
    }

    async fn list_savings_plans(&self, account: &AccountId) -> ProviderResult<Vec<SavingsPlan>> {
        Ok(self.savings_plans.lock().unwrap().get(account).cloned().unwrap_or_default())
    }

    async fn describe_savings_plan_rates(
        &self,
        _account: &AccountId,
        savings_plan: &SavingsPlan,
        instance_types: &[InstanceType],
        regions: &[Region],
        oses: &[OperatingSystem],
        tenancies: &[Tenancy],
    ) -> ProviderResult<Vec<SpRateRow>> {
        let rows = self
            .sp_rates
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.savings_plan_arn == savings_plan.savings_plan_arn
                    && instance_types.contains(&r.instance_type)
                    && regions.contains(&r.region)
                    && tenancies.contains(&r.tenancy)
                    && oses.iter().any(|os| match os {
                        OperatingSystem::Windows => r.product_description == "Windows",
                        _ => r.product_description != "Windows",
                    })
            })
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn describe_spot_price_history(
        &self,
        _account: &AccountId,
        _region: &Region,
        instance_types: &[InstanceType],
        product_descriptions: &[String],
    ) -> ProviderResult<Vec<SpotPriceRow>> {
        let rows = self
            .spot_prices
            .lock()
            .unwrap()
            .iter()
            .filter(|r| instance_types.contains(&r.instance_type) && product_descriptions.contains(&r.product_description))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn load_all_on_demand_pricing(
        &self,
        regions: &[Region],
        oses: &[OperatingSystem],
    ) -> ProviderResult<HashMap<(Region, InstanceType, OperatingSystem), f64>> {
        if self.fail_on_demand_pricing {
            return Err(always_failing_provider_error());
        }

        let table = self
            .on_demand
            .lock()
            .unwrap()
            .iter()
            .filter(|((region, _, os), _)| regions.contains(region) && oses.contains(os))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Ok(table)
    }
}

pub fn always_failing_provider_error() -> ProviderErrorKind {
    ProviderErrorKind::permanent(anyhow::anyhow!("test provider failure"))
}

pub fn sample_instance(id: &str, account: &str, region: &str) -> Instance {
    Instance {
        instance_id: id.to_string(),
        instance_type: InstanceType::from("m5.xlarge"),
        region: region.to_string(),
        availability_zone: format!("{region}a"),
        account_id: account.to_string(),
        state: lumina_common::model::InstanceState::Running,
        lifecycle: lumina_common::model::Lifecycle::OnDemand,
        tenancy: Tenancy::Default,
        platform: lumina_common::model::Platform::Linux,
        launch_time: Utc::now(),
    }
}
