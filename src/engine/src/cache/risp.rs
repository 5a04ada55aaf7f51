//! Reserved Instance / Savings Plan inventory cache (§4.2).

use chrono::{DateTime, Utc};
use lumina_common::model::{AccountId, ReservedInstance, Region, SavingsPlan};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, Default)]
pub struct RispStats {
    pub reserved_instance_count: usize,
    pub savings_plan_count: usize,
}

#[derive(Default)]
pub struct RispCache {
    reserved_instances: RwLock<HashMap<(Region, AccountId), Vec<ReservedInstance>>>,
    savings_plans: RwLock<HashMap<AccountId, Vec<SavingsPlan>>>,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl RispCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update_reserved_instances(
        &self,
        region: &Region,
        account: &AccountId,
        list: Vec<ReservedInstance>,
    ) {
        self.reserved_instances
            .write()
            .await
            .insert((region.clone(), account.clone()), list);
        *self.last_update.write().await = Some(Utc::now());
    }

    pub async fn update_savings_plans(&self, account: &AccountId, list: Vec<SavingsPlan>) {
        self.savings_plans.write().await.insert(account.clone(), list);
        *self.last_update.write().await = Some(Utc::now());
    }

    pub async fn get_all_reserved_instances(&self) -> Vec<ReservedInstance> {
        self.reserved_instances
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn get_all_savings_plans(&self) -> Vec<SavingsPlan> {
        self.savings_plans
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn get_stats(&self) -> (RispStats, Option<DateTime<Utc>>) {
        let ri_count = self.reserved_instances.read().await.values().map(Vec::len).sum();
        let sp_count = self.savings_plans.read().await.values().map(Vec::len).sum();
        (
            RispStats {
                reserved_instance_count: ri_count,
                savings_plan_count: sp_count,
            },
            *self.last_update.read().await,
        )
    }
}
