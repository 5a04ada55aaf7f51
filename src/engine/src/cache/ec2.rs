//! EC2 inventory cache (§4.2). Each `(account, region)` partition is replaced
//! atomically — a write never exposes a half-updated partition to a reader.

use chrono::{DateTime, Utc};
use lumina_common::model::{AccountId, Instance, InstanceId, Region};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct Ec2Cache {
    partitions: RwLock<HashMap<(AccountId, Region), Vec<Instance>>>,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl Ec2Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_instances(&self, account: &AccountId, region: &Region, instances: Vec<Instance>) {
        self.partitions
            .write()
            .await
            .insert((account.clone(), region.clone()), instances);
        *self.last_update.write().await = Some(Utc::now());
    }

    pub async fn get_all_instances(&self) -> Vec<Instance> {
        self.partitions
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn get_running_instances(&self) -> Vec<Instance> {
        self.get_all_instances()
            .await
            .into_iter()
            .filter(|i| i.state.is_running())
            .collect()
    }

    pub async fn get_instance(&self, id: &InstanceId) -> Option<Instance> {
        self.partitions
            .read()
            .await
            .values()
            .flatten()
            .find(|i| &i.instance_id == id)
            .cloned()
    }

    pub async fn get_instances_by_region(&self, region: &Region) -> Vec<Instance> {
        self.partitions
            .read()
            .await
            .iter()
            .filter(|((_, r), _)| r == region)
            .flat_map(|(_, list)| list.clone())
            .collect()
    }

    pub async fn get_instances_by_account(&self, account: &AccountId) -> Vec<Instance> {
        self.partitions
            .read()
            .await
            .iter()
            .filter(|((a, _), _)| a == account)
            .flat_map(|(_, list)| list.clone())
            .collect()
    }

    pub async fn get_last_update_time(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read().await
    }
}
