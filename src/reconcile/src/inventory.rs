//! `InventoryReconciler` (C3, §4.3): periodic bulk fan-out per
//! `(account, region)` pulling running instances into the `Ec2Cache`.

use crate::fleet::FleetConfig;
use crate::ready::ReadySignal;
use lumina_common::model::DataKind;
use lumina_common::metrics::MetricsSink;
use lumina_common::provider::CloudProvider;
use lumina_engine::{Debouncer, Ec2Cache};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct InventoryReconciler {
    provider: Arc<dyn CloudProvider>,
    cache: Arc<Ec2Cache>,
    metrics: Arc<dyn MetricsSink>,
    fleet: FleetConfig,
    interval: Duration,
    ready: Arc<ReadySignal>,
    debouncer: Arc<Debouncer>,
}

impl InventoryReconciler {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        cache: Arc<Ec2Cache>,
        metrics: Arc<dyn MetricsSink>,
        fleet: FleetConfig,
        interval: Duration,
        ready: Arc<ReadySignal>,
        debouncer: Arc<Debouncer>,
    ) -> Self {
        Self {
            provider,
            cache,
            metrics,
            fleet,
            interval,
            ready,
            debouncer,
        }
    }

    pub fn ready_signal(&self) -> Arc<ReadySignal> {
        self.ready.clone()
    }

    /// First cycle runs immediately (blocking); subsequent cycles on a
    /// ticker. Returns only on cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.run_cycle().await;
        self.ready.close();
        self.debouncer.trigger();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("inventory reconciler cancelled"));
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    self.debouncer.trigger();
                }
            }
        }
    }

    async fn run_cycle(&self) {
        let mut tasks = JoinSet::new();

        for account in &self.fleet.accounts {
            for region in &account.regions {
                let provider = self.provider.clone();
                let account_id = account.account_id.clone();
                let region = region.clone();
                tasks.spawn(async move {
                    let result = provider.list_instances(&account_id, &region).await;
                    (account_id, region, result)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((account_id, region, result)) = joined else {
                continue;
            };

            match result {
                Ok(instances) => {
                    self.cache.set_instances(&account_id, &region, instances).await;
                    self.metrics
                        .set_data_last_success(&account_id, &region, DataKind::Ec2Inventory, true);
                    self.metrics
                        .set_data_freshness_seconds(&account_id, &region, DataKind::Ec2Inventory, 0.0);
                }
                Err(err) => {
                    tracing::warn!(account = %account_id, region = %region, error = %err, "ec2 inventory fetch failed");
                    self.metrics
                        .set_data_last_success(&account_id, &region, DataKind::Ec2Inventory, false);
                }
            }
        }
    }
}
