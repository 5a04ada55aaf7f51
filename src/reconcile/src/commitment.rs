//! `CommitmentReconciler` (C4, §4.4): periodic per-account pull of Reserved
//! Instances (regional) and Savings Plans (global) into the `RispCache`.

use crate::fleet::FleetConfig;
use crate::ready::ReadySignal;
use lumina_common::model::{AccountId, DataKind, SavingsPlan};
use lumina_common::metrics::MetricsSink;
use lumina_common::provider::CloudProvider;
use lumina_engine::{Debouncer, RispCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct CommitmentReconciler {
    provider: Arc<dyn CloudProvider>,
    cache: Arc<RispCache>,
    metrics: Arc<dyn MetricsSink>,
    fleet: FleetConfig,
    interval: Duration,
    ready: Arc<ReadySignal>,
    debouncer: Arc<Debouncer>,
    /// Synthetic per-account Savings Plans used instead of the provider —
    /// test hermeticity only (§4.4).
    synthetic_savings_plans: HashMap<AccountId, Vec<SavingsPlan>>,
}

impl CommitmentReconciler {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        cache: Arc<RispCache>,
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
            synthetic_savings_plans: HashMap::new(),
        }
    }

    pub fn with_synthetic_savings_plans(mut self, data: HashMap<AccountId, Vec<SavingsPlan>>) -> Self {
        self.synthetic_savings_plans = data;
        self
    }

    pub fn ready_signal(&self) -> Arc<ReadySignal> {
        self.ready.clone()
    }

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
                    return Err(anyhow::anyhow!("commitment reconciler cancelled"));
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

        for account in self.fleet.accounts.clone() {
            let provider = self.provider.clone();
            let regions = account.regions.clone();
            let account_id = account.account_id.clone();
            tasks.spawn(async move {
                let result = provider.list_reserved_instances(&account_id, &regions).await;
                (account_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((account_id, result)) = joined else { continue };
            let regions = self
                .fleet
                .accounts
                .iter()
                .find(|a| a.account_id == account_id)
                .map(|a| a.regions.clone())
                .unwrap_or_default();

            match result {
                Ok(ris) => {
                    for region in &regions {
                        let region_ris: Vec<_> = ris.iter().filter(|ri| &ri.region == region).cloned().collect();

                        let mut counts_by_type: HashMap<&str, u32> = HashMap::new();
                        for ri in region_ris.iter().filter(|ri| ri.state.is_active()) {
                            *counts_by_type.entry(ri.instance_type.0.as_str()).or_insert(0) += ri.instance_count;
                        }
                        for (instance_type, count) in &counts_by_type {
                            self.metrics
                                .set_reserved_instance_inventory(&account_id, region, instance_type, *count);
                        }

                        self.cache.update_reserved_instances(region, &account_id, region_ris).await;
                        self.metrics
                            .set_data_last_success(&account_id, region, DataKind::ReservedInstances, true);
                    }
                }
                Err(err) => {
                    tracing::warn!(account = %account_id, error = %err, "reserved instance fetch failed");
                    for region in &regions {
                        self.metrics
                            .set_data_last_success(&account_id, region, DataKind::ReservedInstances, false);
                    }
                }
            }
        }

        let mut sp_tasks = JoinSet::new();
        for account in self.fleet.accounts.clone() {
            if let Some(synthetic) = self.synthetic_savings_plans.get(&account.account_id).cloned() {
                sp_tasks.spawn(async move { (account.account_id, Ok(synthetic)) });
                continue;
            }
            let provider = self.provider.clone();
            let account_id = account.account_id.clone();
            sp_tasks.spawn(async move {
                let result = provider.list_savings_plans(&account_id).await.map_err(anyhow::Error::new);
                (account_id, result)
            });
        }

        while let Some(joined) = sp_tasks.join_next().await {
            let Ok((account_id, result)) = joined else { continue };
            match result {
                Ok(sps) => {
                    for sp in sps.iter().filter(|sp| sp.state.is_active()) {
                        self.metrics.set_savings_plan_inventory(
                            &sp.savings_plan_arn,
                            &sp.account_id,
                            sp.savings_plan_type,
                            sp.commitment,
                        );
                    }
                    self.cache.update_savings_plans(&account_id, sps).await;
                    self.metrics
                        .set_data_last_success(&account_id, "global", DataKind::SavingsPlans, true);
                }
                Err(err) => {
                    tracing::warn!(account = %account_id, error = %err, "savings plan fetch failed");
                    self.metrics
                        .set_data_last_success(&account_id, "global", DataKind::SavingsPlans, false);
                }
            }
        }
    }
}
