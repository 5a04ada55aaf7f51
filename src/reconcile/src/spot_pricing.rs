//! `SpotPricingReconciler` (C6, §4.6): lazy, per-running-combination spot
//! price loader with per-entry staleness refresh. Waits on `Ec2Cache`
//! readiness before its first cycle.

use crate::ready::ReadySignal;
use lumina_common::model::{product_description, AccountId, InstanceType, Region};
use lumina_common::metrics::MetricsSink;
use lumina_common::model::DataKind;
use lumina_common::provider::CloudProvider;
use lumina_engine::{Ec2Cache, PricingCache};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct SpotPricingReconciler {
    provider: Arc<dyn CloudProvider>,
    ec2_cache: Arc<Ec2Cache>,
    pricing_cache: Arc<PricingCache>,
    metrics: Arc<dyn MetricsSink>,
    interval: Duration,
    cache_expiration: Duration,
    ec2_ready: Arc<ReadySignal>,
    ready: Arc<ReadySignal>,
}

impl SpotPricingReconciler {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        ec2_cache: Arc<Ec2Cache>,
        pricing_cache: Arc<PricingCache>,
        metrics: Arc<dyn MetricsSink>,
        interval: Duration,
        cache_expiration: Duration,
        ec2_ready: Arc<ReadySignal>,
        ready: Arc<ReadySignal>,
    ) -> Self {
        Self {
            provider,
            ec2_cache,
            pricing_cache,
            metrics,
            interval,
            cache_expiration,
            ec2_ready,
            ready,
        }
    }

    pub fn ready_signal(&self) -> Arc<ReadySignal> {
        self.ready.clone()
    }

    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(anyhow::anyhow!("spot pricing reconciler cancelled before ec2 ready")),
            _ = self.ec2_ready.wait() => {}
        }

        self.run_cycle().await;
        self.ready.close();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("spot pricing reconciler cancelled"));
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        let instances = self.ec2_cache.get_running_instances().await;

        #[derive(Hash, Eq, PartialEq, Clone)]
        struct Triple {
            instance_type: InstanceType,
            az: String,
            product_description: String,
        }

        struct RegionWork {
            account: AccountId,
            types: HashSet<InstanceType>,
            product_descriptions: HashSet<String>,
        }

        let mut seen = HashSet::new();
        let mut by_region: HashMap<Region, RegionWork> = HashMap::new();

        for instance in &instances {
            let pd = product_description(instance.platform).to_string();
            let triple = Triple {
                instance_type: instance.instance_type.clone(),
                az: instance.availability_zone.clone(),
                product_description: pd.clone(),
            };
            if !seen.insert(triple.clone()) {
                continue;
            }

            let missing = match self
                .pricing_cache
                .get_spot_price(&instance.instance_type, &instance.availability_zone, &pd)
                .await
            {
                Some(entry) => {
                    let age = chrono::Utc::now().signed_duration_since(entry.fetched_at);
                    age.to_std().unwrap_or(Duration::MAX) > self.cache_expiration
                }
                None => true,
            };

            if !missing {
                continue;
            }

            let work = by_region.entry(instance.region.clone()).or_insert_with(|| RegionWork {
                account: instance.account_id.clone(),
                types: HashSet::new(),
                product_descriptions: HashSet::new(),
            });
            work.types.insert(instance.instance_type.clone());
            work.product_descriptions.insert(pd);
        }

        if by_region.is_empty() {
            return;
        }

        let mut any_success = false;
        for (region, work) in by_region {
            let types: Vec<InstanceType> = work.types.into_iter().collect();
            let product_descriptions: Vec<String> = work.product_descriptions.into_iter().collect();

            match self
                .provider
                .describe_spot_price_history(&work.account, &region, &types, &product_descriptions)
                .await
            {
                Ok(rows) => {
                    any_success = true;
                    let entries = rows
                        .into_iter()
                        .map(|r| (r.instance_type, r.availability_zone, r.product_description, r.price, r.timestamp))
                        .collect();
                    self.pricing_cache.insert_spot_prices(entries).await;
                }
                Err(err) => {
                    tracing::warn!(region = %region, error = %err, "spot price fetch failed");
                }
            }
        }

        self.metrics
            .set_data_last_success("*", "*", DataKind::SpotPricing, any_success);
    }
}
