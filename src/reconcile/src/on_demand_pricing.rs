//! `OnDemandPricingReconciler` (C5, §4.5): bulk, infrequent load of the full
//! `(region, instance type, OS)` on-demand price table.

use crate::fleet::FleetConfig;
use crate::ready::ReadySignal;
use lumina_common::metrics::MetricsSink;
use lumina_common::model::DataKind;
use lumina_common::provider::CloudProvider;
use lumina_common::retry::{self, RetryConfig};
use lumina_engine::PricingCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct OnDemandPricingReconciler {
    provider: Arc<dyn CloudProvider>,
    cache: Arc<PricingCache>,
    metrics: Arc<dyn MetricsSink>,
    fleet: FleetConfig,
    interval: Duration,
    retry_config: RetryConfig,
    ready: Arc<ReadySignal>,
}

impl OnDemandPricingReconciler {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        cache: Arc<PricingCache>,
        metrics: Arc<dyn MetricsSink>,
        fleet: FleetConfig,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            metrics,
            fleet,
            interval,
            retry_config: RetryConfig::default(),
            ready: Arc::new(ReadySignal::new()),
        }
    }

    pub fn ready_signal(&self) -> Arc<ReadySignal> {
        self.ready.clone()
    }

    /// The first load MUST succeed before any downstream reconciler proceeds
    /// (§4.10 step 1). On exhaustion this propagates, which the orchestrator
    /// treats as a fatal process abort.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.initial_load(&cancel).await?;
        self.ready.close();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("on-demand pricing reconciler cancelled"));
                }
                _ = ticker.tick() => {
                    self.refresh_cycle().await;
                }
            }
        }
    }

    async fn initial_load(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let regions = self.fleet.all_regions();
        let oses = self.fleet.operating_systems.clone();
        let provider = self.provider.clone();

        let table = retry::run(cancel, self.retry_config, "on_demand_pricing_initial_load", move || {
            let provider = provider.clone();
            let regions = regions.clone();
            let oses = oses.clone();
            async move { provider.load_all_on_demand_pricing(&regions, &oses).await }
        })
        .await?;

        self.cache.set_on_demand_prices(table).await;
        self.metrics
            .set_data_last_success("*", "*", DataKind::OnDemandPricing, true);
        self.metrics
            .set_data_freshness_seconds("*", "*", DataKind::OnDemandPricing, 0.0);
        Ok(())
    }

    /// A failed refresh keeps serving the previous table — only the initial
    /// load is fatal.
    async fn refresh_cycle(&self) {
        let regions = self.fleet.all_regions();
        let oses = self.fleet.operating_systems.clone();

        match self.provider.load_all_on_demand_pricing(&regions, &oses).await {
            Ok(table) => {
                self.cache.set_on_demand_prices(table).await;
                self.metrics
                    .set_data_last_success("*", "*", DataKind::OnDemandPricing, true);
                self.metrics
                    .set_data_freshness_seconds("*", "*", DataKind::OnDemandPricing, 0.0);
            }
            Err(err) => {
                tracing::warn!(error = %err, "on-demand pricing refresh failed, serving stale table");
                self.metrics
                    .set_data_last_success("*", "*", DataKind::OnDemandPricing, false);
            }
        }
    }
}
