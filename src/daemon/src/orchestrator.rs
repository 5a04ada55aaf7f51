//! `Orchestrator` (C9, §4.10): owns every cache, every reconciler, the
//! debouncer, and the `initialized` flag; sequences startup and wires the
//! event-driven engine invocation.

use crate::config::Config;
use lumina_common::metrics::MetricsSink;
use lumina_common::model::OperatingSystem;
use lumina_common::provider::CloudProvider;
use lumina_engine::{compute, publish_metrics, Debouncer, EngineConfig, Ec2Cache, PricingCache, RispCache};
use lumina_reconcile::{
    AccountSpec, CommitmentReconciler, FleetConfig, InventoryReconciler, OnDemandPricingReconciler,
    ReadySignal, SPRateReconciler, SpotPricingReconciler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Holds the fully-wired reconciler set and the caches they feed. Built once
/// at startup from a loaded [`Config`] and a concrete [`CloudProvider`].
pub struct Orchestrator {
    ec2_cache: Arc<Ec2Cache>,
    risp_cache: Arc<RispCache>,
    pricing_cache: Arc<PricingCache>,
    metrics: Arc<dyn MetricsSink>,
    engine_config: EngineConfig,
    debouncer: Arc<Debouncer>,
    debouncer_cancel: CancellationToken,
    inventory: Arc<InventoryReconciler>,
    commitment: Arc<CommitmentReconciler>,
    on_demand_pricing: Arc<OnDemandPricingReconciler>,
    spot_pricing: Arc<SpotPricingReconciler>,
    sp_rate: Arc<SPRateReconciler>,
    initialized: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CloudProvider>, metrics: Arc<dyn MetricsSink>, config: &Config) -> Self {
        let ec2_cache = Arc::new(Ec2Cache::new());
        let risp_cache = Arc::new(RispCache::new());
        let pricing_cache = Arc::new(PricingCache::new());

        let fleet = fleet_config(config);
        let engine_config = EngineConfig {
            ec2_instance_discount: config.pricing.ec2_instance_discount,
            compute_discount: config.pricing.compute_discount,
        };

        let debouncer_cancel = CancellationToken::new();
        let debouncer = {
            let ec2_cache = ec2_cache.clone();
            let risp_cache = risp_cache.clone();
            let pricing_cache = pricing_cache.clone();
            let metrics = metrics.clone();
            Arc::new(Debouncer::new(
                lumina_common::constants::DEFAULT_DEBOUNCE_INTERVAL,
                debouncer_cancel.clone(),
                move || {
                    let ec2_cache = ec2_cache.clone();
                    let risp_cache = risp_cache.clone();
                    let pricing_cache = pricing_cache.clone();
                    let metrics = metrics.clone();
                    Box::pin(async move {
                        let result = compute(&ec2_cache, &risp_cache, &pricing_cache, &engine_config).await;
                        publish_metrics(&result, metrics.as_ref());
                    })
                },
            ))
        };

        let ec2_ready = Arc::new(ReadySignal::new());
        let risp_ready = Arc::new(ReadySignal::new());

        let inventory = Arc::new(InventoryReconciler::new(
            provider.clone(),
            ec2_cache.clone(),
            metrics.clone(),
            fleet.clone(),
            config.reconciliation.ec2(),
            ec2_ready.clone(),
            debouncer.clone(),
        ));

        let commitment = Arc::new(CommitmentReconciler::new(
            provider.clone(),
            risp_cache.clone(),
            metrics.clone(),
            fleet.clone(),
            config.reconciliation.risp(),
            risp_ready.clone(),
            debouncer.clone(),
        ));

        let on_demand_pricing = Arc::new(OnDemandPricingReconciler::new(
            provider.clone(),
            pricing_cache.clone(),
            metrics.clone(),
            fleet.clone(),
            config.reconciliation.pricing(),
        ));

        let spot_pricing = Arc::new(SpotPricingReconciler::new(
            provider.clone(),
            ec2_cache.clone(),
            pricing_cache.clone(),
            metrics.clone(),
            config.reconciliation.spot_pricing(),
            config.pricing.spot_price_cache_expiration(),
            ec2_ready.clone(),
            Arc::new(ReadySignal::new()),
        ));

        let sp_rate = Arc::new(SPRateReconciler::new(
            provider,
            ec2_cache.clone(),
            risp_cache.clone(),
            pricing_cache.clone(),
            metrics.clone(),
            fleet.operating_systems.clone(),
            lumina_common::constants::DEFAULT_SP_RATE_RECONCILE_INTERVAL,
            ec2_ready,
            risp_ready,
            Arc::new(ReadySignal::new()),
        ));

        Self {
            ec2_cache,
            risp_cache,
            pricing_cache,
            metrics,
            engine_config,
            debouncer,
            debouncer_cancel,
            inventory,
            commitment,
            on_demand_pricing,
            spot_pricing,
            sp_rate,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn caches(&self) -> (Arc<Ec2Cache>, Arc<RispCache>, Arc<PricingCache>) {
        (self.ec2_cache.clone(), self.risp_cache.clone(), self.pricing_cache.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Runs the full startup sequence and then blocks serving all five
    /// reconcilers until `cancel` fires or one of them exits with a fatal
    /// error. Step 1 (on-demand pricing's initial load) happens inline so a
    /// bootstrap failure aborts before anything else is spawned; steps 2-3
    /// are expressed as concurrent tasks whose internal readiness gates
    /// already encode the "C6/C7 wait on C3(+C4)" ordering from §4.10.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

        // Step 1: C5 must succeed once before anything downstream is spawned.
        // It keeps running (its own ticker) for the lifetime of the process,
        // so it is spawned into the shared set and raced against its own
        // readiness signal rather than awaited to completion.
        {
            let on_demand_pricing = self.on_demand_pricing.clone();
            let ready = self.on_demand_pricing.ready_signal();
            let cancel_for_task = cancel.clone();
            tasks.spawn(async move { on_demand_pricing.run(cancel_for_task).await });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(anyhow::anyhow!("orchestrator cancelled during bootstrap")),
                _ = ready.wait() => {}
                joined = tasks.join_next() => {
                    return match joined {
                        Some(Ok(Err(err))) => Err(err),
                        Some(Err(join_err)) => Err(anyhow::Error::new(join_err)),
                        _ => Err(anyhow::anyhow!("on-demand pricing reconciler exited before its first success")),
                    };
                }
            }
        }

        {
            let inventory = self.inventory.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { inventory.run(cancel).await });
        }
        {
            let commitment = self.commitment.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { commitment.run(cancel).await });
        }
        {
            let spot_pricing = self.spot_pricing.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { spot_pricing.run(cancel).await });
        }
        {
            let sp_rate = self.sp_rate.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { sp_rate.run(cancel).await });
        }

        // Step 4: once every reconciler has completed its first cycle, flip
        // `initialized` and run the allocation engine synchronously.
        {
            let inventory_ready = self.inventory.ready_signal();
            let commitment_ready = self.commitment.ready_signal();
            let spot_ready = self.spot_pricing.ready_signal();
            let sp_rate_ready = self.sp_rate.ready_signal();
            let initialized = self.initialized.clone();
            let ec2_cache = self.ec2_cache.clone();
            let risp_cache = self.risp_cache.clone();
            let pricing_cache = self.pricing_cache.clone();
            let metrics = self.metrics.clone();
            let engine_config = self.engine_config;
            let cancel = cancel.clone();

            tasks.spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = async {
                        inventory_ready.wait().await;
                        commitment_ready.wait().await;
                        spot_ready.wait().await;
                        sp_rate_ready.wait().await;
                    } => {}
                }

                initialized.store(true, Ordering::Release);
                let result = compute(&ec2_cache, &risp_cache, &pricing_cache, &engine_config).await;
                publish_metrics(&result, metrics.as_ref());
                Ok(())
            });
        }

        // Any reconciler exiting is fatal: propagate and cancel the rest.
        let outcome = loop {
            match tasks.join_next().await {
                Some(Ok(Ok(()))) => continue,
                Some(Ok(Err(err))) => break Err(err),
                Some(Err(join_err)) => break Err(anyhow::Error::new(join_err)),
                None => break Ok(()),
            }
        };

        cancel.cancel();
        self.debouncer_cancel.cancel();
        while tasks.join_next().await.is_some() {}
        outcome
    }
}

fn fleet_config(config: &Config) -> FleetConfig {
    let accounts = config
        .aws_accounts
        .iter()
        .map(|a| AccountSpec {
            account_id: a.account_id.clone(),
            regions: if a.regions().is_empty() { config.regions.clone() } else { a.regions() },
        })
        .collect();

    let operating_systems = config
        .pricing
        .operating_systems
        .iter()
        .filter_map(|s| OperatingSystem::parse(s))
        .collect();

    FleetConfig { accounts, operating_systems }
}
