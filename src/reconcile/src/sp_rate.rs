//! `SPRateReconciler` (C7, §4.7): lazy per-Savings-Plan rate table loader.
//! Waits on both `Ec2Cache` and `RispCache` readiness before its first cycle.

use crate::ready::ReadySignal;
use lumina_common::metrics::MetricsSink;
use lumina_common::model::{DataKind, Instance, SavingsPlan, SpRateValue, Tenancy};
use lumina_common::provider::CloudProvider;
use lumina_engine::cache::build_sp_rate_key;
use lumina_engine::{Ec2Cache, PricingCache, RispCache};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct SPRateReconciler {
    provider: Arc<dyn CloudProvider>,
    ec2_cache: Arc<Ec2Cache>,
    risp_cache: Arc<RispCache>,
    pricing_cache: Arc<PricingCache>,
    metrics: Arc<dyn MetricsSink>,
    operating_systems: Vec<lumina_common::model::OperatingSystem>,
    interval: Duration,
    ec2_ready: Arc<ReadySignal>,
    risp_ready: Arc<ReadySignal>,
    ready: Arc<ReadySignal>,
}

impl SPRateReconciler {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        ec2_cache: Arc<Ec2Cache>,
        risp_cache: Arc<RispCache>,
        pricing_cache: Arc<PricingCache>,
        metrics: Arc<dyn MetricsSink>,
        operating_systems: Vec<lumina_common::model::OperatingSystem>,
        interval: Duration,
        ec2_ready: Arc<ReadySignal>,
        risp_ready: Arc<ReadySignal>,
        ready: Arc<ReadySignal>,
    ) -> Self {
        Self {
            provider,
            ec2_cache,
            risp_cache,
            pricing_cache,
            metrics,
            operating_systems,
            interval,
            ec2_ready,
            risp_ready,
            ready,
        }
    }

    pub fn ready_signal(&self) -> Arc<ReadySignal> {
        self.ready.clone()
    }

    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(anyhow::anyhow!("sp rate reconciler cancelled before dependencies ready")),
            _ = wait_both(&self.ec2_ready, &self.risp_ready) => {}
        }

        self.run_cycle().await;
        self.ready.close();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("sp rate reconciler cancelled"));
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        let savings_plans: Vec<SavingsPlan> = self
            .risp_cache
            .get_all_savings_plans()
            .await
            .into_iter()
            .filter(|sp| sp.state.is_active())
            .collect();

        if savings_plans.is_empty() {
            return;
        }

        let instances = self.ec2_cache.get_all_instances().await;
        let wanted = wanted_combos(&instances, &self.operating_systems);

        let mut tasks = JoinSet::new();
        for sp in savings_plans {
            let provider = self.provider.clone();
            let pricing_cache = self.pricing_cache.clone();
            let wanted = wanted.clone();
            tasks.spawn(fetch_one(provider, pricing_cache, sp, wanted));
        }

        let mut any_success = false;
        while let Some(joined) = tasks.join_next().await {
            if let Ok(success) = joined {
                any_success |= success;
            }
        }

        self.metrics
            .set_data_last_success("*", "*", DataKind::SpRates, any_success);
    }
}

async fn wait_both(a: &ReadySignal, b: &ReadySignal) {
    a.wait().await;
    b.wait().await;
}

#[derive(Clone, Hash, Eq, PartialEq)]
struct Combo {
    instance_type: lumina_common::model::InstanceType,
    region: lumina_common::model::Region,
    tenancy: Tenancy,
    os: lumina_common::model::OperatingSystem,
}

/// Crosses every running `(instance-type, region, tenancy)` combination with
/// the configured operating-system set (§4.7 step 1) — not the instance's own
/// platform, so a Linux-only fleet still builds sentinels for the other
/// operating systems `pricing.operatingSystems` names.
fn wanted_combos(instances: &[Instance], operating_systems: &[lumina_common::model::OperatingSystem]) -> Vec<Combo> {
    let mut seen = HashSet::new();
    instances
        .iter()
        .flat_map(|i| {
            operating_systems.iter().map(move |os| Combo {
                instance_type: i.instance_type.clone(),
                region: i.region.clone(),
                tenancy: i.tenancy,
                os: *os,
            })
        })
        .filter(|combo| seen.insert(combo.clone()))
        .collect()
}

/// Fetches (full or incremental) and negative-caches the gap between what was
/// requested and what AWS returned. Returns whether the fetch succeeded.
async fn fetch_one(
    provider: Arc<dyn CloudProvider>,
    pricing_cache: Arc<PricingCache>,
    sp: SavingsPlan,
    wanted: Vec<Combo>,
) -> bool {
    let types: Vec<_> = dedup(wanted.iter().map(|c| c.instance_type.clone()));
    let regions: Vec<_> = dedup(wanted.iter().map(|c| c.region.clone()));
    let tenancies: Vec<_> = dedup(wanted.iter().map(|c| c.tenancy));
    let oses: Vec<_> = dedup(wanted.iter().map(|c| c.os));

    if types.is_empty() || regions.is_empty() {
        return true;
    }

    let (q_types, q_regions, q_tenancies, q_oses) = if pricing_cache.has_any_sp_rate(&sp.savings_plan_arn).await {
        pricing_cache
            .get_missing_sp_rates_for_instances(&sp.savings_plan_arn, &types, &regions, &tenancies, &oses)
            .await
    } else {
        (types, regions, tenancies, oses)
    };

    if q_types.is_empty() || q_regions.is_empty() || q_tenancies.is_empty() || q_oses.is_empty() {
        return true;
    }

    let rows = match provider
        .describe_savings_plan_rates(&sp.account_id, &sp, &q_types, &q_regions, &q_oses, &q_tenancies)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(sp_arn = %sp.savings_plan_arn, error = %err, "savings plan rate fetch failed");
            return false;
        }
    };

    let mut returned = HashSet::new();
    let mut upserts = Vec::new();
    for row in &rows {
        let key = build_sp_rate_key(&row.savings_plan_arn, &row.instance_type, &row.region, row.tenancy, os_from_description(&row.product_description));
        returned.insert(key.clone());
        upserts.push((key, SpRateValue::Rate(row.rate)));
    }

    for combo in &wanted {
        if !q_types.contains(&combo.instance_type)
            || !q_regions.contains(&combo.region)
            || !q_tenancies.contains(&combo.tenancy)
            || !q_oses.contains(&combo.os)
        {
            continue;
        }
        let key = build_sp_rate_key(&sp.savings_plan_arn, &combo.instance_type, &combo.region, combo.tenancy, combo.os);
        if !returned.contains(&key) {
            upserts.push((key, SpRateValue::NotAvailable));
        }
    }

    pricing_cache.add_sp_rates(upserts).await;
    true
}

fn dedup<T: std::hash::Hash + Eq + Clone>(iter: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    iter.filter(|x| seen.insert(x.clone())).collect()
}

fn os_from_description(product_description: &str) -> lumina_common::model::OperatingSystem {
    use lumina_common::model::OperatingSystem;
    match product_description {
        "Windows" => OperatingSystem::Windows,
        "RHEL" => OperatingSystem::Rhel,
        "SUSE" => OperatingSystem::Suse,
        _ => OperatingSystem::Linux,
    }
}
