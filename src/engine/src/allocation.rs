//! The discount-allocation engine (§4.8–4.9): the heart of the system.
//! Stateless — reads snapshots out of the caches and returns a fresh result;
//! it never mutates a cache and holds no state of its own between calls.

use crate::cache::{build_sp_rate_key, Ec2Cache, PricingCache, RispCache};
use lumina_common::constants::EPSILON;
use lumina_common::metrics::MetricsSink;
use lumina_common::model::{
    CoverageType, Instance, InstanceCost, InstanceId, InstanceType, Lifecycle, OperatingSystem,
    PricingAccuracy, Region, SavingsPlan, SavingsPlanArn, SavingsPlanType, SavingsPlanUtilization,
    Tenancy,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Fallback multipliers applied when no accurate Savings-Plan rate is cached
/// (§4.9, tier 2).
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub ec2_instance_discount: f64,
    pub compute_discount: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ec2_instance_discount: lumina_common::constants::DEFAULT_EC2_INSTANCE_SP_DISCOUNT,
            compute_discount: lumina_common::constants::DEFAULT_COMPUTE_SP_DISCOUNT,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AllocationResult {
    pub instance_costs: HashMap<InstanceId, InstanceCost>,
    pub sp_utilization: HashMap<SavingsPlanArn, SavingsPlanUtilization>,
}

struct WorkingCost {
    instance: Instance,
    cost: InstanceCost,
}

fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
    if (a - b).abs() < EPSILON {
        Ordering::Equal
    } else {
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    }
}

fn cmp_f64_asc(a: f64, b: f64) -> Ordering {
    if (a - b).abs() < EPSILON {
        Ordering::Equal
    } else {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
}

/// Two-tier Savings-Plan rate lookup (§4.9).
async fn get_rate(
    pricing: &PricingCache,
    sp: &SavingsPlan,
    instance_type: &InstanceType,
    region: &Region,
    tenancy: Tenancy,
    os: OperatingSystem,
    od_rate: f64,
    config: &EngineConfig,
) -> (f64, PricingAccuracy) {
    let key = build_sp_rate_key(&sp.savings_plan_arn, instance_type, region, tenancy, os);
    if let Some(rate) = pricing.get_sp_rate(&key).await {
        return (rate, PricingAccuracy::Accurate);
    }

    let multiplier = match sp.savings_plan_type {
        SavingsPlanType::Ec2Instance => config.ec2_instance_discount,
        SavingsPlanType::Compute => config.compute_discount,
    };
    (od_rate * multiplier, PricingAccuracy::Estimated)
}

/// A spot price observed in the instance's own AZ, falling back to any other
/// AZ in the same region (§4.8 Step B).
async fn lookup_spot_price(pricing: &PricingCache, instance: &Instance, product_description: &str) -> Option<f64> {
    if let Some(entry) = pricing
        .get_spot_price(&instance.instance_type, &instance.availability_zone, product_description)
        .await
    {
        return Some(entry.price);
    }

    pricing
        .get_all_spot_prices_with_timestamps()
        .await
        .into_iter()
        .find(|e| {
            e.instance_type == instance.instance_type
                && e.product_description.eq_ignore_ascii_case(product_description)
                && e.availability_zone.starts_with(instance.region.as_str())
        })
        .map(|e| e.price)
}

/// Steps A and B: base on-demand pricing, then spot substitution.
async fn build_base_costs(ec2: &Ec2Cache, pricing: &PricingCache) -> Vec<WorkingCost> {
    let mut working = Vec::new();

    for instance in ec2.get_running_instances().await {
        let os = OperatingSystem::from(instance.platform);
        let Some(shelf_price) = pricing
            .get_on_demand_price(&instance.region, &instance.instance_type, os)
            .await
        else {
            continue;
        };

        let mut cost = InstanceCost {
            instance_id: instance.instance_id.clone(),
            account_id: instance.account_id.clone(),
            region: instance.region.clone(),
            instance_type: instance.instance_type.clone(),
            platform: instance.platform,
            shelf_price,
            effective_cost: shelf_price,
            on_demand_cost: shelf_price,
            ri_coverage: 0.0,
            savings_plan_coverage: 0.0,
            savings_plan_arn: None,
            coverage_type: CoverageType::OnDemand,
            pricing_accuracy: PricingAccuracy::Accurate,
        };

        if instance.lifecycle == Lifecycle::Spot {
            let product_description = lumina_common::model::product_description(instance.platform);
            let Some(spot_price) = lookup_spot_price(pricing, &instance, product_description).await else {
                continue;
            };
            cost.effective_cost = spot_price;
            cost.on_demand_cost = 0.0;
            cost.coverage_type = CoverageType::Spot;
        }

        working.push(WorkingCost { instance, cost });
    }

    working
}

/// Step C: Reserved Instance allocation.
async fn allocate_reserved_instances(working: &mut [WorkingCost], risp: &RispCache) {
    let mut reservations = risp.get_all_reserved_instances().await;
    reservations.retain(|ri| ri.state.is_active());

    for ri in &reservations {
        if ri.instance_count == 0 {
            continue;
        }

        let mut candidates: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.instance.lifecycle != Lifecycle::Spot
                    && w.cost.ri_coverage == 0.0
                    && w.instance.region == ri.region
                    && w.instance.instance_type == ri.instance_type
                    && match ri.scope {
                        lumina_common::model::ReservedInstanceScope::Az => {
                            ri.availability_zone.as_deref() == Some(w.instance.availability_zone.as_str())
                        }
                        lumina_common::model::ReservedInstanceScope::Region => true,
                    }
            })
            .map(|(idx, _)| idx)
            .collect();

        candidates.sort_by(|&a, &b| {
            working[a]
                .instance
                .launch_time
                .cmp(&working[b].instance.launch_time)
                .then_with(|| working[a].instance.instance_id.cmp(&working[b].instance.instance_id))
        });

        for idx in candidates.into_iter().take(ri.instance_count as usize) {
            let w = &mut working[idx];
            w.cost.ri_coverage = w.cost.shelf_price;
            w.cost.effective_cost = 0.0;
            w.cost.on_demand_cost = 0.0;
            w.cost.coverage_type = CoverageType::ReservedInstance;
        }
    }
}

/// Steps D and E share the same bounded-knapsack-by-priority walk; they
/// differ only in eligibility (family/region restriction) and the coverage
/// type stamped on a win.
#[allow(clippy::too_many_arguments)]
async fn allocate_savings_plan(
    working: &mut [WorkingCost],
    sp: &SavingsPlan,
    pricing: &PricingCache,
    config: &EngineConfig,
    coverage_type: CoverageType,
    restrict_family_and_region: bool,
) -> SavingsPlanUtilization {
    let mut candidates: Vec<(usize, f64, f64, PricingAccuracy)> = Vec::new();

    for (idx, w) in working.iter().enumerate() {
        if w.instance.lifecycle == Lifecycle::Spot {
            continue;
        }
        if w.cost.ri_coverage > 0.0 || w.cost.savings_plan_coverage > 0.0 {
            continue;
        }
        if restrict_family_and_region {
            let family_matches = sp.instance_family.as_deref() == Some(w.instance.instance_type.family());
            let region_matches = sp.region.as_deref() == Some(w.instance.region.as_str());
            if !family_matches || !region_matches {
                continue;
            }
        }

        let os = OperatingSystem::from(w.instance.platform);
        let od_rate = w.cost.shelf_price;
        let (sp_rate, accuracy) = get_rate(
            pricing,
            sp,
            &w.instance.instance_type,
            &w.instance.region,
            w.instance.tenancy,
            os,
            od_rate,
            config,
        )
        .await;

        if od_rate <= 0.0 || sp_rate <= 0.0 {
            continue;
        }

        let savings_pct = (od_rate - sp_rate) / od_rate;
        candidates.push((idx, savings_pct, sp_rate, accuracy));
    }

    candidates.sort_by(|a, b| {
        cmp_f64_desc(a.1, b.1)
            .then_with(|| cmp_f64_asc(a.2, b.2))
            .then_with(|| working[a.0].instance.launch_time.cmp(&working[b.0].instance.launch_time))
            .then_with(|| working[a.0].instance.instance_id.cmp(&working[b.0].instance.instance_id))
    });

    let mut remaining_commitment = sp.commitment;

    for (idx, _pct, sp_rate, accuracy) in candidates {
        if remaining_commitment <= EPSILON {
            break;
        }

        let w = &mut working[idx];
        let contribution = sp_rate.min(remaining_commitment).min(w.cost.effective_cost);
        if contribution <= EPSILON {
            continue;
        }

        if (contribution - sp_rate).abs() < EPSILON {
            w.cost.effective_cost = sp_rate;
        } else {
            w.cost.effective_cost -= contribution;
        }
        // OnDemandCost always tracks the ShelfPrice portion not yet covered
        // by RI or SP, independent of EffectiveCost's full/partial formula,
        // so RICoverage + SavingsPlanCoverage + OnDemandCost stays ≈ ShelfPrice.
        w.cost.on_demand_cost -= contribution;
        w.cost.savings_plan_coverage += contribution;
        w.cost.savings_plan_arn = Some(sp.savings_plan_arn.clone());
        w.cost.coverage_type = coverage_type;
        w.cost.pricing_accuracy = accuracy;

        remaining_commitment -= contribution;
    }

    let current_utilization_rate = sp.commitment - remaining_commitment;
    let utilization_percent = if sp.commitment > EPSILON {
        100.0 * current_utilization_rate / sp.commitment
    } else {
        0.0
    };

    SavingsPlanUtilization {
        current_utilization_rate,
        remaining_capacity: remaining_commitment,
        utilization_percent,
    }
}

/// Runs Steps A–E and returns the resulting per-instance and per-SP maps.
/// Step F (publishing) is a separate call — see [`publish_metrics`] — so the
/// engine itself never depends on a concrete `MetricsSink`.
pub async fn compute(ec2: &Ec2Cache, risp: &RispCache, pricing: &PricingCache, config: &EngineConfig) -> AllocationResult {
    let mut working = build_base_costs(ec2, pricing).await;

    allocate_reserved_instances(&mut working, risp).await;

    let mut savings_plans = risp.get_all_savings_plans().await;
    savings_plans.retain(|sp| sp.state.is_active());

    let mut sp_utilization = HashMap::new();

    for sp in savings_plans.iter().filter(|sp| sp.savings_plan_type == SavingsPlanType::Ec2Instance) {
        let utilization = allocate_savings_plan(
            &mut working,
            sp,
            pricing,
            config,
            CoverageType::Ec2InstanceSavingsPlan,
            true,
        )
        .await;
        sp_utilization.insert(sp.savings_plan_arn.clone(), utilization);
    }

    for sp in savings_plans.iter().filter(|sp| sp.savings_plan_type == SavingsPlanType::Compute) {
        let utilization = allocate_savings_plan(
            &mut working,
            sp,
            pricing,
            config,
            CoverageType::ComputeSavingsPlan,
            false,
        )
        .await;
        sp_utilization.insert(sp.savings_plan_arn.clone(), utilization);
    }

    let instance_costs = working
        .into_iter()
        .map(|w| (w.cost.instance_id.clone(), w.cost))
        .collect();

    AllocationResult {
        instance_costs,
        sp_utilization,
    }
}

/// Step F: push per-instance and per-SP gauges.
pub fn publish_metrics(result: &AllocationResult, sink: &dyn MetricsSink) {
    for cost in result.instance_costs.values() {
        sink.set_instance_effective_cost(cost);
    }
    for (arn, utilization) in &result.sp_utilization {
        sink.set_savings_plan_utilization(arn, utilization);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use lumina_common::model::{
        InstanceState, Platform, ReservedInstance, ReservedInstanceScope, ReservedInstanceState,
        SavingsPlanState,
    };
    use rstest::rstest;
    use std::collections::HashMap;

    fn instance(id: &str, instance_type: &str, region: &str, az: &str, launch_offset_mins: i64) -> Instance {
        Instance {
            instance_id: id.to_string(),
            instance_type: InstanceType::from(instance_type),
            region: region.to_string(),
            availability_zone: az.to_string(),
            account_id: "111111111111".to_string(),
            state: InstanceState::Running,
            lifecycle: Lifecycle::OnDemand,
            tenancy: Tenancy::Default,
            platform: Platform::Linux,
            launch_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + ChronoDuration::minutes(launch_offset_mins),
        }
    }

    fn spot_instance(id: &str, instance_type: &str, region: &str, az: &str) -> Instance {
        let mut i = instance(id, instance_type, region, az, 0);
        i.lifecycle = Lifecycle::Spot;
        i
    }

    fn reserved_instance(id: &str, instance_type: &str, region: &str, count: u32) -> ReservedInstance {
        ReservedInstance {
            reserved_instance_id: id.to_string(),
            instance_type: InstanceType::from(instance_type),
            instance_count: count,
            availability_zone: None,
            region: region.to_string(),
            account_id: "111111111111".to_string(),
            state: ReservedInstanceState::Active,
            offering_class: "standard".to_string(),
            scope: ReservedInstanceScope::Region,
        }
    }

    fn savings_plan(
        arn: &str,
        sp_type: SavingsPlanType,
        commitment: f64,
        family: Option<&str>,
        region: Option<&str>,
    ) -> SavingsPlan {
        SavingsPlan {
            savings_plan_arn: arn.to_string(),
            savings_plan_id: arn.to_string(),
            account_id: "111111111111".to_string(),
            savings_plan_type: sp_type,
            state: SavingsPlanState::Active,
            commitment,
            region: region.map(|r| r.to_string()),
            instance_family: family.map(|f| f.to_string()),
            start: Utc::now() - ChronoDuration::days(30),
            end: Utc::now() + ChronoDuration::days(335),
        }
    }

    async fn on_demand_table(entries: &[(&str, &str, f64)]) -> HashMap<(Region, InstanceType, OperatingSystem), f64> {
        entries
            .iter()
            .map(|(region, instance_type, rate)| {
                (
                    (region.to_string(), InstanceType::from(*instance_type), OperatingSystem::Linux),
                    *rate,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn s1_pure_on_demand() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![instance("i-1", "m5.large", "us-west-2", "us-west-2a", 0)],
        )
        .await;
        pricing
            .set_on_demand_prices(on_demand_table(&[("us-west-2", "m5.large", 0.096)]).await)
            .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;
        let cost = &result.instance_costs["i-1"];
        assert!((cost.effective_cost - 0.096).abs() < EPSILON);
        assert!((cost.on_demand_cost - 0.096).abs() < EPSILON);
        assert_eq!(cost.coverage_type, CoverageType::OnDemand);
    }

    #[tokio::test]
    async fn s2_single_ri_covers_oldest_launch() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![
                instance("i-new", "m5.large", "us-west-2", "us-west-2a", 10),
                instance("i-old", "m5.large", "us-west-2", "us-west-2a", 0),
            ],
        )
        .await;
        pricing
            .set_on_demand_prices(on_demand_table(&[("us-west-2", "m5.large", 0.096)]).await)
            .await;
        risp.update_reserved_instances(
            &"us-west-2".to_string(),
            &"111111111111".to_string(),
            vec![reserved_instance("ri-1", "m5.large", "us-west-2", 1)],
        )
        .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;

        let old = &result.instance_costs["i-old"];
        assert_eq!(old.coverage_type, CoverageType::ReservedInstance);
        assert!((old.ri_coverage - 0.096).abs() < EPSILON);
        assert!(old.effective_cost.abs() < EPSILON);

        let new = &result.instance_costs["i-new"];
        assert_eq!(new.coverage_type, CoverageType::OnDemand);
    }

    #[tokio::test]
    async fn s3_ec2_instance_sp_priority_ordering() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![
                instance("a", "m5.2xlarge", "us-west-2", "us-west-2a", 0),
                instance("b", "m5.xlarge", "us-west-2", "us-west-2a", 0),
                instance("c", "m5.large", "us-west-2", "us-west-2a", 0),
            ],
        )
        .await;
        pricing
            .set_on_demand_prices(
                on_demand_table(&[
                    ("us-west-2", "m5.2xlarge", 0.384),
                    ("us-west-2", "m5.xlarge", 0.192),
                    ("us-west-2", "m5.large", 0.096),
                ])
                .await,
            )
            .await;
        risp.update_savings_plans(
            &"111111111111".to_string(),
            vec![savings_plan(
                "arn:sp:1",
                SavingsPlanType::Ec2Instance,
                0.20,
                Some("m5"),
                Some("us-west-2"),
            )],
        )
        .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;

        let a = &result.instance_costs["a"];
        let b = &result.instance_costs["b"];
        let c = &result.instance_costs["c"];

        assert_eq!(c.coverage_type, CoverageType::Ec2InstanceSavingsPlan);
        assert!((c.effective_cost - 0.096 * 0.72).abs() < 1e-6);
        assert_eq!(b.coverage_type, CoverageType::Ec2InstanceSavingsPlan);
        assert!((b.effective_cost - (0.192 - 0.131)).abs() < 1e-3);
        assert_eq!(a.coverage_type, CoverageType::OnDemand);

        let utilization = &result.sp_utilization["arn:sp:1"];
        assert!((utilization.utilization_percent - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn s4_compute_sp_tops_up_remaining_instance() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![
                instance("a", "m5.2xlarge", "us-west-2", "us-west-2a", 0),
                instance("b", "m5.xlarge", "us-west-2", "us-west-2a", 0),
                instance("c", "m5.large", "us-west-2", "us-west-2a", 0),
            ],
        )
        .await;
        pricing
            .set_on_demand_prices(
                on_demand_table(&[
                    ("us-west-2", "m5.2xlarge", 0.384),
                    ("us-west-2", "m5.xlarge", 0.192),
                    ("us-west-2", "m5.large", 0.096),
                ])
                .await,
            )
            .await;
        risp.update_savings_plans(
            &"111111111111".to_string(),
            vec![
                savings_plan("arn:sp:ec2", SavingsPlanType::Ec2Instance, 0.20, Some("m5"), Some("us-west-2")),
                savings_plan("arn:sp:compute", SavingsPlanType::Compute, 0.30, None, None),
            ],
        )
        .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;

        let a = &result.instance_costs["a"];
        assert_eq!(a.coverage_type, CoverageType::ComputeSavingsPlan);
        assert!((a.effective_cost - 0.384 * 0.66).abs() < 1e-6);

        let utilization = &result.sp_utilization["arn:sp:compute"];
        assert!((utilization.utilization_percent - 84.48).abs() < 0.1);
    }

    #[tokio::test]
    async fn s5_spot_excluded_from_sp_coverage() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![
                instance("ondemand", "m5.large", "us-west-2", "us-west-2a", 0),
                spot_instance("spot", "m5.large", "us-west-2", "us-west-2a"),
            ],
        )
        .await;
        pricing
            .set_on_demand_prices(on_demand_table(&[("us-west-2", "m5.large", 0.096)]).await)
            .await;
        pricing
            .insert_spot_prices(vec![(
                InstanceType::from("m5.large"),
                "us-west-2a".to_string(),
                "Linux/UNIX".to_string(),
                0.034,
                Utc::now(),
            )])
            .await;
        risp.update_savings_plans(
            &"111111111111".to_string(),
            vec![savings_plan("arn:sp:1", SavingsPlanType::Ec2Instance, 5.0, Some("m5"), Some("us-west-2"))],
        )
        .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;

        let spot = &result.instance_costs["spot"];
        assert_eq!(spot.coverage_type, CoverageType::Spot);
        assert!((spot.effective_cost - 0.034).abs() < EPSILON);

        let ondemand = &result.instance_costs["ondemand"];
        assert_eq!(ondemand.coverage_type, CoverageType::Ec2InstanceSavingsPlan);
    }

    #[tokio::test]
    async fn s6_lazy_spot_refresh_updates_price_and_timestamp() {
        let pricing = PricingCache::new();
        let stale_time = Utc::now() - ChronoDuration::minutes(45);

        pricing
            .insert_spot_prices(vec![(
                InstanceType::from("m5.large"),
                "us-west-2a".to_string(),
                "linux/unix".to_string(),
                0.034,
                stale_time,
            )])
            .await;

        pricing
            .insert_spot_prices(vec![(
                InstanceType::from("m5.large"),
                "us-west-2a".to_string(),
                "linux/unix".to_string(),
                0.040,
                Utc::now(),
            )])
            .await;

        let entry = pricing
            .get_spot_price(&InstanceType::from("m5.large"), "us-west-2a", "linux/unix")
            .await
            .unwrap();
        assert!((entry.price - 0.040).abs() < EPSILON);
        assert!(Utc::now().signed_duration_since(entry.fetched_at) < ChronoDuration::seconds(5));
    }

    #[tokio::test]
    async fn p1_non_spot_invariant_holds_with_empty_caches() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;
        assert!(result.instance_costs.is_empty());
        assert!(result.sp_utilization.is_empty());
    }

    #[rstest]
    #[case(0.096, 0.096)]
    #[case(1.5, 1.5)]
    #[tokio::test]
    async fn p1_coverage_sums_to_shelf_price(#[case] rate: f64, #[case] expected: f64) {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![instance("i-1", "m5.large", "us-west-2", "us-west-2a", 0)],
        )
        .await;
        pricing
            .set_on_demand_prices(on_demand_table(&[("us-west-2", "m5.large", rate)]).await)
            .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;
        let cost = &result.instance_costs["i-1"];
        let sum = cost.ri_coverage + cost.savings_plan_coverage + cost.on_demand_cost;
        assert!((sum - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn p2_zero_commitment_yields_zero_utilization_percent_no_panic() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![instance("i-1", "m5.large", "us-west-2", "us-west-2a", 0)],
        )
        .await;
        pricing
            .set_on_demand_prices(on_demand_table(&[("us-west-2", "m5.large", 0.096)]).await)
            .await;
        risp.update_savings_plans(
            &"111111111111".to_string(),
            vec![savings_plan("arn:sp:1", SavingsPlanType::Compute, 0.0, None, None)],
        )
        .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;
        let utilization = &result.sp_utilization["arn:sp:1"];
        assert_eq!(utilization.utilization_percent, 0.0);
        assert_eq!(utilization.current_utilization_rate, 0.0);
    }

    #[tokio::test]
    async fn p4_no_instance_receives_more_than_one_sp_attribution() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![instance("i-1", "m5.large", "us-west-2", "us-west-2a", 0)],
        )
        .await;
        pricing
            .set_on_demand_prices(on_demand_table(&[("us-west-2", "m5.large", 0.096)]).await)
            .await;
        risp.update_savings_plans(
            &"111111111111".to_string(),
            vec![
                savings_plan("arn:sp:ec2", SavingsPlanType::Ec2Instance, 5.0, Some("m5"), Some("us-west-2")),
                savings_plan("arn:sp:compute", SavingsPlanType::Compute, 5.0, None, None),
            ],
        )
        .await;

        let result = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;
        let cost = &result.instance_costs["i-1"];
        assert_eq!(cost.coverage_type, CoverageType::Ec2InstanceSavingsPlan);

        let compute_utilization = &result.sp_utilization["arn:sp:compute"];
        assert_eq!(compute_utilization.current_utilization_rate, 0.0);
    }

    #[tokio::test]
    async fn p5_deterministic_across_repeated_runs() {
        let ec2 = Ec2Cache::new();
        let risp = RispCache::new();
        let pricing = PricingCache::new();

        ec2.set_instances(
            &"111111111111".to_string(),
            &"us-west-2".to_string(),
            vec![
                instance("a", "m5.2xlarge", "us-west-2", "us-west-2a", 0),
                instance("b", "m5.xlarge", "us-west-2", "us-west-2a", 0),
                instance("c", "m5.large", "us-west-2", "us-west-2a", 0),
            ],
        )
        .await;
        pricing
            .set_on_demand_prices(
                on_demand_table(&[
                    ("us-west-2", "m5.2xlarge", 0.384),
                    ("us-west-2", "m5.xlarge", 0.192),
                    ("us-west-2", "m5.large", 0.096),
                ])
                .await,
            )
            .await;
        risp.update_savings_plans(
            &"111111111111".to_string(),
            vec![savings_plan("arn:sp:1", SavingsPlanType::Ec2Instance, 0.20, Some("m5"), Some("us-west-2"))],
        )
        .await;

        let first = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;
        let second = compute(&ec2, &risp, &pricing, &EngineConfig::default()).await;

        for (id, cost) in &first.instance_costs {
            let other = &second.instance_costs[id];
            assert!((cost.effective_cost - other.effective_cost).abs() < EPSILON);
            assert_eq!(cost.coverage_type, other.coverage_type);
        }
    }
}
