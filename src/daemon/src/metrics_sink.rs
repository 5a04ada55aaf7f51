//! A concrete `MetricsSink` backed by the `prometheus` crate, scraped by the
//! debug HTTP surface's `/metrics` route.

use lumina_common::metrics::{
    coverage_type_label, pricing_accuracy_label, savings_plan_type_label, MetricsSink,
};
use lumina_common::model::{DataKind, InstanceCost, SavingsPlanType, SavingsPlanUtilization};
use prometheus::{GaugeVec, Opts, Registry};

pub struct PrometheusMetricsSink {
    registry: Registry,
    data_last_success: GaugeVec,
    data_freshness_seconds: GaugeVec,
    instance_effective_cost: GaugeVec,
    sp_current_utilization_rate: GaugeVec,
    sp_remaining_capacity: GaugeVec,
    sp_utilization_percent: GaugeVec,
    reserved_instance_inventory: GaugeVec,
    savings_plan_inventory: GaugeVec,
}

impl PrometheusMetricsSink {
    pub fn new() -> Self {
        let registry = Registry::new();

        let data_last_success = GaugeVec::new(
            Opts::new("data_last_success", "Whether the last reconcile cycle succeeded (1) or not (0)"),
            &["account", "region", "kind"],
        )
        .expect("valid metric opts");
        let data_freshness_seconds = GaugeVec::new(
            Opts::new("data_freshness_seconds", "Seconds since this partition was last refreshed"),
            &["account", "region", "kind"],
        )
        .expect("valid metric opts");
        let instance_effective_cost = GaugeVec::new(
            Opts::new("instance_effective_cost", "Per-instance effective hourly cost after discount attribution"),
            &["account", "region", "instance_type", "instance_id", "coverage_type", "pricing_accuracy", "platform"],
        )
        .expect("valid metric opts");
        let sp_current_utilization_rate = GaugeVec::new(
            Opts::new("savings_plan_current_utilization_rate", "USD/hour of commitment currently consumed"),
            &["savings_plan_arn"],
        )
        .expect("valid metric opts");
        let sp_remaining_capacity = GaugeVec::new(
            Opts::new("savings_plan_remaining_capacity", "USD/hour of commitment left unconsumed"),
            &["savings_plan_arn"],
        )
        .expect("valid metric opts");
        let sp_utilization_percent = GaugeVec::new(
            Opts::new("savings_plan_utilization_percent", "Percentage of commitment currently consumed"),
            &["savings_plan_arn"],
        )
        .expect("valid metric opts");
        let reserved_instance_inventory = GaugeVec::new(
            Opts::new("reserved_instance_inventory", "Active Reserved Instance count"),
            &["account", "region", "instance_type"],
        )
        .expect("valid metric opts");
        let savings_plan_inventory = GaugeVec::new(
            Opts::new("savings_plan_inventory", "Savings Plan commitment, USD/hour"),
            &["savings_plan_arn", "account", "savings_plan_type"],
        )
        .expect("valid metric opts");

        for collector in [
            data_last_success.clone(),
            data_freshness_seconds.clone(),
            instance_effective_cost.clone(),
            sp_current_utilization_rate.clone(),
            sp_remaining_capacity.clone(),
            sp_utilization_percent.clone(),
            reserved_instance_inventory.clone(),
            savings_plan_inventory.clone(),
        ] {
            registry
                .register(Box::new(collector))
                .expect("metric names are unique");
        }

        Self {
            registry,
            data_last_success,
            data_freshness_seconds,
            instance_effective_cost,
            sp_current_utilization_rate,
            sp_remaining_capacity,
            sp_utilization_percent,
            reserved_instance_inventory,
            savings_plan_inventory,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for PrometheusMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn set_data_last_success(&self, account: &str, region: &str, kind: DataKind, success: bool) {
        self.data_last_success
            .with_label_values(&[account, region, kind.as_str()])
            .set(if success { 1.0 } else { 0.0 });
    }

    fn set_data_freshness_seconds(&self, account: &str, region: &str, kind: DataKind, seconds: f64) {
        self.data_freshness_seconds
            .with_label_values(&[account, region, kind.as_str()])
            .set(seconds);
    }

    fn set_instance_effective_cost(&self, cost: &InstanceCost) {
        self.instance_effective_cost
            .with_label_values(&[
                &cost.account_id,
                &cost.region,
                &cost.instance_type.0,
                &cost.instance_id,
                coverage_type_label(cost.coverage_type),
                pricing_accuracy_label(cost.pricing_accuracy),
                &cost.platform.to_string(),
            ])
            .set(cost.effective_cost);
    }

    fn set_savings_plan_utilization(&self, arn: &str, utilization: &SavingsPlanUtilization) {
        self.sp_current_utilization_rate
            .with_label_values(&[arn])
            .set(utilization.current_utilization_rate);
        self.sp_remaining_capacity
            .with_label_values(&[arn])
            .set(utilization.remaining_capacity);
        self.sp_utilization_percent
            .with_label_values(&[arn])
            .set(utilization.utilization_percent);
    }

    fn set_reserved_instance_inventory(&self, account: &str, region: &str, instance_type: &str, count: u32) {
        self.reserved_instance_inventory
            .with_label_values(&[account, region, instance_type])
            .set(count as f64);
    }

    fn set_savings_plan_inventory(
        &self,
        arn: &str,
        account: &str,
        savings_plan_type: SavingsPlanType,
        commitment: f64,
    ) {
        self.savings_plan_inventory
            .with_label_values(&[arn, account, savings_plan_type_label(savings_plan_type)])
            .set(commitment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumina_common::model::{CoverageType, Platform, PricingAccuracy};
    use prometheus::Encoder;

    fn sample_cost() -> InstanceCost {
        InstanceCost {
            instance_id: "i-1".into(),
            account_id: "123456789012".into(),
            region: "us-west-2".into(),
            instance_type: "m5.xlarge".into(),
            platform: Platform::Linux,
            shelf_price: 0.192,
            effective_cost: 0.096,
            on_demand_cost: 0.0,
            ri_coverage: 0.096,
            savings_plan_coverage: 0.0,
            savings_plan_arn: None,
            coverage_type: CoverageType::ReservedInstance,
            pricing_accuracy: PricingAccuracy::Accurate,
        }
    }

    #[test]
    fn records_instance_cost_under_its_labels() {
        let sink = PrometheusMetricsSink::new();
        sink.set_instance_effective_cost(&sample_cost());

        let mut buf = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&sink.registry().gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("instance_effective_cost"));
        assert!(text.contains("i-1"));
    }

    #[test]
    fn data_last_success_reflects_boolean_as_zero_or_one() {
        let sink = PrometheusMetricsSink::new();
        sink.set_data_last_success("123456789012", "us-west-2", DataKind::Ec2Inventory, true);
        sink.set_data_last_success("123456789012", "us-east-1", DataKind::Ec2Inventory, false);

        let metric_family = sink
            .registry()
            .gather()
            .into_iter()
            .find(|mf| mf.get_name() == "data_last_success")
            .unwrap();

        let values: Vec<f64> = metric_family.get_metric().iter().map(|m| m.get_gauge().get_value()).collect();
        assert!(values.contains(&1.0));
        assert!(values.contains(&0.0));
    }
}
