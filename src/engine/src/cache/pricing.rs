//! Pricing cache (§4.2): on-demand table, spot entries, and Savings-Plan
//! rates with sentinel support for negative caching.

use chrono::{DateTime, Utc};
use lumina_common::model::{
    InstanceType, OperatingSystem, Region, SavingsPlanArn, SpRateValue, SpotPriceEntry, Tenancy,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// `lower(type:az:productDescription)` per §4.6.
pub fn build_spot_key(instance_type: &InstanceType, az: &str, product_description: &str) -> String {
    format!(
        "{}:{}:{}",
        instance_type.0.to_lowercase(),
        az.to_lowercase(),
        product_description.to_lowercase()
    )
}

/// `spArn,instanceType,region,tenancy,os`, comma-separated and lowercased.
pub fn build_sp_rate_key(
    sp_arn: &SavingsPlanArn,
    instance_type: &InstanceType,
    region: &Region,
    tenancy: Tenancy,
    os: OperatingSystem,
) -> String {
    format!(
        "{},{},{},{},{}",
        sp_arn.to_lowercase(),
        instance_type.0.to_lowercase(),
        region.to_lowercase(),
        tenancy.to_string().to_lowercase(),
        os.as_lowercase()
    )
}

/// Inverse of [`build_sp_rate_key`]. Returns `None` for a malformed key.
pub fn parse_sp_rate_key(key: &str) -> Option<(String, String, String, String, String)> {
    let mut parts = key.split(',');
    let sp_arn = parts.next()?.to_string();
    let instance_type = parts.next()?.to_string();
    let region = parts.next()?.to_string();
    let tenancy = parts.next()?.to_string();
    let os = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    Some((sp_arn, instance_type, region, tenancy, os))
}

#[derive(Default)]
pub struct PricingCache {
    on_demand: RwLock<HashMap<(Region, InstanceType, OperatingSystem), f64>>,
    spot: RwLock<HashMap<String, SpotPriceEntry>>,
    sp_rates: RwLock<HashMap<String, SpRateValue>>,
}

impl PricingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_on_demand_prices(&self, table: HashMap<(Region, InstanceType, OperatingSystem), f64>) {
        *self.on_demand.write().await = table;
    }

    pub async fn get_on_demand_price(
        &self,
        region: &Region,
        instance_type: &InstanceType,
        os: OperatingSystem,
    ) -> Option<f64> {
        self.on_demand
            .read()
            .await
            .get(&(region.clone(), instance_type.clone(), os))
            .copied()
    }

    /// Merges new entries, stamping `fetched_at = now`. Returns the count of
    /// keys that did not previously exist.
    pub async fn insert_spot_prices(&self, entries: Vec<(InstanceType, String, String, f64, DateTime<Utc>)>) -> usize {
        let mut guard = self.spot.write().await;
        let mut added = 0;
        let now = Utc::now();
        for (instance_type, az, product_description, price, timestamp) in entries {
            let key = build_spot_key(&instance_type, &az, &product_description);
            if !guard.contains_key(&key) {
                added += 1;
            }
            guard.insert(
                key,
                SpotPriceEntry {
                    instance_type,
                    availability_zone: az,
                    product_description,
                    price,
                    timestamp,
                    fetched_at: now,
                },
            );
        }
        added
    }

    pub async fn get_spot_price(
        &self,
        instance_type: &InstanceType,
        az: &str,
        product_description: &str,
    ) -> Option<SpotPriceEntry> {
        let key = build_spot_key(instance_type, az, product_description);
        self.spot.read().await.get(&key).cloned()
    }

    pub async fn get_all_spot_prices_with_timestamps(&self) -> Vec<SpotPriceEntry> {
        self.spot.read().await.values().cloned().collect()
    }

    pub async fn add_sp_rates(&self, rows: Vec<(String, SpRateValue)>) {
        let mut guard = self.sp_rates.write().await;
        for (key, value) in rows {
            guard.insert(key, value);
        }
    }

    /// `None` both when the key is absent and when it holds the sentinel —
    /// a sentinel lookup behaves identically to "not cached" (P7).
    pub async fn get_sp_rate(&self, key: &str) -> Option<f64> {
        self.sp_rates.read().await.get(key).and_then(SpRateValue::as_positive_rate)
    }

    pub async fn has_any_sp_rate(&self, sp_arn: &SavingsPlanArn) -> bool {
        let prefix = format!("{},", sp_arn.to_lowercase());
        self.sp_rates.read().await.keys().any(|k| k.starts_with(&prefix))
    }

    /// Returns the sub-slices of `types`/`regions`/`tenancies`/`oses` for
    /// which this SP has no cached entry (sentinel or otherwise) — the
    /// filters for an incremental `DescribeSavingsPlanRates` call.
    pub async fn get_missing_sp_rates_for_instances(
        &self,
        sp_arn: &SavingsPlanArn,
        types: &[InstanceType],
        regions: &[Region],
        tenancies: &[Tenancy],
        oses: &[OperatingSystem],
    ) -> (Vec<InstanceType>, Vec<Region>, Vec<Tenancy>, Vec<OperatingSystem>) {
        let guard = self.sp_rates.read().await;

        let missing_types: Vec<InstanceType> = types
            .iter()
            .filter(|t| {
                !regions.iter().any(|r| {
                    tenancies.iter().any(|tn| {
                        oses.iter()
                            .any(|os| guard.contains_key(&build_sp_rate_key(sp_arn, t, r, *tn, *os)))
                    })
                })
            })
            .cloned()
            .collect();

        let missing_regions: Vec<Region> = regions
            .iter()
            .filter(|r| {
                !types.iter().any(|t| {
                    tenancies.iter().any(|tn| {
                        oses.iter()
                            .any(|os| guard.contains_key(&build_sp_rate_key(sp_arn, t, r, *tn, *os)))
                    })
                })
            })
            .cloned()
            .collect();

        let missing_tenancies: Vec<Tenancy> = tenancies
            .iter()
            .filter(|tn| {
                !types.iter().any(|t| {
                    regions.iter().any(|r| {
                        oses.iter()
                            .any(|os| guard.contains_key(&build_sp_rate_key(sp_arn, t, r, **tn, *os)))
                    })
                })
            })
            .copied()
            .collect();

        let missing_oses: Vec<OperatingSystem> = oses
            .iter()
            .filter(|os| {
                !types.iter().any(|t| {
                    regions.iter().any(|r| {
                        tenancies
                            .iter()
                            .any(|tn| guard.contains_key(&build_sp_rate_key(sp_arn, t, r, *tn, **os)))
                    })
                })
            })
            .copied()
            .collect();

        (missing_types, missing_regions, missing_tenancies, missing_oses)
    }

    /// All cached entries whose key belongs to `sp_arn`, for the debug HTTP
    /// surface. Sentinel entries are included so the operator can see
    /// negative-cached combinations too.
    pub async fn get_all_sp_rates_for(&self, sp_arn: &str) -> Vec<(String, SpRateValue)> {
        let prefix = format!("{},", sp_arn.to_lowercase());
        self.sp_rates
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn get_all_on_demand_prices(&self) -> HashMap<(Region, InstanceType, OperatingSystem), f64> {
        self.on_demand.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sp_rate_key_round_trips() {
        let key = build_sp_rate_key(
            &"arn:aws:savingsplans::111111111111:savingsplan/abc".to_string(),
            &InstanceType::from("M5.Large"),
            &"US-WEST-2".to_string(),
            Tenancy::Default,
            OperatingSystem::Linux,
        );
        let parsed = parse_sp_rate_key(&key).expect("key should parse");
        let rebuilt = format!(
            "{},{},{},{},{}",
            parsed.0, parsed.1, parsed.2, parsed.3, parsed.4
        );
        assert_eq!(rebuilt, key);
        assert_eq!(key, key.to_lowercase());
    }

    #[test]
    fn malformed_key_fails_to_parse() {
        assert!(parse_sp_rate_key("too,few,parts").is_none());
        assert!(parse_sp_rate_key("way,too,many,parts,here,extra").is_none());
    }

    #[tokio::test]
    async fn sentinel_never_satisfies_get_sp_rate() {
        let cache = PricingCache::new();
        let key = build_sp_rate_key(
            &"arn:aws:savingsplans::111111111111:savingsplan/abc".to_string(),
            &InstanceType::from("m5.large"),
            &"us-west-2".to_string(),
            Tenancy::Default,
            OperatingSystem::Linux,
        );
        cache.add_sp_rates(vec![(key.clone(), SpRateValue::NotAvailable)]).await;
        assert_eq!(cache.get_sp_rate(&key).await, None);

        cache.add_sp_rates(vec![(key.clone(), SpRateValue::Rate(0.05))]).await;
        assert_eq!(cache.get_sp_rate(&key).await, Some(0.05));
    }

    #[tokio::test]
    async fn insert_spot_prices_counts_only_new_keys() {
        let cache = PricingCache::new();
        let now = Utc::now();
        let added = cache
            .insert_spot_prices(vec![(
                InstanceType::from("m5.large"),
                "us-west-2a".to_string(),
                "Linux/UNIX".to_string(),
                0.034,
                now,
            )])
            .await;
        assert_eq!(added, 1);

        let added_again = cache
            .insert_spot_prices(vec![(
                InstanceType::from("m5.large"),
                "us-west-2a".to_string(),
                "Linux/UNIX".to_string(),
                0.040,
                now,
            )])
            .await;
        assert_eq!(added_again, 0);

        let entry = cache
            .get_spot_price(&InstanceType::from("m5.large"), "us-west-2a", "Linux/UNIX")
            .await
            .expect("entry should exist");
        assert_eq!(entry.price, 0.040);
    }
}
