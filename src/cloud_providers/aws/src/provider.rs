//! The concrete `CloudProvider` implementation backed by the AWS SDK.
//!
//! Clients are scoped per `(account, region)` and created on demand rather
//! than pooled (§5) — a reconciliation pass runs every few minutes at worst,
//! so the cost of re-resolving credentials and building a client per call is
//! negligible next to the network round trip it wraps.

use crate::config::{resolve_aws_config, AwsConfig};
use crate::pricing::fetch_on_demand_rates;
use async_trait::async_trait;
use aws_sdk_ec2::types::Filter as Ec2Filter;
use chrono::{DateTime, Utc};
use itertools::iproduct;
use lumina_common::error::ProviderErrorKind;
use lumina_common::model::{
    AccountId, Instance, InstanceState, InstanceType, Lifecycle, OperatingSystem, Platform,
    Region, ReservedInstance, ReservedInstanceScope, ReservedInstanceState, SavingsPlan,
    SavingsPlanState, SavingsPlanType, Tenancy,
};
use lumina_common::provider::{CloudProvider, ProviderResult, SpRateRow, SpotPriceRow};
use std::collections::HashMap;

/// Home region used for account-scoped (non-regional) AWS APIs: Savings Plans
/// and the Price List API both require a region to construct a client against
/// but do not themselves vary their data by it.
const GLOBAL_API_REGION: &str = "us-east-1";

pub struct AwsCloudProvider {
    account_configs: HashMap<AccountId, AwsConfig>,
}

impl AwsCloudProvider {
    pub fn new(account_configs: HashMap<AccountId, AwsConfig>) -> Self {
        Self { account_configs }
    }

    fn config_for(&self, account: &AccountId) -> ProviderResult<AwsConfig> {
        self.account_configs.get(account).cloned().ok_or_else(|| {
            ProviderErrorKind::permanent(anyhow::anyhow!(
                "no AWS credentials configured for account {account}"
            ))
        })
    }

    async fn ec2_client(
        &self,
        account: &AccountId,
        region: &Region,
    ) -> ProviderResult<aws_sdk_ec2::Client> {
        let conf = self.config_for(account)?;
        let sdk_config = resolve_aws_config(conf, region).await.ok_or_else(|| {
            ProviderErrorKind::permanent(anyhow::anyhow!(
                "failed to resolve AWS credentials for account {account} in {region}"
            ))
        })?;
        Ok(aws_sdk_ec2::Client::new(&sdk_config))
    }

    async fn savingsplans_client(
        &self,
        account: &AccountId,
    ) -> ProviderResult<aws_sdk_savingsplans::Client> {
        let conf = self.config_for(account)?;
        let sdk_config = resolve_aws_config(conf, GLOBAL_API_REGION)
            .await
            .ok_or_else(|| {
                ProviderErrorKind::permanent(anyhow::anyhow!(
                    "failed to resolve AWS credentials for account {account}"
                ))
            })?;
        Ok(aws_sdk_savingsplans::Client::new(&sdk_config))
    }

    async fn pricing_client(
        &self,
        account: &AccountId,
    ) -> ProviderResult<aws_sdk_pricing::Client> {
        let conf = self.config_for(account)?;
        let sdk_config = resolve_aws_config(conf, GLOBAL_API_REGION)
            .await
            .ok_or_else(|| {
                ProviderErrorKind::permanent(anyhow::anyhow!(
                    "failed to resolve AWS credentials for account {account}"
                ))
            })?;
        Ok(aws_sdk_pricing::Client::new(&sdk_config))
    }
}

fn classify_sdk_error<E, R>(err: aws_sdk_ec2::error::SdkError<E, R>) -> ProviderErrorKind
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match &err {
        aws_sdk_ec2::error::SdkError::ServiceError(service_err) => {
            let raw_status = service_err.raw().status().as_u16();
            if raw_status == 429 || raw_status >= 500 {
                ProviderErrorKind::transient(anyhow::Error::new(err))
            } else {
                ProviderErrorKind::permanent(anyhow::Error::new(err))
            }
        }
        aws_sdk_ec2::error::SdkError::TimeoutError(_)
        | aws_sdk_ec2::error::SdkError::DispatchFailure(_) => {
            ProviderErrorKind::transient(anyhow::Error::new(err))
        }
        _ => ProviderErrorKind::permanent(anyhow::Error::new(err)),
    }
}

fn platform_from_raw(raw: Option<&str>) -> Platform {
    match raw {
        Some("windows") => Platform::Windows,
        _ => Platform::Linux,
    }
}

#[async_trait]
impl CloudProvider for AwsCloudProvider {
    async fn list_instances(
        &self,
        account: &AccountId,
        region: &Region,
    ) -> ProviderResult<Vec<Instance>> {
        let client = self.ec2_client(account, region).await?;
        let mut instances = Vec::new();
        let mut paginator = client
            .describe_instances()
            .filters(
                Ec2Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .values("stopped")
                    .values("stopping")
                    .build(),
            )
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.map_err(classify_sdk_error)?;
            for reservation in page.reservations() {
                for raw in reservation.instances() {
                    let Some(instance_id) = raw.instance_id() else {
                        continue;
                    };
                    let Some(instance_type) = raw.instance_type() else {
                        continue;
                    };
                    let Some(launch_time) = raw.launch_time() else {
                        continue;
                    };

                    let state = raw
                        .state()
                        .and_then(|s| s.name())
                        .map(|name| InstanceState::from_raw(name.as_str()))
                        .unwrap_or(InstanceState::Other("unknown".to_string()));

                    let lifecycle = match raw.instance_lifecycle() {
                        Some(lc) if lc.as_str() == "spot" => Lifecycle::Spot,
                        _ => Lifecycle::OnDemand,
                    };

                    let tenancy = match raw.placement().and_then(|p| p.tenancy()).map(|t| t.as_str()) {
                        Some("dedicated") => Tenancy::Dedicated,
                        Some("host") => Tenancy::Host,
                        _ => Tenancy::Default,
                    };

                    let platform = platform_from_raw(raw.platform_details());

                    instances.push(Instance {
                        instance_id: instance_id.to_string(),
                        instance_type: InstanceType::from(instance_type.as_str()),
                        region: region.clone(),
                        availability_zone: raw
                            .placement()
                            .and_then(|p| p.availability_zone())
                            .unwrap_or_default()
                            .to_string(),
                        account_id: account.clone(),
                        state,
                        lifecycle,
                        tenancy,
                        platform,
                        launch_time: DateTime::from_timestamp(launch_time.secs(), 0)
                            .unwrap_or_else(Utc::now),
                    });
                }
            }
        }

        Ok(instances)
    }

    async fn list_reserved_instances(
        &self,
        account: &AccountId,
        regions: &[Region],
    ) -> ProviderResult<Vec<ReservedInstance>> {
        let mut all = Vec::new();
        for region in regions {
            let client = self.ec2_client(account, region).await?;
            let response = client
                .describe_reserved_instances()
                .filters(
                    Ec2Filter::builder()
                        .name("state")
                        .values("active")
                        .values("payment-pending")
                        .build(),
                )
                .send()
                .await
                .map_err(classify_sdk_error)?;

            for ri in response.reserved_instances() {
                let (Some(id), Some(instance_type), Some(count)) =
                    (ri.reserved_instances_id(), ri.instance_type(), ri.instance_count())
                else {
                    continue;
                };

                all.push(ReservedInstance {
                    reserved_instance_id: id.to_string(),
                    instance_type: InstanceType::from(instance_type.as_str()),
                    instance_count: count as u32,
                    availability_zone: ri.availability_zone().map(|s| s.to_string()),
                    region: region.clone(),
                    account_id: account.clone(),
                    state: ri
                        .state()
                        .map(|s| ReservedInstanceState::from_raw(s.as_str()))
                        .unwrap_or(ReservedInstanceState::Other("unknown".to_string())),
                    offering_class: ri
                        .offering_class()
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_default(),
                    scope: match ri.scope().map(|s| s.as_str()) {
                        Some("Availability Zone") => ReservedInstanceScope::Az,
                        _ => ReservedInstanceScope::Region,
                    },
                });
            }
        }
        Ok(all)
    }

    async fn list_savings_plans(&self, account: &AccountId) -> ProviderResult<Vec<SavingsPlan>> {
        let client = self.savingsplans_client(account).await?;
        let mut all = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = client.describe_savings_plans().states(
                aws_sdk_savingsplans::types::SavingsPlanState::Active,
            );
            if let Some(token) = &next_token {
                request = request.next_token(token.clone());
            }

            let response = request.send().await.map_err(|e| {
                ProviderErrorKind::transient(anyhow::Error::new(e))
            })?;

            for sp in response.savings_plans() {
                let (Some(arn), Some(id), Some(commitment_str)) = (
                    sp.savings_plan_arn(),
                    sp.savings_plan_id(),
                    sp.commitment(),
                ) else {
                    continue;
                };
                let Ok(commitment) = commitment_str.parse::<f64>() else {
                    continue;
                };

                let savings_plan_type = match sp.savings_plan_type() {
                    Some(t) if t.as_str() == "EC2Instance" => SavingsPlanType::Ec2Instance,
                    _ => SavingsPlanType::Compute,
                };

                all.push(SavingsPlan {
                    savings_plan_arn: arn.to_string(),
                    savings_plan_id: id.to_string(),
                    account_id: account.clone(),
                    savings_plan_type,
                    state: sp
                        .state()
                        .map(|s| SavingsPlanState::from_raw(s.as_str()))
                        .unwrap_or(SavingsPlanState::Other("unknown".to_string())),
                    commitment,
                    region: sp.ec2_instance_family().and_then(|_| sp.region()).map(|r| r.to_string()),
                    instance_family: sp.ec2_instance_family().map(|f| f.to_string()),
                    start: sp
                        .start()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                    end: sp
                        .end()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                });
            }

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        Ok(all)
    }

    async fn describe_savings_plan_rates(
        &self,
        account: &AccountId,
        savings_plan: &SavingsPlan,
        instance_types: &[InstanceType],
        regions: &[Region],
        oses: &[OperatingSystem],
        tenancies: &[Tenancy],
    ) -> ProviderResult<Vec<SpRateRow>> {
        let client = self.savingsplans_client(account).await?;
        let wanted_types: std::collections::HashSet<&str> =
            instance_types.iter().map(|t| t.0.as_str()).collect();
        let wanted_regions: std::collections::HashSet<&str> =
            regions.iter().map(|r| r.as_str()).collect();
        let wanted_os: std::collections::HashSet<&str> =
            oses.iter().map(|o| o.as_lowercase()).collect();
        let wanted_tenancy: std::collections::HashSet<String> =
            tenancies.iter().map(|t| t.to_string()).collect();

        let mut rows = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = client
                .describe_savings_plan_rates()
                .savings_plan_id(savings_plan.savings_plan_id.clone());
            if let Some(token) = &next_token {
                request = request.next_token(token.clone());
            }

            let response = request.send().await.map_err(|e| {
                ProviderErrorKind::transient(anyhow::Error::new(e))
            })?;

            for rate in response.savings_plan_rates() {
                let Some(usage_type) = rate.usage_type() else {
                    continue;
                };
                let Some(rate_value) = rate.rate() else {
                    continue;
                };
                let Ok(rate_value) = rate_value.parse::<f64>() else {
                    continue;
                };

                let properties: HashMap<&str, &str> = rate
                    .properties()
                    .iter()
                    .filter_map(|p| Some((p.property()?, p.value()?)))
                    .collect();

                let Some(instance_type) = properties.get("INSTANCE_TYPE") else {
                    continue;
                };
                let Some(region) = properties.get("REGION") else {
                    continue;
                };
                let os = properties
                    .get("OPERATING_SYSTEM")
                    .copied()
                    .unwrap_or("linux")
                    .to_lowercase();
                let tenancy = properties
                    .get("TENANCY")
                    .copied()
                    .unwrap_or("shared")
                    .to_string();
                let product_description = properties
                    .get("PRODUCT_DESCRIPTION")
                    .copied()
                    .unwrap_or(usage_type)
                    .to_string();

                if !wanted_types.contains(instance_type)
                    || !wanted_regions.contains(region)
                    || !wanted_os.contains(os.as_str())
                    || !wanted_tenancy.contains(&tenancy)
                {
                    continue;
                }

                rows.push(SpRateRow {
                    savings_plan_arn: savings_plan.savings_plan_arn.clone(),
                    instance_type: InstanceType::from(*instance_type),
                    region: region.to_string(),
                    tenancy: tenancies
                        .iter()
                        .find(|t| t.to_string() == tenancy)
                        .copied()
                        .unwrap_or(Tenancy::Default),
                    product_description,
                    rate: rate_value,
                });
            }

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        Ok(rows)
    }

    async fn describe_spot_price_history(
        &self,
        account: &AccountId,
        region: &Region,
        instance_types: &[InstanceType],
        product_descriptions: &[String],
    ) -> ProviderResult<Vec<SpotPriceRow>> {
        let client = self.ec2_client(account, region).await?;
        let mut rows = Vec::new();
        let type_strings: Vec<String> = instance_types.iter().map(|t| t.0.clone()).collect();

        let mut paginator = client
            .describe_spot_price_history()
            .set_instance_types(Some(
                type_strings
                    .iter()
                    .filter_map(|s| aws_sdk_ec2::types::InstanceType::try_parse(s).ok())
                    .collect(),
            ))
            .set_product_descriptions(Some(product_descriptions.to_vec()))
            .start_time(aws_sdk_ec2::primitives::DateTime::from(Utc::now()))
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.map_err(classify_sdk_error)?;
            for entry in page.spot_price_history() {
                let (Some(instance_type), Some(az), Some(product), Some(price_str), Some(timestamp)) = (
                    entry.instance_type(),
                    entry.availability_zone(),
                    entry.product_description(),
                    entry.spot_price(),
                    entry.timestamp(),
                ) else {
                    continue;
                };
                let Ok(price) = price_str.parse::<f64>() else {
                    continue;
                };

                rows.push(SpotPriceRow {
                    instance_type: InstanceType::from(instance_type.as_str()),
                    availability_zone: az.to_string(),
                    product_description: product.as_str().to_string(),
                    price,
                    timestamp: DateTime::from_timestamp(timestamp.secs(), 0).unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(rows)
    }

    async fn load_all_on_demand_pricing(
        &self,
        regions: &[Region],
        oses: &[OperatingSystem],
    ) -> ProviderResult<HashMap<(Region, InstanceType, OperatingSystem), f64>> {
        let Some(any_account) = self.account_configs.keys().next().cloned() else {
            return Err(ProviderErrorKind::permanent(anyhow::anyhow!(
                "no accounts configured, cannot resolve pricing client"
            )));
        };
        let client = self.pricing_client(&any_account).await?;

        let mut combined = HashMap::new();
        for (region, os) in iproduct!(regions.iter(), oses.iter()) {
            let rates = fetch_on_demand_rates(&client, region, *os)
                .await
                .map_err(ProviderErrorKind::transient)?;
            for (instance_type, rate) in rates {
                combined.insert((region.clone(), instance_type, *os), rate);
            }
        }

        Ok(combined)
    }
}
