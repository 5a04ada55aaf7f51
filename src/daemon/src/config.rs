//! Configuration loading and validation (§6), built the same way
//! `tracer_client::config_manager::ConfigLoader` loads `Config`: a
//! `config::Config::builder()` with `set_default` for every field, an
//! optional file layer, then an environment layer with the `LUMINA_` prefix.

use lumina_common::constants::{
    DEFAULT_ACCOUNT_VALIDATION_INTERVAL, DEFAULT_COMPUTE_SP_DISCOUNT,
    DEFAULT_EC2_INSTANCE_SP_DISCOUNT, DEFAULT_EC2_RECONCILE_INTERVAL,
    DEFAULT_HEALTH_PROBE_BIND_ADDRESS, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_PRICING_RECONCILE_INTERVAL, DEFAULT_REGION, DEFAULT_RISP_RECONCILE_INTERVAL,
    DEFAULT_SPOT_PRICE_CACHE_EXPIRATION, DEFAULT_SPOT_PRICING_RECONCILE_INTERVAL,
    LUMINA_ENV_PREFIX,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("account id {0:?} must be exactly 12 numeric digits")]
    InvalidAccountId(String),
    #[error("role arn {0:?} is not of the form arn:(aws|aws-us-gov|aws-cn):iam::<accountId>:role/<name>")]
    InvalidRoleArn(String),
    #[error("role arn {arn:?} embeds account id {embedded:?}, but the account's accountId is {declared:?}")]
    AccountIdMismatch {
        arn: String,
        embedded: String,
        declared: String,
    },
    #[error("duplicate account id {0:?}")]
    DuplicateAccountId(String),
    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },
    #[error("no aws accounts configured")]
    NoAccounts,
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AwsAccountConfig {
    pub account_id: String,
    pub name: String,
    pub assume_role_arn: String,
    pub region: Option<String>,
    pub regions: Option<Vec<String>>,
}

impl AwsAccountConfig {
    pub fn regions(&self) -> Vec<String> {
        if let Some(regions) = &self.regions {
            regions.clone()
        } else if let Some(region) = &self.region {
            vec![region.clone()]
        } else {
            vec![]
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    pub ec2_seconds: u64,
    pub risp_seconds: u64,
    pub pricing_seconds: u64,
    pub spot_pricing_seconds: u64,
}

impl ReconciliationConfig {
    pub fn ec2(&self) -> Duration {
        Duration::from_secs(self.ec2_seconds)
    }
    pub fn risp(&self) -> Duration {
        Duration::from_secs(self.risp_seconds)
    }
    pub fn pricing(&self) -> Duration {
        Duration::from_secs(self.pricing_seconds)
    }
    pub fn spot_pricing(&self) -> Duration {
        Duration::from_secs(self.spot_pricing_seconds)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PricingConfig {
    pub operating_systems: Vec<String>,
    pub spot_price_cache_expiration_seconds: u64,
    pub ec2_instance_discount: f64,
    pub compute_discount: f64,
}

impl PricingConfig {
    pub fn spot_price_cache_expiration(&self) -> Duration {
        Duration::from_secs(self.spot_price_cache_expiration_seconds)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub aws_accounts: Vec<AwsAccountConfig>,
    pub default_account: Option<String>,
    pub default_region: String,
    pub regions: Vec<String>,
    pub log_level: String,
    pub metrics_bind_address: String,
    pub health_probe_bind_address: String,
    pub account_validation_interval_seconds: u64,
    pub reconciliation: ReconciliationConfig,
    pub pricing: PricingConfig,
}

impl Config {
    pub fn account_validation_interval(&self) -> Duration {
        Duration::from_secs(self.account_validation_interval_seconds)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_config_at(path: &Path) -> Result<Config, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder
            .set_default("aws_accounts", Vec::<String>::new())?
            .set_default("default_account", Some(None::<String>))?
            .set_default("default_region", DEFAULT_REGION)?
            .set_default("regions", Vec::<String>::new())?
            .set_default("log_level", "info")?
            .set_default("metrics_bind_address", DEFAULT_METRICS_BIND_ADDRESS)?
            .set_default("health_probe_bind_address", DEFAULT_HEALTH_PROBE_BIND_ADDRESS)?
            .set_default(
                "account_validation_interval_seconds",
                DEFAULT_ACCOUNT_VALIDATION_INTERVAL.as_secs() as i64,
            )?
            .set_default("reconciliation.ec2_seconds", DEFAULT_EC2_RECONCILE_INTERVAL.as_secs() as i64)?
            .set_default("reconciliation.risp_seconds", DEFAULT_RISP_RECONCILE_INTERVAL.as_secs() as i64)?
            .set_default(
                "reconciliation.pricing_seconds",
                DEFAULT_PRICING_RECONCILE_INTERVAL.as_secs() as i64,
            )?
            .set_default(
                "reconciliation.spot_pricing_seconds",
                DEFAULT_SPOT_PRICING_RECONCILE_INTERVAL.as_secs() as i64,
            )?
            .set_default("pricing.operating_systems", vec!["Linux", "Windows"])?
            .set_default(
                "pricing.spot_price_cache_expiration_seconds",
                DEFAULT_SPOT_PRICE_CACHE_EXPIRATION.as_secs() as i64,
            )?
            .set_default("pricing.ec2_instance_discount", DEFAULT_EC2_INSTANCE_SP_DISCOUNT)?
            .set_default("pricing.compute_discount", DEFAULT_COMPUTE_SP_DISCOUNT)?;

        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(LUMINA_ENV_PREFIX)
                .separator("_")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.aws_accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }

        let mut seen = std::collections::HashSet::new();
        for account in &config.aws_accounts {
            if account.account_id.len() != 12 || !account.account_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::InvalidAccountId(account.account_id.clone()));
            }
            if !seen.insert(account.account_id.clone()) {
                return Err(ConfigError::DuplicateAccountId(account.account_id.clone()));
            }
            let embedded = parse_role_arn_account_id(&account.assume_role_arn)
                .ok_or_else(|| ConfigError::InvalidRoleArn(account.assume_role_arn.clone()))?;
            if embedded != account.account_id {
                return Err(ConfigError::AccountIdMismatch {
                    arn: account.assume_role_arn.clone(),
                    embedded,
                    declared: account.account_id.clone(),
                });
            }
        }

        check_duration_field("reconciliation.ec2_seconds", config.reconciliation.ec2_seconds)?;
        check_duration_field("reconciliation.risp_seconds", config.reconciliation.risp_seconds)?;
        check_duration_field("reconciliation.pricing_seconds", config.reconciliation.pricing_seconds)?;
        check_duration_field(
            "reconciliation.spot_pricing_seconds",
            config.reconciliation.spot_pricing_seconds,
        )?;
        check_duration_field(
            "pricing.spot_price_cache_expiration_seconds",
            config.pricing.spot_price_cache_expiration_seconds,
        )?;
        check_duration_field(
            "account_validation_interval_seconds",
            config.account_validation_interval_seconds,
        )?;

        Ok(())
    }
}

/// Every duration field in the schema is a positive second count; zero would
/// spin a reconciler in a busy loop.
fn check_duration_field(field: &'static str, seconds: u64) -> Result<(), ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::InvalidDuration {
            field,
            value: seconds.to_string(),
        });
    }
    Ok(())
}

/// `arn:(aws|aws-us-gov|aws-cn):iam::<accountId>:role/<name>` — returns the
/// embedded account id, or `None` if the ARN doesn't match that shape.
fn parse_role_arn_account_id(arn: &str) -> Option<String> {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() < 6 {
        return None;
    }
    if parts[0] != "arn" {
        return None;
    }
    if !matches!(parts[1], "aws" | "aws-us-gov" | "aws-cn") {
        return None;
    }
    if parts[2] != "iam" {
        return None;
    }
    let account_id = parts[4];
    if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !parts[5].starts_with("role/") {
        return None;
    }
    Some(account_id.to_string())
}
