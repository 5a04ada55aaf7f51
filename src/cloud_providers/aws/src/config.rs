//! Per-account AWS SDK configuration resolution, adapted from the assume-role
//! plumbing this system's AWS client layer has always used.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use serde::{Deserialize, Serialize};

/// How to obtain credentials for one account.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AwsConfig {
    Profile(String),
    RoleArn(String),
    Env,
}

/// Builds a fully authenticated `SdkConfig` for `region`, or `None` if
/// credentials could not be resolved (the caller treats this as a permanent
/// provider failure).
pub async fn resolve_aws_config(initialization_conf: AwsConfig, region: &str) -> Option<SdkConfig> {
    let config_loader = aws_config::defaults(BehaviorVersion::latest());
    let config = match initialization_conf {
        AwsConfig::Profile(profile) => config_loader.profile_name(profile),
        AwsConfig::RoleArn(arn) => {
            let assumed_role_provider = aws_config::sts::AssumeRoleProvider::builder(arn)
                .session_name("lumina-cost-controller")
                .build()
                .await;

            let assumed_credentials_provider =
                match assumed_role_provider.provide_credentials().await {
                    Ok(creds) => creds,
                    Err(_) => return None,
                };

            config_loader.credentials_provider(assumed_credentials_provider)
        }
        AwsConfig::Env => aws_config::from_env(),
    }
    .region(region.to_string())
    .load()
    .await;

    let credentials_provider = config.credentials_provider()?;
    credentials_provider.provide_credentials().await.ok()?;

    Some(config)
}
