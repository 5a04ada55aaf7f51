use anyhow::Context;
use clap::Parser;
use lumina_aws::{AwsCloudProvider, AwsConfig};
use lumina_common::model::AccountId;
use lumina_daemon::{http, ConfigLoader, Orchestrator, PrometheusMetricsSink};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lumina", about = "Cloud cost observability controller for AWS fleets")]
struct Args {
    /// Path to the TOML config file layered under defaults and LUMINA_* env vars.
    #[arg(long, default_value = "lumina.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::load_config_at(&args.config).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    tracing::info!(accounts = config.aws_accounts.len(), "starting lumina cost controller");

    let account_configs: HashMap<AccountId, AwsConfig> = config
        .aws_accounts
        .iter()
        .map(|account| (account.account_id.clone(), AwsConfig::RoleArn(account.assume_role_arn.clone())))
        .collect();

    let provider = Arc::new(AwsCloudProvider::new(account_configs));
    let metrics = Arc::new(PrometheusMetricsSink::new());
    let orchestrator = Arc::new(Orchestrator::new(provider, metrics.clone(), &config));

    let (ec2_cache, risp_cache, pricing_cache) = orchestrator.caches();
    let app = http::get_app(ec2_cache, risp_cache, pricing_cache, metrics);

    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let metrics_bind_address = config.metrics_bind_address.clone();
    let server_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&metrics_bind_address)
            .await
            .with_context(|| format!("failed to bind debug HTTP surface on {metrics_bind_address}"))?;
        tracing::info!(addr = %metrics_bind_address, "debug http surface listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
            .context("debug http server failed")
    });

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_cancel.cancel();
    });

    let orchestrator_result = orchestrator.run(cancel.clone()).await;
    cancel.cancel();

    let server_result = server_handle.await.context("debug http server task panicked")?;

    orchestrator_result.context("orchestrator exited with an error")?;
    server_result?;

    Ok(())
}
