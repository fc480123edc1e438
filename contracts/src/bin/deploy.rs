//! Deployment script
//!
//! Deploys `MyToken` and an `EventContract` bound to it, signing with the
//! key from `SEPOLIA_PRIVATE_KEY`, and prints both addresses.
//!
//! # Usage
//!
//! ```bash
//! echo "SEPOLIA_PRIVATE_KEY=0x..." > .env
//! cargo run --bin deploy
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokengate_contracts::config::LOG_LEVEL_VAR;
use tokengate_contracts::{DeployError, Ledger, NetworkConfig, deploy_contracts};
use tokengate_core::environment::SystemClock;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = match NetworkConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Invalid configuration");
            return ExitCode::FAILURE;
        },
    };
    tracing::info!(
        network = %config.network,
        solidity = %config.solidity_version,
        sourcify = config.sourcify_enabled,
        verification = config.verification_enabled(),
        rpc_configured = config.rpc_url.is_some(),
        "Configuration loaded"
    );
    if let Ok(json) = serde_json::to_string(&config) {
        tracing::debug!(config = %json, "Resolved configuration");
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "Deployment failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: &NetworkConfig) -> Result<(), DeployError> {
    let deployer = config.deployer();
    tracing::info!(%deployer, "Deploying contracts");

    let ledger = Ledger::new(Arc::new(SystemClock));
    let deployment = deploy_contracts(&ledger, deployer).await?;

    println!("MyToken deployed to: {}", deployment.token.address());
    println!(
        "EventContract deployed to: {}",
        deployment.event_contract.address()
    );

    ledger.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}

fn init_tracing() {
    let fallback = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
