//! # LLM Policy Gateway
//!
//! OpenAI-compatible gateway that enforces rate limits, content guardrails
//! and cost budgets in front of a single upstream model server.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults and environment overrides
//! llm-policy-gateway
//!
//! # Start with a config file
//! llm-policy-gateway --config /path/to/gateway.yaml
//!
//! # Validate a config file and exit
//! llm-policy-gateway --config /path/to/gateway.yaml --check
//! ```

use anyhow::Context;
use clap::Parser;
use gateway_config::load_config;
use gateway_providers::{OpenAiCompatibleProvider, OpenAiConfig};
use gateway_server::{AppState, Server};
use gateway_telemetry::{init_tracing, shutdown_tracing, TracingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "llm-policy-gateway", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.check {
        println!("Configuration OK");
        return Ok(());
    }

    let tracer = init_tracing(&TracingConfig::from(&config.telemetry))
        .context("Failed to initialize tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.server.bind_address(),
        upstream = %config.upstream.base_url,
        models = config.models.len(),
        auth = config.auth.master_key.is_some(),
        "Starting LLM policy gateway"
    );

    let result = run(config).await;
    if let Err(e) = &result {
        error!(error = %e, "Gateway failed");
    }

    shutdown_tracing(tracer);
    result
}

async fn run(config: gateway_config::GatewayConfig) -> anyhow::Result<()> {
    let provider = OpenAiCompatibleProvider::new(OpenAiConfig::from(&config.upstream))
        .context("Failed to create upstream client")?;
    let state = AppState::new(config, Arc::new(provider)).context("Failed to build pipeline")?;

    Server::new(state).run().await?;
    info!("Gateway stopped");
    Ok(())
}
