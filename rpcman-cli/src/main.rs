//! rpcman CLI Tool
//!
//! Command line interface for checking RPC endpoints and running the diagnostics server

mod call;
mod server;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rpcman_core::config::loader::{get_config_path, load_config_from_path};
use rpcman_core::{Config, Purpose};
use rpcman_loadbalance::RpcEndpointManager;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rpcman-cli")]
#[command(about = "A CLI tool for managing JSON-RPC endpoints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file (defaults to CONFIG_PATH or config.toml)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
    },
    /// Probe every endpoint once and print the results
    HealthCheck {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Send one JSON-RPC call through the endpoint manager
    Call {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// JSON-RPC method name
        method: String,
        /// JSON array of parameters
        #[arg(default_value = "[]")]
        params: String,
        /// Use the write client (longer timeout)
        #[arg(long)]
        write: bool,
    },
    /// Run the endpoint manager with a diagnostics HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            let path = config.unwrap_or_else(get_config_path);
            println!("Validating configuration file: {}", path);
            match load_config_from_path(&path) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    print_config_summary(&cfg);
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output } => {
            println!("Generating configuration file: {}", output);
            std::fs::write(&output, EXAMPLE_CONFIG)
                .with_context(|| format!("Failed to write {}", output))?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::HealthCheck { config } => {
            let manager = create_manager(config)?;
            println!("Checking {} endpoints...", manager.registry().len());

            let reports = manager.check_now().await;
            for report in &reports {
                if report.success {
                    println!(
                        "🟢 {} block={} latency={}ms",
                        report.endpoint_id,
                        report.block_number.unwrap_or_default(),
                        report.latency_ms
                    );
                } else {
                    println!(
                        "🔴 {} {}",
                        report.endpoint_id,
                        report.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }

            if reports.iter().all(|r| !r.success) {
                eprintln!("❌ No endpoint is healthy");
                std::process::exit(1);
            }
            println!("✅ Health check completed");
        }
        Commands::Call {
            config,
            method,
            params,
            write,
        } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("params must be valid JSON")?;
            let manager = create_manager(config)?;
            manager.check_now().await;

            let purpose = if write { Purpose::Write } else { Purpose::Read };
            let attempts = manager.settings().max_call_attempts;
            let outcome =
                call::call_with_failover(&manager, &method, params, purpose, attempts).await?;

            println!(
                "✅ {} via {} in {}ms ({} attempt(s))",
                method, outcome.endpoint_id, outcome.latency_ms, outcome.attempts
            );
            println!("{}", serde_json::to_string_pretty(&outcome.result)?);
        }
        Commands::Serve { config, bind } => {
            let manager = Arc::new(create_manager(config)?);
            manager.start().await;

            let app = server::create_app(server::AppState {
                manager: manager.clone(),
            });
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;
            info!("Diagnostics server listening on {}", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            manager.stop();
            info!("rpcman stopped at {}", chrono::Utc::now().to_rfc3339());
        }
    }

    Ok(())
}

fn create_manager(config: Option<String>) -> Result<RpcEndpointManager> {
    let path = config.unwrap_or_else(get_config_path);
    let cfg = load_config_from_path(&path)?;
    info!("Configuration loaded from: {}", path);
    Ok(RpcEndpointManager::with_http(cfg)?)
}

fn print_config_summary(config: &Config) {
    println!(
        "  - chain: {} (id {}, {})",
        config.chain.name, config.chain.chain_id, config.chain.native_currency.symbol
    );
    println!(
        "  - {} endpoints configured ({} enabled)",
        config.endpoints.len(),
        config.enabled_endpoints().len()
    );
    for endpoint in &config.endpoints {
        println!(
            "    {} {} priority={} weight={}{}",
            if endpoint.enabled { "•" } else { "◦" },
            endpoint.name,
            endpoint.priority,
            endpoint.weight,
            endpoint
                .ws_url
                .as_deref()
                .map(|ws| format!(" ws={}", ws))
                .unwrap_or_default()
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

const EXAMPLE_CONFIG: &str = r#"# rpcman Configuration File
# Endpoints may also come from RPC_URLS (comma separated) when none are listed here

[chain]
chain_id = 1
name = "Ethereum"

[chain.native_currency]
name = "Ether"
symbol = "ETH"
decimals = 18

[settings]
health_check_interval_seconds = 15
health_check_timeout_seconds = 3
read_timeout_seconds = 10
write_timeout_seconds = 30
pool_sweep_interval_seconds = 300
pool_idle_timeout_seconds = 600
unhealthy_threshold = 3
failure_latency_ms = 9999
metrics_window = 1000
failover_hold_seconds = 60
max_call_attempts = 3

[[endpoints]]
name = "primary"
url = "https://eth-mainnet.example.com/v2/your-api-key"
ws_url = "wss://eth-mainnet.example.com/v2/your-api-key"
priority = 1
weight = 100.0

[[endpoints]]
name = "secondary"
url = "https://rpc.example.org"
priority = 2
weight = 80.0

[endpoints.headers]
"X-Api-Key" = "your-api-key"

[[endpoints]]
name = "public"
url = "https://public-rpc.example.net"
priority = 3
weight = 50.0
enabled = true
"#;
