//! Auction Operator
//!
//! Main entry point. Loads config, connects to the node, optionally
//! registers with the service manager, then runs the per-pool fee, bid and
//! withdrawal loops plus a health check until SIGINT/SIGTERM.
//!
//! Usage:
//!   auction-operator
//!   auction-operator --env-file .env.sepolia --log-level debug
//!   LOG_FORMAT=json auction-operator
//!
//! Created: 2026-02-03

use alloy::network::EthereumWallet;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use auction_operator::config::{load_config, load_config_from_file};
use auction_operator::executor::{HookLedger, TransactionExecutor};
use auction_operator::logging::setup_logging;
use auction_operator::operator::Operator;
use auction_operator::pool::{HookStateReader, PoolMonitor};
use auction_operator::registration::{RegistrationService, ServiceManagerClient};
use auction_operator::types::{pool_id, wei_to_eth};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pool-manager operator for the rent-auction hook
#[derive(Parser)]
#[command(name = "auction-operator")]
struct Args {
    /// Env file to load instead of `.env`
    #[arg(long)]
    env_file: Option<String>,

    /// Log level or filter directives
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Log format: compact or json
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, args.log_format.eq_ignore_ascii_case("json"));

    info!("Auction operator starting...");

    let config = match &args.env_file {
        Some(path) => load_config_from_file(path),
        None => load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!("Configuration loaded (chain_id: {})", config.chain_id);
    info!("Operator: {}", config.operator_address);
    info!("Hook: {} | Pool manager: {}", config.hook, config.pool_manager);
    info!("Pools: {} | Bid strategy: {}", config.pools.len(), config.bid_strategy);
    for key in &config.pools {
        info!("  Pool {} ({} / {})", pool_id(key), key.currency0, key.currency1);
    }

    // Provider with signing wallet (http(s):// or ws(s)://)
    let signer: PrivateKeySigner = config
        .private_key
        .trim()
        .parse()
        .context("Invalid OPERATOR_PRIVATE_KEY")?;
    let wallet = EthereumWallet::from(signer);
    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect(&config.rpc_url)
        .await
        .with_context(|| format!("Failed to connect to {}", config.rpc_url))?;
    let provider = Arc::new(provider);

    let block = match provider.get_block_number().await {
        Ok(block) => block,
        Err(e) => {
            error!("Node connectivity check failed: {}", e);
            std::process::exit(1);
        }
    };
    info!("Connected! Current block: {}", block);

    match provider.get_balance(config.operator_address).await {
        Ok(balance) => info!("Wallet balance: {:.4} ETH", wei_to_eth(balance)),
        Err(e) => warn!("Could not read wallet balance: {}", e),
    }

    // Monitor
    let reader = HookStateReader::new(provider.clone(), config.pool_manager, config.hook, &config.pools);
    let monitor = Arc::new(PoolMonitor::new(
        Arc::new(reader),
        config.market.clone(),
        Duration::from_millis(config.poll_interval_ms),
    ));

    // Executor
    let ledger = HookLedger::new(
        provider.clone(),
        config.pool_manager,
        config.hook,
        config.operator_address,
    );
    let executor = Arc::new(TransactionExecutor::new(
        Arc::new(ledger),
        config.gas_price_multiplier,
        config.bid.min_deposit_blocks,
    ));

    // Registration (optional)
    let registration: Option<Arc<dyn RegistrationService>> = match config.service_manager {
        Some(address) => {
            let client = Arc::new(ServiceManagerClient::new(provider.clone(), address, config.min_stake_wei));
            match client.operator_status(config.operator_address).await {
                Ok(status) if status.is_registered => info!(
                    "Operator registered (stake {} ETH, score {})",
                    wei_to_eth(status.staked_amount),
                    status.performance_score
                ),
                Ok(_) => {
                    info!("Operator not registered, registering...");
                    if let Err(e) = client.register_operator(None).await {
                        error!("Registration failed: {}", e);
                    }
                }
                Err(e) => warn!("Could not read registration status: {}", e),
            }
            Some(client)
        }
        None => {
            info!("No SERVICE_MANAGER_ADDRESS set, skipping registration");
            None
        }
    };

    let operator = Arc::new(Operator::new(config, monitor, executor, registration));
    let mut tasks = operator.clone().spawn();

    // Run until SIGINT / SIGTERM
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    let handle = signals.handle();
    tokio::select! {
        Some(sig) = signals.next() => {
            info!("Received signal {}, shutting down...", sig);
        }
        Some(res) = tasks.join_next() => {
            if let Err(e) = res {
                error!("Operator task exited unexpectedly: {}", e);
            }
        }
    }
    handle.close();

    tasks.shutdown().await;
    let metrics = operator.tracker().metrics();
    info!(
        "Operator stopped: {} fee updates, revenue {}, gas {}, uptime {}s",
        metrics.fee_optimizations, metrics.revenue_generated, metrics.gas_used, metrics.uptime_secs
    );
    Ok(())
}
