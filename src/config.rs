//! Configuration management
//! Load settings from a .env file (dotenv) and the process environment.
//!
//! Required: RPC_URL, CHAIN_ID, OPERATOR_PRIVATE_KEY, POOL_MANAGER_ADDRESS,
//! HOOK_ADDRESS, POOLS. Everything else has a default.
//!
//! POOLS format: `currency0:currency1:fee:tickSpacing[,...]` (hooks = HOOK_ADDRESS)
//!
//! Created: 2026-02-03

use crate::contracts::PoolKey;
use crate::error::OperatorError;
use crate::pool::MarketAssumptions;
use crate::strategy::{BidConfig, BidStrategy, OptimizationConfig};
use crate::types::{eth_to_wei, make_pool_key, FEE_DENOMINATOR};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::str::FromStr;

/// Weights must sum to 1.0 within this tolerance
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Clone)]
pub struct OperatorConfig {
    // Network
    pub rpc_url: String,
    pub chain_id: u64,

    // Wallet
    pub private_key: String,
    pub operator_address: Address,

    // Contracts
    pub pool_manager: Address,
    pub hook: Address,
    pub service_manager: Option<Address>,

    // Pools to manage
    pub pools: Vec<PoolKey>,

    // Engines
    pub optimization: OptimizationConfig,
    pub bid: BidConfig,
    pub bid_strategy: BidStrategy,
    pub market: MarketAssumptions,

    // Cadence
    pub poll_interval_ms: u64,
    pub health_check_interval_ms: u64,
    pub update_frequency_blocks: u64,
    pub withdraw_check_interval_ms: u64,
    pub proof_interval_ms: u64,

    // Performance task attested by periodic proofs
    pub performance_task_id: U256,

    // Gas / funds
    pub gas_price_multiplier: f64,
    pub min_stake_wei: U256,
    pub low_balance_eth: f64,
}

impl fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("chain_id", &self.chain_id)
            .field("operator_address", &self.operator_address)
            .field("pool_manager", &self.pool_manager)
            .field("hook", &self.hook)
            .field("service_manager", &self.service_manager)
            .field("pools", &self.pools.len())
            .field("optimization", &self.optimization)
            .field("bid_strategy", &self.bid_strategy)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("gas_price_multiplier", &self.gas_price_multiplier)
            .finish_non_exhaustive()
    }
}

/// Load config from the process environment (after reading `.env` if present)
pub fn load_config() -> Result<OperatorConfig> {
    dotenv::dotenv().ok();
    OperatorConfig::from_lookup(|key| std::env::var(key).ok())
}

/// Load config from a specific env file (e.g. `.env.sepolia`)
pub fn load_config_from_file(path: &str) -> Result<OperatorConfig> {
    dotenv::from_filename(path).with_context(|| format!("Failed to read env file: {}", path))?;
    OperatorConfig::from_lookup(|key| std::env::var(key).ok())
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| anyhow!("{} not set", key))
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: '{}' ({})", key, raw, e)),
        None => Ok(default),
    }
}

fn address<F>(lookup: &F, key: &str) -> Result<Address>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = required(lookup, key)?;
    Address::from_str(raw.trim()).with_context(|| format!("Invalid address for {}: {}", key, raw))
}

/// Parse `currency0:currency1:fee:tickSpacing` entries
pub fn parse_pools(raw: &str, hook: Address) -> Result<Vec<PoolKey>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() != 4 {
                return Err(anyhow!(
                    "Invalid pool format: {} (expected currency0:currency1:fee:tickSpacing)",
                    entry
                ));
            }
            let currency0 = Address::from_str(parts[0])
                .with_context(|| format!("Invalid currency0 in pool {}", entry))?;
            let currency1 = Address::from_str(parts[1])
                .with_context(|| format!("Invalid currency1 in pool {}", entry))?;
            let fee: u32 = parts[2]
                .parse()
                .with_context(|| format!("Invalid fee in pool {}", entry))?;
            let tick_spacing: i32 = parts[3]
                .parse()
                .with_context(|| format!("Invalid tickSpacing in pool {}", entry))?;
            make_pool_key(currency0, currency1, fee, tick_spacing, hook).map_err(anyhow::Error::from)
        })
        .collect()
}

impl OperatorConfig {
    /// Build config from any key → value lookup (env in production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let private_key = required(&lookup, "OPERATOR_PRIVATE_KEY")?;
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid OPERATOR_PRIVATE_KEY: {}", e))?;
        let operator_address = signer.address();

        let hook = address(&lookup, "HOOK_ADDRESS")?;
        let service_manager = match lookup("SERVICE_MANAGER_ADDRESS") {
            Some(raw) if !raw.trim().is_empty() => Some(
                Address::from_str(raw.trim())
                    .with_context(|| format!("Invalid SERVICE_MANAGER_ADDRESS: {}", raw))?,
            ),
            _ => None,
        };

        let pools = parse_pools(&required(&lookup, "POOLS")?, hook)?;

        let optimization = OptimizationConfig {
            volatility_weight: parsed_or(&lookup, "VOLATILITY_WEIGHT", 0.4)?,
            volume_weight: parsed_or(&lookup, "VOLUME_WEIGHT", 0.3)?,
            spread_weight: parsed_or(&lookup, "SPREAD_WEIGHT", 0.3)?,
            min_fee: parsed_or(&lookup, "MIN_FEE", 100)?,
            max_fee: parsed_or(&lookup, "MAX_FEE", 10_000)?,
        };

        let bid = BidConfig {
            operator_address,
            min_profit_margin: parsed_or(&lookup, "MIN_PROFIT_MARGIN", 0.001)?,
            max_bid_amount_wei: eth_to_wei(parsed_or(&lookup, "MAX_BID_AMOUNT_ETH", 1.0)?),
            risk_tolerance: parsed_or(&lookup, "RISK_TOLERANCE", 0.5)?,
            min_deposit_blocks: parsed_or(&lookup, "MIN_DEPOSIT_BLOCKS", 100)?,
            activation_delay: parsed_or(&lookup, "ACTIVATION_DELAY_BLOCKS", 5)?,
        };

        let bid_strategy = parsed_or(&lookup, "BID_STRATEGY", BidStrategy::Adaptive)?;

        let market = MarketAssumptions {
            volume_24h: eth_to_wei(parsed_or(&lookup, "ASSUMED_VOLUME_24H_ETH", 1.0)?),
            spread: parsed_or(&lookup, "ASSUMED_SPREAD", 0.001)?,
            trades: parsed_or(&lookup, "ASSUMED_TRADES", 100)?,
        };

        Ok(Self {
            rpc_url: required(&lookup, "RPC_URL")?,
            chain_id: required(&lookup, "CHAIN_ID")?
                .trim()
                .parse()
                .context("Invalid CHAIN_ID")?,
            private_key,
            operator_address,
            pool_manager: address(&lookup, "POOL_MANAGER_ADDRESS")?,
            hook,
            service_manager,
            pools,
            optimization,
            bid,
            bid_strategy,
            market,
            poll_interval_ms: parsed_or(&lookup, "POOL_REFRESH_INTERVAL_MS", 12_000)?,
            health_check_interval_ms: parsed_or(&lookup, "HEALTH_CHECK_INTERVAL_MS", 60_000)?,
            update_frequency_blocks: parsed_or(&lookup, "UPDATE_FREQUENCY_BLOCKS", 10)?,
            withdraw_check_interval_ms: parsed_or(&lookup, "WITHDRAW_CHECK_INTERVAL_MS", 60_000)?,
            proof_interval_ms: parsed_or(&lookup, "PROOF_INTERVAL_MS", 3_600_000)?,
            performance_task_id: parsed_or(&lookup, "PERFORMANCE_TASK_ID", U256::ZERO)?,
            gas_price_multiplier: parsed_or(&lookup, "GAS_PRICE_MULTIPLIER", 1.2)?,
            min_stake_wei: eth_to_wei(parsed_or(&lookup, "MIN_STAKE_ETH", 1.0)?),
            low_balance_eth: parsed_or(&lookup, "LOW_BALANCE_ETH", 0.1)?,
        })
    }

    /// Reject configurations the operator must not start with.
    pub fn validate(&self) -> Result<(), OperatorError> {
        let opt = &self.optimization;
        let weight_sum = opt.volatility_weight + opt.volume_weight + opt.spread_weight;
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(OperatorError::Config(format!(
                "Optimization weights must sum to 1.0, got {}",
                weight_sum
            )));
        }
        if opt.min_fee > opt.max_fee {
            return Err(OperatorError::Config(format!(
                "MIN_FEE ({}) exceeds MAX_FEE ({})",
                opt.min_fee, opt.max_fee
            )));
        }
        if u64::from(opt.max_fee) > FEE_DENOMINATOR {
            return Err(OperatorError::Config(format!(
                "MAX_FEE ({}) exceeds {}",
                opt.max_fee, FEE_DENOMINATOR
            )));
        }
        if self.bid.min_profit_margin <= 0.0 || self.bid.min_profit_margin >= 1.0 {
            return Err(OperatorError::Config(
                "Min profit margin must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.bid.risk_tolerance) {
            return Err(OperatorError::Config(
                "Risk tolerance must be between 0 and 1".to_string(),
            ));
        }
        if self.pools.is_empty() {
            return Err(OperatorError::Config("POOLS is empty".to_string()));
        }
        if self.gas_price_multiplier < 1.0 {
            return Err(OperatorError::Config(format!(
                "GAS_PRICE_MULTIPLIER must be >= 1.0, got {}",
                self.gas_price_multiplier
            )));
        }
        if self.proof_interval_ms == 0 {
            return Err(OperatorError::Config("PROOF_INTERVAL_MS must be > 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(OperatorError::Config(
                "POOL_REFRESH_INTERVAL_MS must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
