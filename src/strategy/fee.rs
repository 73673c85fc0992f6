//! Fee Optimization Engine
//!
//! Pure scoring functions that turn market data into a recommended swap fee.
//! Three component fees are computed independently and blended by weight:
//!
//! - Volatility: higher volatility → higher fee (LP impermanent-loss cover)
//! - Volume:     higher volume → lower fee, nudged by volume momentum
//! - Spread:     tighter spread → higher fee
//!
//! Named strategies reuse the same algorithm with different weight presets;
//! `select_best_strategy` picks the highest expected revenue.
//!
//! Fees are integers in hundredths of basis points (1_000_000 = 100%).
//!
//! Created: 2026-02-03

use crate::error::OperatorError;
use crate::types::{
    u256_to_f64, wei_to_eth, MarketData, OptimalFee, PoolState, StrategyResult, FEE_DENOMINATOR,
};
use alloy::primitives::{I256, U256};

/// Volatility at which the volatility fee saturates (200% annualized)
const VOLATILITY_CAP: f64 = 2.0;

/// 24h volume (ETH) at which the volume fee bottoms out
const VOLUME_CAP_ETH: f64 = 1000.0;

/// Spread at which the spread fee bottoms out (1%)
const SPREAD_CAP: f64 = 0.01;

/// Constant price elasticity of demand for the volume estimate
const DEMAND_ELASTICITY: f64 = 2.0;

/// Fee changes smaller than this fraction are not worth a transaction
const MIN_FEE_CHANGE: f64 = 0.05;

/// Gas used by a setSwapFee call
const SET_FEE_GAS: u64 = 40_000;

/// Market data older than this lowers confidence
const STALE_DATA_MS: i64 = 60_000;

const CONFIDENCE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationConfig {
    pub volatility_weight: f64,
    pub volume_weight: f64,
    pub spread_weight: f64,
    pub min_fee: u32,
    pub max_fee: u32,
}

impl OptimizationConfig {
    fn with_weights(self, volatility: f64, volume: f64, spread: f64) -> Self {
        Self {
            volatility_weight: volatility,
            volume_weight: volume,
            spread_weight: spread,
            ..self
        }
    }

    fn fee_range(&self) -> f64 {
        self.max_fee as f64 - self.min_fee as f64
    }
}

/// Everything a fee strategy needs. `now_ms` is the clock used for the
/// staleness check, passed in so scoring stays deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FeeOptimizationInput<'a> {
    pub pool_state: &'a PoolState,
    pub market_data: &'a MarketData,
    pub config: OptimizationConfig,
    pub now_ms: i64,
}

impl<'a> FeeOptimizationInput<'a> {
    fn with_config(self, config: OptimizationConfig) -> Self {
        Self { config, ..self }
    }
}

// ── Component fees ───────────────────────────────────────────────────

pub fn volatility_fee(volatility: f64, config: &OptimizationConfig) -> f64 {
    let normalized = (volatility / VOLATILITY_CAP).min(1.0);
    config.min_fee as f64 + normalized * config.fee_range()
}

pub fn volume_fee(volume_24h: U256, volume_change: f64, config: &OptimizationConfig) -> f64 {
    let score = (wei_to_eth(volume_24h) / VOLUME_CAP_ETH).min(1.0);
    // Growing volume: cut fees to keep momentum; shrinking: charge more
    let momentum = if volume_change > 0.0 { 0.9 } else { 1.1 };
    config.min_fee as f64 + (1.0 - score) * config.fee_range() * momentum
}

pub fn spread_fee(spread: f64, config: &OptimizationConfig) -> f64 {
    let normalized = (spread / SPREAD_CAP).min(1.0);
    config.min_fee as f64 + (1.0 - normalized) * config.fee_range()
}

/// Weighted blend of the component fees, clamped to `[min_fee, max_fee]`
pub fn weighted_fee(
    volatility_fee: f64,
    volume_fee: f64,
    spread_fee: f64,
    config: &OptimizationConfig,
) -> f64 {
    let weighted = volatility_fee * config.volatility_weight
        + volume_fee * config.volume_weight
        + spread_fee * config.spread_weight;
    weighted.max(config.min_fee as f64).min(config.max_fee as f64)
}

// ── Outcome estimates ────────────────────────────────────────────────

/// Constant-elasticity demand: volume scales with (proposed / current)^-2
pub fn estimate_volume(current_volume: U256, current_fee: u32, proposed_fee: u32) -> U256 {
    let fee_ratio = proposed_fee as f64 / current_fee.max(1) as f64;
    let multiplier = fee_ratio.powf(-DEMAND_ELASTICITY);
    // f64 → u128 saturates; infinity (proposed fee 0) becomes u128::MAX
    let scaled = (multiplier * 1000.0).floor() as u128;
    current_volume.saturating_mul(U256::from(scaled)) / U256::from(1000u64)
}

pub fn expected_revenue(volume: U256, fee: u32) -> U256 {
    volume.saturating_mul(U256::from(fee)) / U256::from(FEE_DENOMINATOR)
}

/// Data-quality confidence in [0.1, 1.0]
pub fn confidence(market_data: &MarketData, pool_state: &PoolState, now_ms: i64) -> f64 {
    let mut confidence = 1.0;

    if market_data.trades < 10 {
        confidence *= 0.5;
    }

    let liquidity_eth = u256_to_f64(U256::from(pool_state.liquidity)) / 1e18;
    if liquidity_eth < 10.0 {
        confidence *= 0.7;
    }

    if now_ms - market_data.timestamp_ms > STALE_DATA_MS {
        confidence *= 0.8;
    }

    f64::max(CONFIDENCE_FLOOR, f64::min(1.0, confidence))
}

// ── Optimization ─────────────────────────────────────────────────────

/// Balanced optimization using the weights in `input.config`
pub fn calculate_optimal_fee(input: &FeeOptimizationInput<'_>) -> Result<OptimalFee, OperatorError> {
    let FeeOptimizationInput {
        pool_state,
        market_data,
        config,
        now_ms,
    } = *input;

    if pool_state.liquidity == 0 {
        return Err(OperatorError::Validation(
            "Cannot optimize fee for pool with zero liquidity".to_string(),
        ));
    }

    let vol_fee = volatility_fee(market_data.volatility, &config);
    let volm_fee = volume_fee(market_data.volume_24h, market_data.volume_change, &config);
    let spr_fee = spread_fee(market_data.spread, &config);

    let fee = weighted_fee(vol_fee, volm_fee, spr_fee, &config).round() as u32;

    let expected_volume = estimate_volume(market_data.volume_24h, pool_state.swap_fee, fee);
    let revenue = expected_revenue(expected_volume, fee);
    let confidence = confidence(market_data, pool_state, now_ms);

    let reasoning = [
        format!(
            "Volatility: {:.2}% → {:.0} fee (weight: {})",
            market_data.volatility * 100.0,
            vol_fee,
            config.volatility_weight
        ),
        format!(
            "Volume: {} → {:.0} fee (weight: {})",
            market_data.volume_24h, volm_fee, config.volume_weight
        ),
        format!(
            "Spread: {:.2}% → {:.0} fee (weight: {})",
            market_data.spread * 100.0,
            spr_fee,
            config.spread_weight
        ),
        format!("Weighted average: {}", fee),
        format!("Expected volume: {}", expected_volume),
        format!("Expected revenue: {}", revenue),
        format!("Confidence: {:.1}%", confidence * 100.0),
    ]
    .join(" | ");

    Ok(OptimalFee {
        fee,
        confidence,
        expected_volume,
        expected_revenue: revenue,
        reasoning,
    })
}

/// Named fee strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeStrategy {
    /// Configured weights
    Balanced,
    /// Emphasize volatility (0.6 / 0.2 / 0.2)
    Aggressive,
    /// Emphasize volume attraction (0.2 / 0.6 / 0.2)
    Conservative,
    /// Aggressive under high volatility, conservative under strong volume growth
    Adaptive,
}

impl FeeStrategy {
    pub const ALL: [FeeStrategy; 4] = [
        FeeStrategy::Balanced,
        FeeStrategy::Aggressive,
        FeeStrategy::Conservative,
        FeeStrategy::Adaptive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeeStrategy::Balanced => "balanced",
            FeeStrategy::Aggressive => "aggressive",
            FeeStrategy::Conservative => "conservative",
            FeeStrategy::Adaptive => "adaptive",
        }
    }

    pub fn apply(&self, input: &FeeOptimizationInput<'_>) -> Result<OptimalFee, OperatorError> {
        match self {
            FeeStrategy::Balanced => calculate_optimal_fee(input),
            FeeStrategy::Aggressive => {
                calculate_optimal_fee(&input.with_config(input.config.with_weights(0.6, 0.2, 0.2)))
            }
            FeeStrategy::Conservative => {
                calculate_optimal_fee(&input.with_config(input.config.with_weights(0.2, 0.6, 0.2)))
            }
            FeeStrategy::Adaptive => {
                if input.market_data.volatility > 0.5 {
                    FeeStrategy::Aggressive.apply(input)
                } else if input.market_data.volume_change > 20.0 {
                    FeeStrategy::Conservative.apply(input)
                } else {
                    FeeStrategy::Balanced.apply(input)
                }
            }
        }
    }
}

/// Run every named strategy, in declaration order
pub fn run_all_strategies(input: &FeeOptimizationInput<'_>) -> Vec<StrategyResult> {
    FeeStrategy::ALL
        .iter()
        .map(|strategy| StrategyResult {
            strategy_name: strategy.name(),
            outcome: strategy.apply(input),
        })
        .collect()
}

/// Pick the successful strategy with the highest expected revenue.
/// Ties keep the earliest strategy in the batch.
pub fn select_best_strategy(results: &[StrategyResult]) -> Result<OptimalFee, OperatorError> {
    let mut best: Option<(&'static str, &OptimalFee)> = None;

    for result in results {
        if let Ok(fee) = &result.outcome {
            match best {
                Some((_, current)) if fee.expected_revenue <= current.expected_revenue => {}
                _ => best = Some((result.strategy_name, fee)),
            }
        }
    }

    match best {
        Some((name, fee)) => Ok(OptimalFee {
            reasoning: format!("[{}] {}", name, fee.reasoning),
            ..fee.clone()
        }),
        None => Err(OperatorError::AllStrategiesFailed),
    }
}

/// Is the fee change worth a setSwapFee transaction?
///
/// Requires a change of at least 5% and an expected revenue gain of more
/// than twice the gas cost of the update.
pub fn should_update_fee(
    current_fee: u32,
    optimal_fee: u32,
    gas_price: u128,
    expected_revenue_delta: I256,
) -> bool {
    if current_fee == optimal_fee {
        return false;
    }
    if current_fee > 0 {
        let change = (optimal_fee as f64 - current_fee as f64).abs() / current_fee as f64;
        if change < MIN_FEE_CHANGE {
            return false;
        }
    }

    let gas_cost = U256::from(gas_price).saturating_mul(U256::from(SET_FEE_GAS));
    let threshold = I256::try_from(gas_cost.saturating_mul(U256::from(2u8))).unwrap_or(I256::MAX);
    expected_revenue_delta > threshold
}

/// Blocks to wait between fee updates. Volatile markets or large volume
/// swings move toward `min_blocks`, calm markets toward `max_blocks`.
pub fn fee_update_interval_blocks(
    volatility: f64,
    volume_change: f64,
    min_blocks: u64,
    max_blocks: u64,
) -> u64 {
    let volatility_factor = (1.0 - volatility).max(0.0);
    let volume_factor = (1.0 - volume_change.abs() / 100.0).max(0.0);
    let combined = (volatility_factor + volume_factor) / 2.0;

    let span = max_blocks.saturating_sub(min_blocks) as f64;
    let blocks = (min_blocks as f64 + span * combined).floor() as u64;
    blocks.clamp(min_blocks, max_blocks.max(min_blocks))
}
