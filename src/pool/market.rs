//! Market Data Calculator
//!
//! Derives volatility and price/volume momentum from a bounded rolling
//! history of samples for a single pool. One calculator per monitored pool;
//! it is owned by that pool's poll loop and never shared.
//!
//! Volatility = annualized (×365) standard deviation of log price returns,
//! with price = (sqrtPriceX96 / 2^96)^2.
//!
//! Created: 2026-02-03

use crate::types::{u256_to_f64, MarketData, PoolState};
use alloy::primitives::U256;
use std::collections::VecDeque;

/// Price samples kept per pool
pub const PRICE_HISTORY_CAP: usize = 100;

/// Volume samples kept per pool
pub const VOLUME_HISTORY_CAP: usize = 24;

const Q96: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// Market facts the ledger read surface does not expose. Used as-is for
/// every sample until a real volume/spread source is wired in.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketAssumptions {
    pub volume_24h: U256,
    pub spread: f64,
    pub trades: u64,
}

impl Default for MarketAssumptions {
    fn default() -> Self {
        Self {
            // 1 ETH
            volume_24h: U256::from(1_000_000_000_000_000_000u64),
            spread: 0.001,
            trades: 100,
        }
    }
}

#[derive(Debug)]
pub struct MarketDataCalculator {
    assumptions: MarketAssumptions,
    prices: VecDeque<f64>,
    volumes: VecDeque<U256>,
}

impl MarketDataCalculator {
    pub fn new(assumptions: MarketAssumptions) -> Self {
        Self {
            assumptions,
            prices: VecDeque::with_capacity(PRICE_HISTORY_CAP),
            volumes: VecDeque::with_capacity(VOLUME_HISTORY_CAP),
        }
    }

    /// Record a new sample from `pool_state` and derive market data.
    pub fn update(&mut self, pool_state: &PoolState, timestamp_ms: i64) -> MarketData {
        push_bounded(&mut self.prices, sqrt_price_to_price(pool_state.sqrt_price_x96), PRICE_HISTORY_CAP);
        push_bounded(&mut self.volumes, self.assumptions.volume_24h, VOLUME_HISTORY_CAP);

        MarketData {
            pool_id: pool_state.pool_id,
            timestamp_ms,
            volatility: self.volatility(),
            volume_24h: self.assumptions.volume_24h,
            volume_change: self.volume_change(),
            price_change: self.price_change(),
            spread: self.assumptions.spread,
            trades: self.assumptions.trades,
        }
    }

    pub fn price_samples(&self) -> usize {
        self.prices.len()
    }

    pub fn volume_samples(&self) -> usize {
        self.volumes.len()
    }

    fn volatility(&self) -> f64 {
        let returns: Vec<f64> = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .filter(|(prev, cur)| **prev > 0.0 && **cur > 0.0)
            .map(|(prev, cur)| (cur / prev).ln())
            .collect();

        if returns.is_empty() {
            return 0.0;
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        (variance * 365.0).sqrt()
    }

    fn price_change(&self) -> f64 {
        let mut recent = self.prices.iter().rev();
        match (recent.next(), recent.next()) {
            (Some(cur), Some(prev)) => percent_change(*prev, *cur),
            _ => 0.0,
        }
    }

    fn volume_change(&self) -> f64 {
        let mut recent = self.volumes.iter().rev();
        match (recent.next(), recent.next()) {
            (Some(cur), Some(prev)) => percent_change(u256_to_f64(*prev), u256_to_f64(*cur)),
            _ => 0.0,
        }
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, sample: T, cap: usize) {
    history.push_back(sample);
    while history.len() > cap {
        history.pop_front();
    }
}

fn percent_change(prev: f64, cur: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (cur - prev) / prev * 100.0
    }
}

/// token1/token0 price from a Q64.96 square-root price
pub fn sqrt_price_to_price(sqrt_price_x96: U256) -> f64 {
    let sqrt_price = u256_to_f64(sqrt_price_x96) / Q96;
    sqrt_price * sqrt_price
}
