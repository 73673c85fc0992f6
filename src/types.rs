// Core data structures shared by the monitor, the engines and the executor

use crate::contracts::PoolKey;
use crate::error::OperatorError;
use alloy::primitives::aliases::{I24, U24};
use alloy::primitives::{keccak256, Address, TxHash, B256, I256, U256};
use alloy::sol_types::SolValue;
use std::fmt;

/// Ledger-native pool identifier (`keccak256(abi.encode(PoolKey))`)
pub type PoolId = B256;

/// Fee unit denominator: 1_000_000 = 100%
pub const FEE_DENOMINATOR: u64 = 1_000_000;

/// 1 ETH in wei
pub const WEI_PER_ETH: f64 = 1e18;

/// Build a pool key. Fails if `fee` does not fit uint24 or `tick_spacing` does not fit int24.
pub fn make_pool_key(
    currency0: Address,
    currency1: Address,
    fee: u32,
    tick_spacing: i32,
    hooks: Address,
) -> Result<PoolKey, OperatorError> {
    if fee > 0xFF_FFFF {
        return Err(OperatorError::Config(format!("pool fee {} exceeds uint24", fee)));
    }
    let tick_spacing = I24::try_from(tick_spacing).map_err(|_| {
        OperatorError::Config(format!("tick spacing {} exceeds int24", tick_spacing))
    })?;
    Ok(PoolKey {
        currency0,
        currency1,
        // Uint<24, 1> has no From<u32>; build from limbs after the range check
        fee: U24::from_limbs([fee as u64]),
        tickSpacing: tick_spacing,
        hooks,
    })
}

/// Derive the pool identifier the pool manager uses for `key`.
pub fn pool_id(key: &PoolKey) -> PoolId {
    keccak256(key.abi_encode())
}

/// Pool facts, refreshed wholesale on every poll
#[derive(Debug, Clone, PartialEq)]
pub struct PoolState {
    pub pool_id: PoolId,
    pub token0: Address,
    pub token1: Address,
    pub current_manager: Option<Address>,
    pub rent_per_block: U256,
    /// Swap fee in hundredths of basis points
    pub swap_fee: u32,
    pub liquidity: u128,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    /// Block number the state was read at
    pub last_update_block: u64,
}

/// Rent-auction facts for one pool
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionState {
    pub current_manager: Option<Address>,
    pub current_rent: U256,
    /// Pending challenger; its bid activates at `activation_block`
    pub next_bidder: Option<Address>,
    pub next_rent: U256,
    pub activation_block: u64,
    pub manager_deposit: U256,
}

/// Derived market signals for one pool
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub pool_id: PoolId,
    /// Unix millis when the sample was taken
    pub timestamp_ms: i64,
    /// Annualized volatility (1.0 = 100%)
    pub volatility: f64,
    pub volume_24h: U256,
    /// Percent change vs the previous volume sample
    pub volume_change: f64,
    /// Percent change vs the previous price sample
    pub price_change: f64,
    pub spread: f64,
    pub trades: u64,
}

/// One emitted observation of a pool
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub pool_state: PoolState,
    pub auction_state: AuctionState,
    pub market_data: MarketData,
}

/// Fee recommendation produced by the fee optimization engine
#[derive(Debug, Clone, PartialEq)]
pub struct OptimalFee {
    pub fee: u32,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub expected_volume: U256,
    pub expected_revenue: U256,
    pub reasoning: String,
}

/// Outcome of one named fee strategy in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub strategy_name: &'static str,
    pub outcome: Result<OptimalFee, OperatorError>,
}

/// Go/no-go bid decision
#[derive(Debug, Clone, PartialEq)]
pub struct BidDecision {
    pub should_bid: bool,
    /// Rent per block to bid (wei)
    pub rent_amount: U256,
    /// Expected profit per block (wei); negative when costs exceed revenue
    pub expected_profit: I256,
    /// Profit over the blocks the deposit covers; zero unless accepted
    pub expected_total_profit: I256,
    pub profit_margin: f64,
    /// 0.0 to 1.0
    pub risk_score: f64,
    pub reasoning: String,
}

impl BidDecision {
    /// A decline that carries no amounts, only a reason.
    pub fn decline(reasoning: impl Into<String>) -> Self {
        Self {
            should_bid: false,
            rent_amount: U256::ZERO,
            expected_profit: I256::ZERO,
            expected_total_profit: I256::ZERO,
            profit_margin: 0.0,
            risk_score: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TxStatus::Success => write!(f, "success"),
            TxStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Confirmed transaction result
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub status: TxStatus,
}

/// Pool price slot as returned by the pool manager
#[derive(Debug, Clone, PartialEq)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub protocol_fee: u32,
}

/// Lossless-enough U256 → f64 (sums limbs, no u128 truncation)
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0_f64, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Wei → ETH as f64
pub fn wei_to_eth(wei: U256) -> f64 {
    u256_to_f64(wei) / WEI_PER_ETH
}

/// ETH → wei (negative or NaN inputs map to zero)
pub fn eth_to_wei(eth: f64) -> U256 {
    if !eth.is_finite() || eth <= 0.0 {
        return U256::ZERO;
    }
    U256::from((eth * WEI_PER_ETH) as u128)
}

/// Ledger int24 tick → i32
pub fn tick_to_i32(tick: I24, pool_id: &PoolId) -> Result<i32, OperatorError> {
    i32::try_from(tick)
        .map_err(|_| OperatorError::Validation(format!("tick out of range for pool {}", pool_id)))
}

/// Map the zero address (ledger's "unset") to None.
pub fn non_zero(addr: Address) -> Option<Address> {
    if addr == Address::ZERO {
        None
    } else {
        Some(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_f64() {
        assert_eq!(u256_to_f64(U256::ZERO), 0.0);
        assert_eq!(u256_to_f64(U256::from(12345u64)), 12345.0);
        // 2^96 spans two limbs
        let q96 = U256::from(1u8) << 96;
        assert_eq!(u256_to_f64(q96), 2f64.powi(96));
    }

    #[test]
    fn test_eth_wei_conversion() {
        assert_eq!(eth_to_wei(1.0), U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(eth_to_wei(-3.0), U256::ZERO);
        assert!((wei_to_eth(eth_to_wei(2.5)) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_zero() {
        assert_eq!(non_zero(Address::ZERO), None);
        let a = Address::repeat_byte(0x11);
        assert_eq!(non_zero(a), Some(a));
    }

    #[test]
    fn test_tick_to_i32() {
        let id = B256::repeat_byte(0x42);
        let min_tick = I24::try_from(-887_272i32).unwrap();
        assert_eq!(tick_to_i32(min_tick, &id), Ok(-887_272));
        assert_eq!(tick_to_i32(I24::ZERO, &id), Ok(0));
    }

    #[test]
    fn test_pool_id_is_stable_and_key_sensitive() {
        let t0 = Address::repeat_byte(0x01);
        let t1 = Address::repeat_byte(0x02);
        let hook = Address::repeat_byte(0x0f);
        let key_a = make_pool_key(t0, t1, 3000, 60, hook).unwrap();
        let key_b = make_pool_key(t0, t1, 500, 10, hook).unwrap();

        assert_eq!(pool_id(&key_a), pool_id(&key_a.clone()));
        assert_ne!(pool_id(&key_a), pool_id(&key_b));
    }

    #[test]
    fn test_make_pool_key_bounds() {
        let a = Address::ZERO;
        assert!(make_pool_key(a, a, 0x1_000_000, 60, a).is_err());
        assert!(make_pool_key(a, a, 3000, 9_000_000, a).is_err());
    }

    #[test]
    fn test_bid_decision_decline() {
        let d = BidDecision::decline("Already the current manager");
        assert!(!d.should_bid);
        assert_eq!(d.rent_amount, U256::ZERO);
        assert_eq!(d.expected_profit, I256::ZERO);
    }
}
