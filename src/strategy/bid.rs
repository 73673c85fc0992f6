//! Bid Strategy Engine
//!
//! Decides whether to bid for management rights of a pool, and at what
//! rent per block. Pure: all inputs (auction state, gas price, current
//! block) are supplied by the caller.
//!
//! Revenue model per block:
//!   swap fees         = volume_24h / 7200 · fee / 1e6
//!   withdrawal fees   = liquidity · 5% / 7200 · 0.001%
//!   arbitrage capture = liquidity · volatility · 0.01%
//!
//! Cost model per block:
//!   rent + gas_price · 4000 + deposit opportunity cost (5% APY)
//!
//! Created: 2026-02-03

use crate::types::{
    u256_to_f64, AuctionState, BidDecision, MarketData, OptimalFee, PoolState, FEE_DENOMINATOR,
};
use alloy::primitives::{Address, I256, U256};
use std::fmt;
use std::str::FromStr;

/// ~12 s blocks
pub const BLOCKS_PER_DAY: u64 = 7200;
pub const BLOCKS_PER_YEAR: u64 = 2_628_000;

/// Withdrawal fee charged by the manager, in fee units (0.001%)
const WITHDRAWAL_FEE: u64 = 10;
/// Share of liquidity assumed to be withdrawn per day (5%)
const DAILY_WITHDRAWAL_PCT: u64 = 5;
/// Arbitrage capture: 10 / 100_000 = 0.01% of liquidity per unit volatility
const ARBITRAGE_CAPTURE_NUM: u64 = 10;
const ARBITRAGE_CAPTURE_DEN: u64 = 100_000;
/// Gas attributed to each managed block
const AVG_GAS_PER_BLOCK: u64 = 4000;
/// Annual yield forgone on the locked deposit
const DEPOSIT_APY: f64 = 0.05;
/// Smallest outbid step (wei)
const MIN_BID_INCREMENT: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidConfig {
    pub operator_address: Address,
    pub min_profit_margin: f64,
    pub max_bid_amount_wei: U256,
    pub risk_tolerance: f64,
    /// Deposit = rent · min_deposit_blocks
    pub min_deposit_blocks: u64,
    pub activation_delay: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BidStrategyInput<'a> {
    pub pool_state: &'a PoolState,
    pub market_data: &'a MarketData,
    pub auction_state: &'a AuctionState,
    pub optimal_fee: &'a OptimalFee,
    pub config: BidConfig,
    pub current_block: u64,
    pub gas_price: u128,
}

// ── Revenue ──────────────────────────────────────────────────────────

pub fn swap_fee_revenue_per_block(volume_24h: U256, fee: u32) -> U256 {
    volume_24h / U256::from(BLOCKS_PER_DAY) * U256::from(fee) / U256::from(FEE_DENOMINATOR)
}

pub fn withdrawal_fee_revenue_per_block(liquidity: u128) -> U256 {
    let daily_withdrawals = U256::from(liquidity) * U256::from(DAILY_WITHDRAWAL_PCT) / U256::from(100u64);
    daily_withdrawals / U256::from(BLOCKS_PER_DAY) * U256::from(WITHDRAWAL_FEE)
        / U256::from(FEE_DENOMINATOR)
}

pub fn arbitrage_revenue_per_block(volatility: f64, liquidity: u128) -> U256 {
    let scaled_volatility = (volatility * 1000.0).floor().max(0.0) as u64;
    U256::from(liquidity) * U256::from(scaled_volatility) / U256::from(1000u64)
        * U256::from(ARBITRAGE_CAPTURE_NUM)
        / U256::from(ARBITRAGE_CAPTURE_DEN)
}

pub fn expected_revenue_per_block(
    market_data: &MarketData,
    pool_state: &PoolState,
    optimal_fee: &OptimalFee,
) -> U256 {
    swap_fee_revenue_per_block(optimal_fee.expected_volume, optimal_fee.fee)
        + withdrawal_fee_revenue_per_block(pool_state.liquidity)
        + arbitrage_revenue_per_block(market_data.volatility, pool_state.liquidity)
}

// ── Cost ─────────────────────────────────────────────────────────────

pub fn required_deposit(rent_per_block: U256, min_deposit_blocks: u64) -> U256 {
    rent_per_block.saturating_mul(U256::from(min_deposit_blocks))
}

pub fn expected_cost_per_block(rent_per_block: U256, gas_price: u128, deposit: U256) -> U256 {
    let gas_cost = U256::from(gas_price).saturating_mul(U256::from(AVG_GAS_PER_BLOCK));
    // Per-block yield scaled by 1e18 to stay in integer math
    let yield_per_block = (DEPOSIT_APY * 1e18 / BLOCKS_PER_YEAR as f64).floor() as u64;
    let opportunity_cost =
        deposit.saturating_mul(U256::from(yield_per_block)) / U256::from(1_000_000_000_000_000_000u64);
    rent_per_block
        .saturating_add(gas_cost)
        .saturating_add(opportunity_cost)
}

// ── Risk ─────────────────────────────────────────────────────────────

/// Additive risk in [0, 1]: volatility, shallow liquidity, low fee
/// confidence, a competing challenger, and falling volume.
pub fn risk_score(
    market_data: &MarketData,
    pool_state: &PoolState,
    auction_state: &AuctionState,
    optimal_fee: &OptimalFee,
) -> f64 {
    let mut risk = 0.0;

    if market_data.volatility > 0.5 {
        risk += 0.3;
    } else if market_data.volatility > 0.3 {
        risk += 0.15;
    }

    let liquidity_units = u256_to_f64(U256::from(pool_state.liquidity)) / 1e18;
    if liquidity_units < 10.0 {
        risk += 0.3;
    } else if liquidity_units < 50.0 {
        risk += 0.15;
    }

    if optimal_fee.confidence < 0.5 {
        risk += 0.2;
    } else if optimal_fee.confidence < 0.7 {
        risk += 0.1;
    }

    if auction_state.next_bidder.is_some() {
        risk += 0.1;
    }

    if market_data.volume_change < -20.0 {
        risk += 0.2;
    }

    f64::min(risk, 1.0)
}

/// Outbid the standing (or pending) rent by one increment plus a
/// risk-adjusted share of half the expected revenue.
pub fn optimal_rent(
    auction_state: &AuctionState,
    expected_revenue: U256,
    risk_score: f64,
    risk_tolerance: f64,
) -> U256 {
    let standing_rent = if auction_state.next_bidder.is_some() {
        auction_state.next_rent
    } else {
        auction_state.current_rent
    };
    let min_bid = standing_rent.saturating_add(U256::from(MIN_BID_INCREMENT));

    let risk_adjustment = (1.0 - risk_score + risk_tolerance).max(0.1);
    let scaled = (risk_adjustment * 1000.0).floor() as u64;
    let premium = expected_revenue / U256::from(2u8) * U256::from(scaled) / U256::from(1000u64);

    min_bid.saturating_add(premium)
}

fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// profit / revenue, with 4-decimal precision; 0 when revenue is 0
pub fn profit_margin(profit: I256, revenue: U256) -> f64 {
    if revenue.is_zero() {
        return 0.0;
    }
    let scaled = profit
        .saturating_mul(I256::from_raw(U256::from(10_000u64)))
        .checked_div(to_signed(revenue))
        .unwrap_or(I256::ZERO);
    let basis_points = i64::try_from(scaled).unwrap_or(if scaled.is_negative() {
        i64::MIN
    } else {
        i64::MAX
    });
    basis_points as f64 / 10_000.0
}

// ── Decision ─────────────────────────────────────────────────────────

pub fn calculate_bid_decision(input: &BidStrategyInput<'_>) -> BidDecision {
    let BidStrategyInput {
        pool_state,
        market_data,
        auction_state,
        optimal_fee,
        config,
        current_block,
        gas_price,
    } = *input;

    if auction_state.current_manager == Some(config.operator_address) {
        return BidDecision::decline("Already the current manager");
    }
    if auction_state.next_bidder == Some(config.operator_address)
        && current_block < auction_state.activation_block
    {
        return BidDecision::decline("Already the next bidder, waiting for activation");
    }

    let revenue = expected_revenue_per_block(market_data, pool_state, optimal_fee);
    let risk = risk_score(market_data, pool_state, auction_state, optimal_fee);
    let rent = optimal_rent(auction_state, revenue, risk, config.risk_tolerance);

    let deposit = required_deposit(rent, config.min_deposit_blocks);
    if deposit > config.max_bid_amount_wei {
        return BidDecision {
            should_bid: false,
            rent_amount: rent,
            expected_profit: I256::ZERO,
            expected_total_profit: I256::ZERO,
            profit_margin: 0.0,
            risk_score: risk,
            reasoning: format!(
                "Required deposit ({}) exceeds maximum ({})",
                deposit, config.max_bid_amount_wei
            ),
        };
    }

    let cost = expected_cost_per_block(rent, gas_price, deposit);
    let profit = to_signed(revenue).saturating_sub(to_signed(cost));
    let margin = profit_margin(profit, revenue);

    if margin < config.min_profit_margin {
        return BidDecision {
            should_bid: false,
            rent_amount: rent,
            expected_profit: profit,
            expected_total_profit: I256::ZERO,
            profit_margin: margin,
            risk_score: risk,
            reasoning: format!(
                "Profit margin ({:.2}%) below minimum ({:.2}%)",
                margin * 100.0,
                config.min_profit_margin * 100.0
            ),
        };
    }

    // Blocks the deposit can cover at this rent
    let blocks_covered = if rent.is_zero() { U256::ZERO } else { deposit / rent };
    let total_profit = profit.saturating_mul(to_signed(blocks_covered));

    let reasoning = [
        format!("Expected revenue per block: {}", revenue),
        format!("Expected cost per block: {}", cost),
        format!("Profit per block: {}", profit),
        format!("Profit margin: {:.2}%", margin * 100.0),
        format!("Risk score: {:.2}", risk),
        format!("Proposed rent: {}", rent),
        format!("Required deposit: {}", deposit),
        format!("Total expected profit: {}", total_profit),
    ]
    .join(" | ");

    BidDecision {
        should_bid: true,
        rent_amount: rent,
        expected_profit: profit,
        expected_total_profit: total_profit,
        profit_margin: margin,
        risk_score: risk,
        reasoning,
    }
}

/// Named bid strategies; each one tunes risk tolerance and margin before
/// delegating to the base calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidStrategy {
    Base,
    /// Risk tolerance +0.3, margin ×0.7
    Aggressive,
    /// Risk tolerance −0.3, margin ×1.5
    Conservative,
    /// Aggressive when a challenger is pending, conservative when volatile
    Adaptive,
}

impl BidStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            BidStrategy::Base => "base",
            BidStrategy::Aggressive => "aggressive",
            BidStrategy::Conservative => "conservative",
            BidStrategy::Adaptive => "adaptive",
        }
    }

    pub fn decide(&self, input: &BidStrategyInput<'_>) -> BidDecision {
        match self {
            BidStrategy::Base => calculate_bid_decision(input),
            BidStrategy::Aggressive => {
                let config = BidConfig {
                    risk_tolerance: (input.config.risk_tolerance + 0.3).min(1.0),
                    min_profit_margin: input.config.min_profit_margin * 0.7,
                    ..input.config
                };
                calculate_bid_decision(&BidStrategyInput { config, ..*input })
            }
            BidStrategy::Conservative => {
                let config = BidConfig {
                    risk_tolerance: (input.config.risk_tolerance - 0.3).max(0.0),
                    min_profit_margin: input.config.min_profit_margin * 1.5,
                    ..input.config
                };
                calculate_bid_decision(&BidStrategyInput { config, ..*input })
            }
            BidStrategy::Adaptive => {
                if input.auction_state.next_bidder.is_some() {
                    BidStrategy::Aggressive.decide(input)
                } else if input.market_data.volatility > 0.5 {
                    BidStrategy::Conservative.decide(input)
                } else {
                    BidStrategy::Base.decide(input)
                }
            }
        }
    }
}

impl fmt::Display for BidStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BidStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(BidStrategy::Base),
            "aggressive" => Ok(BidStrategy::Aggressive),
            "conservative" => Ok(BidStrategy::Conservative),
            "adaptive" => Ok(BidStrategy::Adaptive),
            other => Err(format!(
                "unknown bid strategy '{}' (expected base, aggressive, conservative or adaptive)",
                other
            )),
        }
    }
}

/// Gas units a withdrawManagerFees call is budgeted at
pub const WITHDRAW_GAS: u64 = 100_000;

/// Withdraw only when accrued fees cover at least twice the gas cost.
pub fn is_withdrawal_profitable(accrued_fees: U256, gas_price: u128) -> bool {
    let gas_cost = U256::from(gas_price).saturating_mul(U256::from(WITHDRAW_GAS));
    accrued_fees >= gas_cost.saturating_mul(U256::from(2u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::eth_to_wei;
    use alloy::primitives::B256;

    const ETH: u128 = 1_000_000_000_000_000_000;
    const GWEI: u128 = 1_000_000_000;

    fn me() -> Address {
        Address::repeat_byte(0xAA)
    }

    fn rival() -> Address {
        Address::repeat_byte(0xBB)
    }

    fn pool(liquidity: u128) -> PoolState {
        PoolState {
            pool_id: B256::repeat_byte(0x42),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            current_manager: Some(rival()),
            rent_per_block: U256::from(1000u64),
            swap_fee: 3000,
            liquidity,
            sqrt_price_x96: U256::from(1u8) << 96,
            tick: 0,
            last_update_block: 100,
        }
    }

    fn market(volatility: f64) -> MarketData {
        MarketData {
            pool_id: B256::repeat_byte(0x42),
            timestamp_ms: 0,
            volatility,
            volume_24h: eth_to_wei(1.0),
            volume_change: 0.0,
            price_change: 0.0,
            spread: 0.001,
            trades: 100,
        }
    }

    fn auction(manager: Option<Address>, next: Option<Address>) -> AuctionState {
        AuctionState {
            current_manager: manager,
            current_rent: U256::from(1000u64),
            next_bidder: next,
            next_rent: U256::from(5000u64),
            activation_block: 200,
            manager_deposit: U256::ZERO,
        }
    }

    fn fee(expected_volume: U256) -> OptimalFee {
        OptimalFee {
            fee: 3000,
            confidence: 1.0,
            expected_volume,
            expected_revenue: U256::ZERO,
            reasoning: String::new(),
        }
    }

    fn config() -> BidConfig {
        BidConfig {
            operator_address: me(),
            min_profit_margin: 0.001,
            max_bid_amount_wei: U256::from(10 * ETH),
            risk_tolerance: 0.5,
            min_deposit_blocks: 100,
            activation_delay: 5,
        }
    }

    struct Fixture {
        pool: PoolState,
        market: MarketData,
        auction: AuctionState,
        fee: OptimalFee,
        config: BidConfig,
        gas_price: u128,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                pool: pool(1000 * ETH),
                market: market(0.2),
                auction: auction(Some(rival()), None),
                fee: fee(eth_to_wei(100.0)),
                config: config(),
                gas_price: 0,
            }
        }

        fn input(&self) -> BidStrategyInput<'_> {
            BidStrategyInput {
                pool_state: &self.pool,
                market_data: &self.market,
                auction_state: &self.auction,
                optimal_fee: &self.fee,
                config: self.config,
                current_block: 150,
                gas_price: self.gas_price,
            }
        }
    }

    #[test]
    fn test_already_current_manager() {
        let mut f = Fixture::new();
        f.auction = auction(Some(me()), None);
        for strategy in [
            BidStrategy::Base,
            BidStrategy::Aggressive,
            BidStrategy::Conservative,
            BidStrategy::Adaptive,
        ] {
            let d = strategy.decide(&f.input());
            assert!(!d.should_bid);
            assert_eq!(d.rent_amount, U256::ZERO);
            assert_eq!(d.reasoning, "Already the current manager");
        }
    }

    #[test]
    fn test_already_next_bidder() {
        let mut f = Fixture::new();
        f.auction = auction(Some(rival()), Some(me()));
        let d = BidStrategy::Adaptive.decide(&f.input());
        assert!(!d.should_bid);
        assert_eq!(d.reasoning, "Already the next bidder, waiting for activation");

        // Activation block reached: evaluated like any other bid
        f.auction.activation_block = 150;
        let d = BidStrategy::Base.decide(&f.input());
        assert_ne!(d.reasoning, "Already the next bidder, waiting for activation");
    }

    #[test]
    fn test_rent_outbids_standing_rent() {
        let f = Fixture::new();
        let d = calculate_bid_decision(&f.input());
        assert!(d.rent_amount > f.auction.current_rent);

        // With a pending challenger, the challenger's rent is the one to beat
        let mut f = Fixture::new();
        f.auction = auction(Some(rival()), Some(Address::repeat_byte(0xCC)));
        let d = calculate_bid_decision(&f.input());
        assert!(d.rent_amount > f.auction.next_rent);
    }

    #[test]
    fn test_profitable_bid_accepted() {
        let f = Fixture::new();
        let d = calculate_bid_decision(&f.input());
        assert!(d.should_bid, "{}", d.reasoning);
        assert!(d.profit_margin >= f.config.min_profit_margin);
        assert!(d.expected_profit > I256::ZERO);
        assert!(d.expected_total_profit >= d.expected_profit);
        assert!(required_deposit(d.rent_amount, 100) <= f.config.max_bid_amount_wei);
    }

    #[test]
    fn test_deposit_cap_declines() {
        let mut f = Fixture::new();
        f.config.max_bid_amount_wei = U256::from(1u64);
        let d = calculate_bid_decision(&f.input());
        assert!(!d.should_bid);
        assert_eq!(d.expected_profit, I256::ZERO);
        assert!(d.reasoning.starts_with("Required deposit"));
    }

    #[test]
    fn test_deposit_cap_checked_before_margin() {
        let mut f = Fixture::new();
        f.gas_price = 1_000_000 * GWEI;

        // Margin alone fails with this gas price
        let margin_only = calculate_bid_decision(&f.input());
        assert!(margin_only.reasoning.starts_with("Profit margin"));

        // Both fail: the deposit cap is reported
        f.config.max_bid_amount_wei = U256::from(1u64);
        let d = calculate_bid_decision(&f.input());
        assert!(!d.should_bid);
        assert!(d.reasoning.starts_with("Required deposit"), "{}", d.reasoning);
        assert_eq!(d.expected_profit, I256::ZERO);
        assert_eq!(d.profit_margin, 0.0);
    }

    #[test]
    fn test_low_margin_declines() {
        let mut f = Fixture::new();
        // Gas swamps revenue
        f.gas_price = 1_000_000 * GWEI;
        let d = calculate_bid_decision(&f.input());
        assert!(!d.should_bid);
        assert!(d.profit_margin < f.config.min_profit_margin);
        assert!(d.reasoning.starts_with("Profit margin"));
    }

    #[test]
    fn test_accepted_bids_respect_invariants() {
        for volatility in [0.0, 0.3, 0.9] {
            for liquidity in [ETH, 50 * ETH, 5000 * ETH] {
                for gas_price in [0, GWEI, 50 * GWEI] {
                    let mut f = Fixture::new();
                    f.market = market(volatility);
                    f.pool = pool(liquidity);
                    f.gas_price = gas_price;
                    for strategy in [BidStrategy::Base, BidStrategy::Adaptive] {
                        let d = strategy.decide(&f.input());
                        assert!((0.0..=1.0).contains(&d.risk_score));
                        if d.should_bid {
                            assert!(d.rent_amount > f.auction.current_rent);
                            assert!(
                                required_deposit(d.rent_amount, f.config.min_deposit_blocks)
                                    <= f.config.max_bid_amount_wei
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_risk_score_components() {
        let calm = fee(U256::ZERO);
        let deep = pool(2000 * ETH);

        assert_eq!(risk_score(&market(0.0), &deep, &auction(None, None), &calm), 0.0);
        assert!((risk_score(&market(0.4), &deep, &auction(None, None), &calm) - 0.15).abs() < 1e-9);
        assert!((risk_score(&market(0.0), &pool(20 * ETH), &auction(None, None), &calm) - 0.15).abs() < 1e-9);

        let contested = auction(Some(rival()), Some(Address::repeat_byte(0xCC)));
        assert!((risk_score(&market(0.0), &deep, &contested, &calm) - 0.1).abs() < 1e-9);

        // Everything bad at once caps at 1.0
        let mut shaky = fee(U256::ZERO);
        shaky.confidence = 0.3;
        let mut falling = market(0.8);
        falling.volume_change = -50.0;
        assert_eq!(risk_score(&falling, &pool(ETH), &contested, &shaky), 1.0);
    }

    #[test]
    fn test_adaptive_selection() {
        // Pending challenger → aggressive
        let mut f = Fixture::new();
        f.auction = auction(Some(rival()), Some(Address::repeat_byte(0xCC)));
        assert_eq!(
            BidStrategy::Adaptive.decide(&f.input()),
            BidStrategy::Aggressive.decide(&f.input())
        );

        // High volatility → conservative
        let mut f = Fixture::new();
        f.market = market(0.8);
        assert_eq!(
            BidStrategy::Adaptive.decide(&f.input()),
            BidStrategy::Conservative.decide(&f.input())
        );

        // Otherwise base
        let f = Fixture::new();
        assert_eq!(
            BidStrategy::Adaptive.decide(&f.input()),
            BidStrategy::Base.decide(&f.input())
        );
    }

    #[test]
    fn test_aggressive_bids_at_least_base() {
        let f = Fixture::new();
        let base = BidStrategy::Base.decide(&f.input());
        let aggressive = BidStrategy::Aggressive.decide(&f.input());
        assert!(aggressive.rent_amount >= base.rent_amount);
    }

    #[test]
    fn test_profit_margin() {
        assert_eq!(profit_margin(I256::ZERO, U256::ZERO), 0.0);
        let half = profit_margin(I256::from_raw(U256::from(50u64)), U256::from(100u64));
        assert!((half - 0.5).abs() < 1e-9);
        let negative = profit_margin(-I256::from_raw(U256::from(300u64)), U256::from(100u64));
        assert!((negative + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_revenue_components() {
        // 7200 units/day at 100% fee → 1 unit/block
        assert_eq!(
            swap_fee_revenue_per_block(U256::from(7200u64), 1_000_000),
            U256::from(1u64)
        );
        assert_eq!(arbitrage_revenue_per_block(0.0, ETH), U256::ZERO);
        assert_eq!(arbitrage_revenue_per_block(-1.0, ETH), U256::ZERO);
        // 1 ETH at 100% vol → 0.01%
        assert_eq!(
            arbitrage_revenue_per_block(1.0, ETH),
            U256::from(ETH / 10_000)
        );
    }

    #[test]
    fn test_is_withdrawal_profitable() {
        let gas_price = 10 * GWEI; // 100k gas → 1e15 wei, ×2 → 2e15
        assert!(!is_withdrawal_profitable(U256::from(1_999_999_999_999_999u64), gas_price));
        assert!(is_withdrawal_profitable(U256::from(2_000_000_000_000_000u64), gas_price));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Adaptive".parse::<BidStrategy>(), Ok(BidStrategy::Adaptive));
        assert_eq!("base".parse::<BidStrategy>(), Ok(BidStrategy::Base));
        assert!("yolo".parse::<BidStrategy>().is_err());
    }
}
