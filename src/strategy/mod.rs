//! Decision engines
//!
//! Pure, synchronous functions. Every input is an explicit argument; nothing
//! here touches the ledger or suspends.
//!
//! Created: 2026-02-03

pub mod bid;
pub mod fee;

pub use bid::{
    calculate_bid_decision, is_withdrawal_profitable, BidConfig, BidStrategy, BidStrategyInput,
};
pub use fee::{
    calculate_optimal_fee, fee_update_interval_blocks, run_all_strategies, select_best_strategy,
    should_update_fee, FeeOptimizationInput, FeeStrategy, OptimizationConfig,
};
