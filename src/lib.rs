//! Auction Operator Library
//!
//! Decision core of a pool-manager operator for a rent-auction hook:
//! polls pool and auction state, recommends swap fees, decides rent bids
//! and executes the resulting hook transactions under a bounded retry policy.
//!
//! Created: 2026-02-03

pub mod config;
pub mod contracts;
pub mod error;
pub mod executor;
pub mod logging;
pub mod operator;
pub mod pool;
pub mod registration;
pub mod retry;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, load_config_from_file, OperatorConfig};
pub use error::OperatorError;
pub use executor::{HookLedger, TransactionExecutor};
pub use operator::Operator;
pub use pool::{HookStateReader, PoolMonitor};
pub use types::{BidDecision, MarketData, OptimalFee, PoolState, Snapshot, TransactionOutcome};
