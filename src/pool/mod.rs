//! Pool observation
//!
//! Ledger reads, per-pool market history, and the polling monitor that
//! composes them into deduplicated snapshot streams.
//!
//! Created: 2026-02-03

pub mod market;
pub mod monitor;
pub mod reader;

pub use market::{MarketAssumptions, MarketDataCalculator};
pub use monitor::{PoolMonitor, PoolSubscription};
pub use reader::{HookStateReader, StateReader};
