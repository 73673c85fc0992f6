//! Operator Orchestration
//!
//! Wires the monitor, the engines and the executor into long-running loops.
//!
//! Per pool:
//!   - fee loop:      while we are the manager, retune the swap fee
//!   - bid loop:      evaluate (and maybe submit) a bid, throttled to
//!                    every `update_frequency_blocks` × 12 s
//!   - withdraw loop: withdraw accrued manager fees when worth the gas
//! Once:
//!   - health loop:   wallet balance, block height, registration status
//!   - proof loop:    when registered, attest the performance counters every
//!                    `proof_interval_ms` and reset them once accepted
//!
//! Every loop logs failures and carries on with the next tick.
//!
//! Created: 2026-02-03

use crate::config::OperatorConfig;
use crate::contracts::PoolKey;
use crate::error::OperatorError;
use crate::executor::TransactionExecutor;
use crate::pool::PoolMonitor;
use crate::registration::{PerformanceTracker, ProofSubmission, RegistrationService};
use crate::strategy::{
    fee_update_interval_blocks, is_withdrawal_profitable, run_all_strategies, select_best_strategy,
    should_update_fee, BidStrategyInput, FeeOptimizationInput,
};
use crate::types::{pool_id, wei_to_eth, BidDecision, PoolState, Snapshot, TransactionOutcome, TxStatus, FEE_DENOMINATOR};
use alloy::primitives::{I256, U256};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Seconds per block used to turn block counts into wall time
pub const BLOCK_TIME_SECS: u64 = 12;

/// Bounds for the adaptive fee-update cadence
pub const MIN_FEE_UPDATE_BLOCKS: u64 = 10;
pub const MAX_FEE_UPDATE_BLOCKS: u64 = 100;

pub struct Operator {
    config: OperatorConfig,
    monitor: Arc<PoolMonitor>,
    executor: Arc<TransactionExecutor>,
    tracker: Arc<PerformanceTracker>,
    registration: Option<Arc<dyn RegistrationService>>,
}

/// Fee revenue at the pool's current fee: liquidity × fee / 1e6
pub fn current_fee_revenue(pool_state: &PoolState) -> U256 {
    U256::from(pool_state.liquidity) * U256::from(pool_state.swap_fee) / U256::from(FEE_DENOMINATOR)
}

/// Signed difference `optimal − current`
pub fn revenue_delta(optimal: U256, current: U256) -> I256 {
    let optimal = I256::try_from(optimal).unwrap_or(I256::MAX);
    let current = I256::try_from(current).unwrap_or(I256::MAX);
    optimal.saturating_sub(current)
}

impl Operator {
    pub fn new(
        config: OperatorConfig,
        monitor: Arc<PoolMonitor>,
        executor: Arc<TransactionExecutor>,
        registration: Option<Arc<dyn RegistrationService>>,
    ) -> Self {
        Self {
            config,
            monitor,
            executor,
            tracker: Arc::new(PerformanceTracker::new()),
            registration,
        }
    }

    pub fn tracker(&self) -> Arc<PerformanceTracker> {
        self.tracker.clone()
    }

    /// Spawn every loop. Dropping or aborting the set stops them.
    pub fn spawn(self: Arc<Self>) -> JoinSet<()> {
        let mut set = JoinSet::new();

        for key in self.config.pools.clone() {
            let op = self.clone();
            let fee_key = key.clone();
            set.spawn(async move { op.fee_loop(fee_key).await });

            let op = self.clone();
            let bid_key = key.clone();
            set.spawn(async move { op.bid_loop(bid_key).await });

            let op = self.clone();
            set.spawn(async move { op.withdraw_loop(key).await });
        }

        let op = self.clone();
        set.spawn(async move { op.health_loop().await });

        if self.registration.is_some() {
            let op = self.clone();
            set.spawn(async move { op.proof_loop().await });
        }

        info!(
            "Operator started: {} pools, bid strategy {}",
            self.config.pools.len(),
            self.config.bid_strategy
        );
        set
    }

    // ── Fee updates ──────────────────────────────────────────────────

    async fn fee_loop(&self, key: PoolKey) {
        let id = pool_id(&key);
        let mut sub = self.monitor.observe(id);
        let mut last_update_block: Option<u64> = None;

        while let Some(item) = sub.next().await {
            match item {
                Ok(snapshot) => match self.update_fee(&key, &snapshot, &mut last_update_block).await {
                    Ok(Some(outcome)) => debug!("Fee update for pool {}: {}", id, outcome.status),
                    Ok(None) => {}
                    Err(e) => error!("Fee update failed for pool {}: {}", id, e),
                },
                Err(e) => warn!("Skipping fee update for pool {}: {}", id, e),
            }
        }
        info!("Fee loop for pool {} ended", id);
    }

    /// Returns the outcome if a setSwapFee transaction was sent.
    pub async fn update_fee(
        &self,
        key: &PoolKey,
        snapshot: &Snapshot,
        last_update_block: &mut Option<u64>,
    ) -> Result<Option<TransactionOutcome>, OperatorError> {
        let Snapshot {
            pool_state,
            market_data,
            ..
        } = snapshot;

        if pool_state.current_manager != Some(self.config.operator_address) {
            debug!("Not the manager of pool {}, skipping fee update", pool_state.pool_id);
            return Ok(None);
        }

        let block = pool_state.last_update_block;
        let interval = fee_update_interval_blocks(
            market_data.volatility,
            market_data.volume_change,
            MIN_FEE_UPDATE_BLOCKS,
            MAX_FEE_UPDATE_BLOCKS,
        );
        if let Some(last) = *last_update_block {
            if block < last.saturating_add(interval) {
                debug!(
                    "Pool {} fee updated at block {}, next check at {}",
                    pool_state.pool_id,
                    last,
                    last + interval
                );
                return Ok(None);
            }
        }

        let input = FeeOptimizationInput {
            pool_state,
            market_data,
            config: self.config.optimization,
            now_ms: Utc::now().timestamp_millis(),
        };
        let optimal = select_best_strategy(&run_all_strategies(&input))?;

        let gas_price = self.executor.base_gas_price().await?;
        let delta = revenue_delta(optimal.expected_revenue, current_fee_revenue(pool_state));

        if !should_update_fee(pool_state.swap_fee, optimal.fee, gas_price, delta) {
            debug!(
                "Pool {} fee {} → {} not worth updating (delta {})",
                pool_state.pool_id, pool_state.swap_fee, optimal.fee, delta
            );
            return Ok(None);
        }

        info!(
            "Updating fee for pool {}: {} → {} (confidence {:.0}%) {}",
            pool_state.pool_id,
            pool_state.swap_fee,
            optimal.fee,
            optimal.confidence * 100.0,
            optimal.reasoning
        );
        let outcome = self.executor.set_swap_fee(key, optimal.fee).await?;
        if outcome.status == TxStatus::Success {
            *last_update_block = Some(block);
            let gain = if delta.is_positive() { delta.into_raw() } else { U256::ZERO };
            self.tracker.record_fee_optimization(gain, outcome.gas_used);
        } else {
            self.tracker.add_gas_used(outcome.gas_used);
        }
        Ok(Some(outcome))
    }

    // ── Bids ─────────────────────────────────────────────────────────

    async fn bid_loop(&self, key: PoolKey) {
        let id = pool_id(&key);
        let mut sub = self.monitor.observe(id);
        let throttle = Duration::from_secs(self.config.update_frequency_blocks.saturating_mul(BLOCK_TIME_SECS));
        let mut last_evaluation: Option<Instant> = None;

        while let Some(item) = sub.next().await {
            let snapshot = match item {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping bid evaluation for pool {}: {}", id, e);
                    continue;
                }
            };
            if last_evaluation.is_some_and(|at| at.elapsed() < throttle) {
                continue;
            }
            last_evaluation = Some(Instant::now());

            match self.evaluate_bid(&key, &snapshot).await {
                Ok((decision, Some(outcome))) => info!(
                    "Bid for pool {} at rent {}: {} ({})",
                    id, decision.rent_amount, outcome.hash, outcome.status
                ),
                Ok((decision, None)) => debug!("No bid for pool {}: {}", id, decision.reasoning),
                Err(e) => error!("Bid evaluation failed for pool {}: {}", id, e),
            }
        }
        info!("Bid loop for pool {} ended", id);
    }

    /// Decide, and submit the bid if the decision says so.
    pub async fn evaluate_bid(
        &self,
        key: &PoolKey,
        snapshot: &Snapshot,
    ) -> Result<(BidDecision, Option<TransactionOutcome>), OperatorError> {
        let fee_input = FeeOptimizationInput {
            pool_state: &snapshot.pool_state,
            market_data: &snapshot.market_data,
            config: self.config.optimization,
            now_ms: Utc::now().timestamp_millis(),
        };
        let optimal = match select_best_strategy(&run_all_strategies(&fee_input)) {
            Ok(optimal) => optimal,
            Err(e) => return Ok((BidDecision::decline(format!("No fee estimate: {}", e)), None)),
        };

        let gas_price = self.executor.base_gas_price().await?;
        let decision = self.config.bid_strategy.decide(&BidStrategyInput {
            pool_state: &snapshot.pool_state,
            market_data: &snapshot.market_data,
            auction_state: &snapshot.auction_state,
            optimal_fee: &optimal,
            config: self.config.bid,
            current_block: snapshot.pool_state.last_update_block,
            gas_price,
        });

        if !decision.should_bid {
            return Ok((decision, None));
        }

        info!(
            "Bidding on pool {}: rent {} (margin {:.2}%, risk {:.2}) {}",
            snapshot.pool_state.pool_id,
            decision.rent_amount,
            decision.profit_margin * 100.0,
            decision.risk_score,
            decision.reasoning
        );
        let outcome = self.executor.submit_bid(key, decision.rent_amount).await?;
        self.tracker.add_gas_used(outcome.gas_used);
        Ok((decision, Some(outcome)))
    }

    // ── Fee withdrawal ───────────────────────────────────────────────

    async fn withdraw_loop(&self, key: PoolKey) {
        let id = pool_id(&key);
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.withdraw_check_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.withdraw_if_profitable(&key).await {
                Ok(Some(outcome)) => info!("Withdrew fees for pool {}: {} ({})", id, outcome.hash, outcome.status),
                Ok(None) => {}
                Err(e) => error!("Fee withdrawal check failed for pool {}: {}", id, e),
            }
        }
    }

    pub async fn withdraw_if_profitable(&self, key: &PoolKey) -> Result<Option<TransactionOutcome>, OperatorError> {
        let id = pool_id(key);
        let fees = self.executor.manager_fees(self.config.operator_address, id).await?;
        if fees.is_zero() {
            return Ok(None);
        }

        let gas_price = self.executor.base_gas_price().await?;
        if !is_withdrawal_profitable(fees, gas_price) {
            debug!("Pool {} fees {} below withdrawal threshold", id, fees);
            return Ok(None);
        }

        let outcome = self.executor.withdraw_manager_fees(key).await?;
        if outcome.status == TxStatus::Success {
            self.tracker.add_revenue(fees);
        }
        self.tracker.add_gas_used(outcome.gas_used);
        Ok(Some(outcome))
    }

    // ── Health ───────────────────────────────────────────────────────

    async fn health_loop(&self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.health_check_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.health_check().await {
                error!("Health check failed: {}", e);
            }
        }
    }

    pub async fn health_check(&self) -> Result<(), OperatorError> {
        let me = self.config.operator_address;
        let (balance, block) = tokio::join!(self.executor.balance(me), self.executor.block_number());
        let balance_eth = wei_to_eth(balance?);
        let block = block?;

        let metrics = self.tracker.metrics();
        info!(
            "Health: block {} | balance {:.4} ETH | fee updates {} | revenue {} | gas {} | uptime {}s",
            block,
            balance_eth,
            metrics.fee_optimizations,
            metrics.revenue_generated,
            metrics.gas_used,
            metrics.uptime_secs
        );

        if balance_eth < self.config.low_balance_eth {
            warn!(
                "Low balance: {:.4} ETH (threshold {} ETH)",
                balance_eth, self.config.low_balance_eth
            );
        }

        if let Some(registration) = &self.registration {
            let status = registration.operator_status(me).await?;
            if status.is_slashed {
                warn!("Operator {} has been slashed", me);
            } else if !status.is_registered {
                warn!("Operator {} is no longer registered", me);
            }
        }
        Ok(())
    }
}

impl Operator {
    // ── Performance proofs ───────────────────────────────────────────

    async fn proof_loop(&self) {
        let period = Duration::from_millis(self.config.proof_interval_ms);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.submit_performance_proof().await {
                Ok(Some(proof)) => info!(
                    "Performance proof {}: {} ({})",
                    proof.proof_hash, proof.outcome.hash, proof.outcome.status
                ),
                Ok(None) => {}
                Err(e) => error!("Performance proof failed: {}", e),
            }
        }
    }

    /// Attest the counters gathered since the last accepted proof. Counters
    /// are reset only when the proof transaction succeeds.
    pub async fn submit_performance_proof(&self) -> Result<Option<ProofSubmission>, OperatorError> {
        let Some(registration) = &self.registration else {
            return Ok(None);
        };

        let metrics = self.tracker.metrics();
        if metrics.fee_optimizations == 0 && metrics.revenue_generated.is_zero() && metrics.gas_used.is_zero() {
            debug!("No activity since the last proof, skipping");
            return Ok(None);
        }

        let proof = registration
            .submit_performance_proof(self.config.performance_task_id, &metrics)
            .await?;
        if proof.outcome.status == TxStatus::Success {
            self.tracker.reset();
        } else {
            warn!("Performance proof {} reverted, keeping counters", proof.outcome.hash);
        }
        Ok(Some(proof))
    }
}
