//! Operator Registration
//!
//! Thin client for the service manager contract: register / deregister,
//! stake top-ups, status queries and periodic performance proofs.
//!
//! The proof hash is keccak256 of the JSON-serialized metrics plus a
//! timestamp, so the contract can bind the submitted counters to an
//! off-chain record.
//!
//! Created: 2026-02-03

use crate::contracts::IServiceManager;
use crate::error::OperatorError;
use crate::types::{TransactionOutcome, TxStatus};
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::TransactionReceipt;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorStatus {
    pub is_registered: bool,
    pub staked_amount: U256,
    pub registration_block: u64,
    pub total_tasks_completed: u64,
    pub total_tasks_failed: u64,
    pub performance_score: U256,
    pub is_slashed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub fee_optimizations: u64,
    pub revenue_generated: U256,
    pub gas_used: U256,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProofSubmission {
    pub outcome: TransactionOutcome,
    pub proof_hash: B256,
}

/// keccak256 over the JSON form of `metrics` at `timestamp_ms`
pub fn proof_hash(metrics: &PerformanceMetrics, timestamp_ms: i64) -> B256 {
    let proof = serde_json::json!({
        "feeOptimizations": metrics.fee_optimizations,
        "revenueGenerated": metrics.revenue_generated.to_string(),
        "gasUsed": metrics.gas_used.to_string(),
        "uptime": metrics.uptime_secs,
        "timestamp": timestamp_ms,
    });
    keccak256(proof.to_string().as_bytes())
}

#[async_trait]
pub trait RegistrationService: Send + Sync {
    /// Register with `stake`, or the configured minimum stake when `None`
    async fn register_operator(&self, stake: Option<U256>) -> Result<TransactionOutcome, OperatorError>;

    async fn deregister_operator(&self) -> Result<TransactionOutcome, OperatorError>;

    async fn increase_stake(&self, amount: U256) -> Result<TransactionOutcome, OperatorError>;

    async fn operator_status(&self, operator: Address) -> Result<OperatorStatus, OperatorError>;

    async fn submit_performance_proof(
        &self,
        task_id: U256,
        metrics: &PerformanceMetrics,
    ) -> Result<ProofSubmission, OperatorError>;
}

pub struct ServiceManagerClient<P> {
    provider: Arc<P>,
    address: Address,
    min_stake: U256,
}

impl<P: Provider + 'static> ServiceManagerClient<P> {
    pub fn new(provider: Arc<P>, address: Address, min_stake: U256) -> Self {
        Self {
            provider,
            address,
            min_stake,
        }
    }

    fn contract(&self) -> IServiceManager::IServiceManagerInstance<Arc<P>> {
        IServiceManager::new(self.address, self.provider.clone())
    }
}

fn receipt_outcome(receipt: &TransactionReceipt) -> TransactionOutcome {
    TransactionOutcome {
        hash: receipt.transaction_hash,
        block_number: receipt.block_number.unwrap_or_default(),
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        status: if receipt.status() {
            TxStatus::Success
        } else {
            TxStatus::Failed
        },
    }
}

#[async_trait]
impl<P: Provider + 'static> RegistrationService for ServiceManagerClient<P> {
    async fn register_operator(&self, stake: Option<U256>) -> Result<TransactionOutcome, OperatorError> {
        let stake = stake.unwrap_or(self.min_stake);
        if stake < self.min_stake {
            return Err(OperatorError::Validation(format!(
                "Stake {} below minimum {}",
                stake, self.min_stake
            )));
        }
        info!("Registering operator with stake {}", stake);

        let receipt = self
            .contract()
            .registerOperator()
            .value(stake)
            .send()
            .await
            .map_err(|e| OperatorError::from_rpc("registerOperator", e))?
            .get_receipt()
            .await
            .map_err(|e| OperatorError::from_rpc("registerOperator receipt", e))?;

        let outcome = receipt_outcome(&receipt);
        info!(
            "Operator registered: {} in block {} ({})",
            outcome.hash, outcome.block_number, outcome.status
        );
        Ok(outcome)
    }

    async fn deregister_operator(&self) -> Result<TransactionOutcome, OperatorError> {
        info!("Deregistering operator");
        let receipt = self
            .contract()
            .deregisterOperator()
            .send()
            .await
            .map_err(|e| OperatorError::from_rpc("deregisterOperator", e))?
            .get_receipt()
            .await
            .map_err(|e| OperatorError::from_rpc("deregisterOperator receipt", e))?;
        Ok(receipt_outcome(&receipt))
    }

    async fn increase_stake(&self, amount: U256) -> Result<TransactionOutcome, OperatorError> {
        info!("Increasing stake by {}", amount);
        let receipt = self
            .contract()
            .increaseStake()
            .value(amount)
            .send()
            .await
            .map_err(|e| OperatorError::from_rpc("increaseStake", e))?
            .get_receipt()
            .await
            .map_err(|e| OperatorError::from_rpc("increaseStake receipt", e))?;
        Ok(receipt_outcome(&receipt))
    }

    async fn operator_status(&self, operator: Address) -> Result<OperatorStatus, OperatorError> {
        let contract = self.contract();
        let info_call = contract.operators(operator);
        let score_call = contract.getOperatorPerformanceScore(operator);
        let (info_res, score_res) = tokio::join!(info_call.call(), score_call.call());

        let info = info_res.map_err(|e| OperatorError::from_rpc("operators", e))?;
        let score = score_res.map_err(|e| OperatorError::from_rpc("getOperatorPerformanceScore", e))?;

        Ok(OperatorStatus {
            is_registered: info.isRegistered,
            staked_amount: info.stakedAmount,
            registration_block: info.registrationBlock.saturating_to::<u64>(),
            total_tasks_completed: info.totalTasksCompleted.saturating_to::<u64>(),
            total_tasks_failed: info.totalTasksFailed.saturating_to::<u64>(),
            performance_score: score,
            is_slashed: info.isSlashed,
        })
    }

    async fn submit_performance_proof(
        &self,
        task_id: U256,
        metrics: &PerformanceMetrics,
    ) -> Result<ProofSubmission, OperatorError> {
        let proof_hash = proof_hash(metrics, chrono::Utc::now().timestamp_millis());
        info!(
            "Submitting performance proof for task {}: optimizations={} revenue={} gas={} proof={}",
            task_id, metrics.fee_optimizations, metrics.revenue_generated, metrics.gas_used, proof_hash
        );

        let receipt = self
            .contract()
            .submitPerformanceProof(
                task_id,
                U256::from(metrics.fee_optimizations),
                metrics.revenue_generated,
                metrics.gas_used,
                proof_hash,
            )
            .send()
            .await
            .map_err(|e| OperatorError::from_rpc("submitPerformanceProof", e))?
            .get_receipt()
            .await
            .map_err(|e| OperatorError::from_rpc("submitPerformanceProof receipt", e))?;

        Ok(ProofSubmission {
            outcome: receipt_outcome(&receipt),
            proof_hash,
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    fee_optimizations: u64,
    revenue: U256,
    gas_used: U256,
}

/// Running totals reported in performance proofs. Shared by all pool loops.
#[derive(Debug)]
pub struct PerformanceTracker {
    started: Instant,
    counters: Mutex<Counters>,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    fn with_counters<T>(&self, f: impl FnOnce(&mut Counters) -> T) -> T {
        // Counters stay consistent even if a holder panicked
        let mut guard = self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// A confirmed fee update
    pub fn record_fee_optimization(&self, expected_revenue_gain: U256, gas_used: u64) {
        self.with_counters(|c| {
            c.fee_optimizations += 1;
            c.revenue = c.revenue.saturating_add(expected_revenue_gain);
            c.gas_used = c.gas_used.saturating_add(U256::from(gas_used));
        });
    }

    pub fn add_revenue(&self, amount: U256) {
        self.with_counters(|c| c.revenue = c.revenue.saturating_add(amount));
    }

    pub fn add_gas_used(&self, gas: u64) {
        self.with_counters(|c| c.gas_used = c.gas_used.saturating_add(U256::from(gas)));
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let uptime_secs = self.started.elapsed().as_secs();
        self.with_counters(|c| PerformanceMetrics {
            fee_optimizations: c.fee_optimizations,
            revenue_generated: c.revenue,
            gas_used: c.gas_used,
            uptime_secs,
        })
    }

    /// Clear counters after a proof has been accepted
    pub fn reset(&self) {
        self.with_counters(|c| *c = Counters::default());
    }
}
