//! Transaction Executor
//!
//! Submits hook writes (submitBid, setSwapFee, withdrawManagerFees) and
//! reports confirmed outcomes.
//!
//! Each write:
//!   1. gas price = node gas price × multiplier (20 gwei if the node fails)
//!   2. gas limit = estimate × 1.2
//!   3. broadcast, then wait for the receipt (1 confirmation)
//!
//! Retries never blindly resubmit. The hash of every broadcast is kept per
//! (pool, operation), with its request, until its receipt is seen. A retry
//! of the same request resumes waiting on that hash and only rebroadcasts
//! once the node no longer knows it. A different request in the same slot
//! first waits for the earlier one to settle, then broadcasts its own.
//!
//! A reverted receipt is a `Failed` outcome, not an error, and is not retried.
//!
//! Created: 2026-02-03

use crate::contracts::{IAuctionHook, IPoolManager, PoolKey};
use crate::error::OperatorError;
use crate::retry::RetryPolicy;
use crate::types::{pool_id, tick_to_i32, PoolId, Slot0, TransactionOutcome, TxStatus, FEE_DENOMINATOR};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::{TransactionInput, TransactionRequest};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Used when the node cannot quote a gas price
pub const FALLBACK_GAS_PRICE: u128 = 20_000_000_000;

/// Gas limit = estimate × 120 / 100
const GAS_LIMIT_BUFFER_PCT: u64 = 120;

const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RECEIPT_POLL: Duration = Duration::from_secs(1);

/// A write against the auction hook
#[derive(Debug, Clone, PartialEq)]
pub enum HookCall {
    SubmitBid {
        key: PoolKey,
        rent_per_block: U256,
        deposit: U256,
    },
    SetSwapFee {
        key: PoolKey,
        fee: u32,
    },
    WithdrawManagerFees {
        key: PoolKey,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    SubmitBid,
    SetSwapFee,
    WithdrawManagerFees,
}

impl HookCall {
    pub fn key(&self) -> &PoolKey {
        match self {
            HookCall::SubmitBid { key, .. }
            | HookCall::SetSwapFee { key, .. }
            | HookCall::WithdrawManagerFees { key } => key,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            HookCall::SubmitBid { .. } => OperationKind::SubmitBid,
            HookCall::SetSwapFee { .. } => OperationKind::SetSwapFee,
            HookCall::WithdrawManagerFees { .. } => OperationKind::WithdrawManagerFees,
        }
    }

    /// Ether attached to the call (the bid deposit)
    pub fn value(&self) -> U256 {
        match self {
            HookCall::SubmitBid { deposit, .. } => *deposit,
            _ => U256::ZERO,
        }
    }

    pub fn calldata(&self) -> Bytes {
        let encoded = match self {
            HookCall::SubmitBid {
                key, rent_per_block, ..
            } => IAuctionHook::submitBidCall {
                key: key.clone(),
                rentPerBlock: *rent_per_block,
            }
            .abi_encode(),
            HookCall::SetSwapFee { key, fee } => IAuctionHook::setSwapFeeCall {
                key: key.clone(),
                newFee: U24::from_limbs([*fee as u64]),
            }
            .abi_encode(),
            HookCall::WithdrawManagerFees { key } => {
                IAuctionHook::withdrawManagerFeesCall { key: key.clone() }.abi_encode()
            }
        };
        encoded.into()
    }

    fn label(&self) -> &'static str {
        match self {
            HookCall::SubmitBid { .. } => "submitBid",
            HookCall::SetSwapFee { .. } => "setSwapFee",
            HookCall::WithdrawManagerFees { .. } => "withdrawManagerFees",
        }
    }
}

/// Mined receipt, reduced to what the executor reports
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptInfo {
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub success: bool,
}

/// Ledger access needed by the executor
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn gas_price(&self) -> Result<u128, OperatorError>;

    /// Fails with `Rejected` when the call would revert
    async fn estimate_gas(&self, call: &HookCall) -> Result<u64, OperatorError>;

    async fn send(&self, call: &HookCall, gas_limit: u64, gas_price: u128) -> Result<TxHash, OperatorError>;

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptInfo>, OperatorError>;

    /// Whether the node still has the transaction (pending or mined)
    async fn is_known(&self, hash: TxHash) -> Result<bool, OperatorError>;

    async fn block_number(&self) -> Result<u64, OperatorError>;

    async fn balance(&self, address: Address) -> Result<U256, OperatorError>;

    async fn manager_fees(&self, manager: Address, pool_id: PoolId) -> Result<U256, OperatorError>;

    async fn pending_rent(&self, pool_id: PoolId, lp: Address) -> Result<U256, OperatorError>;

    async fn slot0(&self, pool_id: PoolId) -> Result<Slot0, OperatorError>;
}

/// `LedgerWriter` over an alloy provider with a wallet filler
pub struct HookLedger<P> {
    provider: Arc<P>,
    pool_manager: Address,
    hook: Address,
    from: Address,
}

impl<P: Provider + 'static> HookLedger<P> {
    pub fn new(provider: Arc<P>, pool_manager: Address, hook: Address, from: Address) -> Self {
        Self {
            provider,
            pool_manager,
            hook,
            from,
        }
    }

    fn request(&self, call: &HookCall) -> TransactionRequest {
        TransactionRequest {
            from: Some(self.from),
            to: Some(TxKind::Call(self.hook)),
            value: Some(call.value()),
            input: TransactionInput::new(call.calldata()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl<P: Provider + 'static> LedgerWriter for HookLedger<P> {
    async fn gas_price(&self) -> Result<u128, OperatorError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| OperatorError::from_rpc("getGasPrice", e))
    }

    async fn estimate_gas(&self, call: &HookCall) -> Result<u64, OperatorError> {
        self.provider
            .estimate_gas(self.request(call))
            .await
            .map_err(|e| OperatorError::from_rpc(&format!("estimate {}", call.label()), e))
    }

    async fn send(&self, call: &HookCall, gas_limit: u64, gas_price: u128) -> Result<TxHash, OperatorError> {
        let tx = TransactionRequest {
            gas: Some(gas_limit),
            gas_price: Some(gas_price),
            ..self.request(call)
        };
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| OperatorError::from_rpc(call.label(), e))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptInfo>, OperatorError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| OperatorError::from_rpc("getTransactionReceipt", e))?;

        Ok(receipt.map(|r| ReceiptInfo {
            block_number: r.block_number.unwrap_or_default(),
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
            success: r.status(),
        }))
    }

    async fn is_known(&self, hash: TxHash) -> Result<bool, OperatorError> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| OperatorError::from_rpc("getTransactionByHash", e))?;
        Ok(tx.is_some())
    }

    async fn block_number(&self) -> Result<u64, OperatorError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| OperatorError::from_rpc("getBlockNumber", e))
    }

    async fn balance(&self, address: Address) -> Result<U256, OperatorError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| OperatorError::from_rpc("getBalance", e))
    }

    async fn manager_fees(&self, manager: Address, pool_id: PoolId) -> Result<U256, OperatorError> {
        IAuctionHook::new(self.hook, self.provider.clone())
            .managerFees(manager, pool_id)
            .call()
            .await
            .map_err(|e| OperatorError::from_rpc("managerFees", e))
    }

    async fn pending_rent(&self, pool_id: PoolId, lp: Address) -> Result<U256, OperatorError> {
        IAuctionHook::new(self.hook, self.provider.clone())
            .getPendingRent(pool_id, lp)
            .call()
            .await
            .map_err(|e| OperatorError::from_rpc("getPendingRent", e))
    }

    async fn slot0(&self, pool_id: PoolId) -> Result<Slot0, OperatorError> {
        let slot0 = IPoolManager::new(self.pool_manager, self.provider.clone())
            .getSlot0(pool_id)
            .call()
            .await
            .map_err(|e| OperatorError::from_rpc("getSlot0", e))?;

        Ok(Slot0 {
            sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
            tick: tick_to_i32(slot0.tick, &pool_id)?,
            protocol_fee: slot0.protocolFee.to::<u32>(),
        })
    }
}

pub struct TransactionExecutor {
    ledger: Arc<dyn LedgerWriter>,
    gas_price_multiplier: f64,
    /// Bid deposit = rent × deposit_blocks
    deposit_blocks: u64,
    retry: RetryPolicy,
    confirmation_timeout: Duration,
    receipt_poll: Duration,
    /// Broadcast but not yet confirmed, per (pool, operation), with the request it carries
    outstanding: DashMap<(PoolId, OperationKind), (HookCall, TxHash)>,
}

impl TransactionExecutor {
    pub fn new(ledger: Arc<dyn LedgerWriter>, gas_price_multiplier: f64, deposit_blocks: u64) -> Self {
        Self {
            ledger,
            gas_price_multiplier,
            deposit_blocks,
            retry: RetryPolicy::writes(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            receipt_poll: DEFAULT_RECEIPT_POLL,
            outstanding: DashMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_confirmation(mut self, timeout: Duration, poll: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self.receipt_poll = poll;
        self
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Bid `rent_per_block`, attaching a deposit of rent × deposit blocks.
    pub async fn submit_bid(&self, key: &PoolKey, rent_per_block: U256) -> Result<TransactionOutcome, OperatorError> {
        let deposit = rent_per_block.saturating_mul(U256::from(self.deposit_blocks));
        info!(
            "Submitting bid for pool {}: rent={} deposit={}",
            pool_id(key),
            rent_per_block,
            deposit
        );
        self.execute(HookCall::SubmitBid {
            key: key.clone(),
            rent_per_block,
            deposit,
        })
        .await
    }

    pub async fn set_swap_fee(&self, key: &PoolKey, fee: u32) -> Result<TransactionOutcome, OperatorError> {
        if u64::from(fee) > FEE_DENOMINATOR {
            return Err(OperatorError::Validation(format!(
                "Swap fee {} exceeds {}",
                fee, FEE_DENOMINATOR
            )));
        }
        info!("Setting swap fee for pool {} to {}", pool_id(key), fee);
        self.execute(HookCall::SetSwapFee { key: key.clone(), fee }).await
    }

    pub async fn withdraw_manager_fees(&self, key: &PoolKey) -> Result<TransactionOutcome, OperatorError> {
        info!("Withdrawing manager fees for pool {}", pool_id(key));
        self.execute(HookCall::WithdrawManagerFees { key: key.clone() }).await
    }

    /// Submit-and-confirm under the write retry policy.
    pub async fn execute(&self, call: HookCall) -> Result<TransactionOutcome, OperatorError> {
        let slot = (pool_id(call.key()), call.kind());
        let call = &call;
        let outcome = self
            .retry
            .run(call.label(), |attempt| self.attempt(call, slot, attempt))
            .await?;

        match outcome.status {
            TxStatus::Success => info!(
                "{} confirmed: {} in block {} (gas used {})",
                call.label(),
                outcome.hash,
                outcome.block_number,
                outcome.gas_used
            ),
            TxStatus::Failed => warn!(
                "{} reverted: {} in block {}",
                call.label(),
                outcome.hash,
                outcome.block_number
            ),
        }
        Ok(outcome)
    }

    async fn attempt(
        &self,
        call: &HookCall,
        slot: (PoolId, OperationKind),
        attempt: u32,
    ) -> Result<TransactionOutcome, OperatorError> {
        let outstanding = self.outstanding.get(&slot).map(|entry| entry.value().clone());
        if let Some((previous, hash)) = outstanding {
            if previous != *call {
                // Its outcome belongs to the earlier request, never to this one
                self.settle_superseded(&previous, slot, hash).await?;
            } else {
                if let Some(receipt) = self.ledger.receipt(hash).await? {
                    self.clear(slot, hash);
                    return Ok(to_outcome(hash, receipt));
                }
                if self.ledger.is_known(hash).await? {
                    info!("{} attempt {}: resuming wait for {}", call.label(), attempt, hash);
                    return self.await_confirmation(slot, hash).await;
                }
                warn!("{} {} dropped by the node, resubmitting", call.label(), hash);
                self.clear(slot, hash);
            }
        }

        let gas_price = self.inflated_gas_price().await;
        let estimate = self.ledger.estimate_gas(call).await?;
        let gas_limit = estimate.saturating_mul(GAS_LIMIT_BUFFER_PCT) / 100;

        let hash = self.ledger.send(call, gas_limit, gas_price).await?;
        self.outstanding.insert(slot, (call.clone(), hash));
        info!(
            "{} sent: {} (gas limit {}, gas price {})",
            call.label(),
            hash,
            gas_limit,
            gas_price
        );

        self.await_confirmation(slot, hash).await
    }

    /// Wait out an earlier, different request in the same slot before a new
    /// broadcast. Errors if it is still pending after the confirmation window.
    async fn settle_superseded(
        &self,
        previous: &HookCall,
        slot: (PoolId, OperationKind),
        hash: TxHash,
    ) -> Result<(), OperatorError> {
        let outcome = match self.ledger.receipt(hash).await? {
            Some(receipt) => to_outcome(hash, receipt),
            None if self.ledger.is_known(hash).await? => {
                info!("{} {} still pending, waiting before the next request", previous.label(), hash);
                self.await_confirmation(slot, hash).await?
            }
            None => {
                warn!("{} {} dropped by the node, superseded", previous.label(), hash);
                self.clear(slot, hash);
                return Ok(());
            }
        };
        self.clear(slot, hash);
        info!(
            "Earlier {} settled: {} in block {} ({})",
            previous.label(),
            hash,
            outcome.block_number,
            outcome.status
        );
        Ok(())
    }

    async fn await_confirmation(
        &self,
        slot: (PoolId, OperationKind),
        hash: TxHash,
    ) -> Result<TransactionOutcome, OperatorError> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            if let Some(receipt) = self.ledger.receipt(hash).await? {
                self.clear(slot, hash);
                return Ok(to_outcome(hash, receipt));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(OperatorError::Confirmation {
                    hash: hash.to_string(),
                    reason: format!("no receipt after {:?}", self.confirmation_timeout),
                });
            }
            debug!("Waiting for receipt of {}", hash);
            tokio::time::sleep(self.receipt_poll.min(deadline - now)).await;
        }
    }

    /// Forget `hash` if it is still the one tracked for `slot`
    fn clear(&self, slot: (PoolId, OperationKind), hash: TxHash) {
        self.outstanding.remove_if(&slot, |_, (_, tracked)| *tracked == hash);
    }

    async fn inflated_gas_price(&self) -> u128 {
        let base = match self.ledger.gas_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!("Gas price unavailable ({}), using fallback", e);
                FALLBACK_GAS_PRICE
            }
        };
        apply_multiplier(base, self.gas_price_multiplier)
    }

    pub fn has_outstanding(&self, pool_id: PoolId, kind: OperationKind) -> bool {
        self.outstanding.contains_key(&(pool_id, kind))
    }

    // ── Reads (not retried) ──────────────────────────────────────────

    /// Node gas price as quoted, for decision thresholds
    pub async fn base_gas_price(&self) -> Result<u128, OperatorError> {
        self.ledger.gas_price().await
    }

    /// Current inflated gas price, as used for writes
    pub async fn gas_price(&self) -> Result<u128, OperatorError> {
        let base = self.ledger.gas_price().await?;
        Ok(apply_multiplier(base, self.gas_price_multiplier))
    }

    pub async fn block_number(&self) -> Result<u64, OperatorError> {
        self.ledger.block_number().await
    }

    pub async fn balance(&self, address: Address) -> Result<U256, OperatorError> {
        self.ledger.balance(address).await
    }

    pub async fn manager_fees(&self, manager: Address, pool_id: PoolId) -> Result<U256, OperatorError> {
        self.ledger.manager_fees(manager, pool_id).await
    }

    pub async fn pending_rent(&self, pool_id: PoolId, lp: Address) -> Result<U256, OperatorError> {
        self.ledger.pending_rent(pool_id, lp).await
    }

    pub async fn slot0(&self, pool_id: PoolId) -> Result<Slot0, OperatorError> {
        self.ledger.slot0(pool_id).await
    }
}

/// base × multiplier, with the multiplier truncated to two decimals
pub fn apply_multiplier(base: u128, multiplier: f64) -> u128 {
    let pct = (multiplier * 100.0).floor().max(0.0) as u128;
    base.saturating_mul(pct) / 100
}

fn to_outcome(hash: TxHash, receipt: ReceiptInfo) -> TransactionOutcome {
    TransactionOutcome {
        hash,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        status: if receipt.success {
            TxStatus::Success
        } else {
            TxStatus::Failed
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::make_pool_key;
    use alloy::primitives::B256;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const GWEI: u128 = 1_000_000_000;

    struct FakeLedger {
        gas_price: Option<u128>,
        estimate: Result<u64, OperatorError>,
        /// Receipt polls that return None before the receipt shows up
        pending_polls: AtomicU32,
        /// Receipt only exists once this many sends happened
        confirm_after_sends: usize,
        known: AtomicBool,
        success: bool,
        sends: Mutex<Vec<(HookCall, u64, u128)>>,
        estimates: AtomicUsize,
    }

    impl Default for FakeLedger {
        fn default() -> Self {
            Self {
                gas_price: Some(100 * GWEI),
                estimate: Ok(100_000),
                pending_polls: AtomicU32::new(0),
                confirm_after_sends: 1,
                known: AtomicBool::new(true),
                success: true,
                sends: Mutex::new(Vec::new()),
                estimates: AtomicUsize::new(0),
            }
        }
    }

    impl FakeLedger {
        fn send_count(&self) -> usize {
            self.sends.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LedgerWriter for FakeLedger {
        async fn gas_price(&self) -> Result<u128, OperatorError> {
            self.gas_price
                .ok_or_else(|| OperatorError::Rpc("eth_gasPrice unavailable".into()))
        }

        async fn estimate_gas(&self, _call: &HookCall) -> Result<u64, OperatorError> {
            self.estimates.fetch_add(1, Ordering::SeqCst);
            self.estimate.clone()
        }

        async fn send(&self, call: &HookCall, gas_limit: u64, gas_price: u128) -> Result<TxHash, OperatorError> {
            let mut sends = self.sends.lock().unwrap();
            sends.push((call.clone(), gas_limit, gas_price));
            Ok(B256::repeat_byte(sends.len() as u8))
        }

        async fn receipt(&self, _hash: TxHash) -> Result<Option<ReceiptInfo>, OperatorError> {
            if self.send_count() < self.confirm_after_sends {
                return Ok(None);
            }
            let remaining = self.pending_polls.load(Ordering::SeqCst);
            if remaining > 0 {
                self.pending_polls.store(remaining - 1, Ordering::SeqCst);
                return Ok(None);
            }
            Ok(Some(ReceiptInfo {
                block_number: 500,
                gas_used: 80_000,
                effective_gas_price: 120 * GWEI,
                success: self.success,
            }))
        }

        async fn is_known(&self, _hash: TxHash) -> Result<bool, OperatorError> {
            Ok(self.known.load(Ordering::SeqCst))
        }

        async fn block_number(&self) -> Result<u64, OperatorError> {
            Ok(500)
        }

        async fn balance(&self, _address: Address) -> Result<U256, OperatorError> {
            Ok(U256::from(5u64))
        }

        async fn manager_fees(&self, _manager: Address, _pool_id: PoolId) -> Result<U256, OperatorError> {
            Ok(U256::from(7u64))
        }

        async fn pending_rent(&self, _pool_id: PoolId, _lp: Address) -> Result<U256, OperatorError> {
            Ok(U256::ZERO)
        }

        async fn slot0(&self, _pool_id: PoolId) -> Result<Slot0, OperatorError> {
            Ok(Slot0 {
                sqrt_price_x96: U256::from(1u8) << 96,
                tick: 0,
                protocol_fee: 0,
            })
        }
    }

    fn key() -> PoolKey {
        make_pool_key(
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            3000,
            60,
            Address::repeat_byte(0x0f),
        )
        .unwrap()
    }

    fn executor(ledger: Arc<FakeLedger>) -> TransactionExecutor {
        TransactionExecutor::new(ledger, 1.2, 100)
            .with_confirmation(Duration::from_millis(20), Duration::from_millis(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_inflation_and_deposit() {
        let ledger = Arc::new(FakeLedger::default());
        let exec = executor(ledger.clone());

        let outcome = exec.submit_bid(&key(), U256::from(1_000u64)).await.unwrap();
        assert_eq!(outcome.status, TxStatus::Success);
        assert_eq!(outcome.block_number, 500);

        let sends = ledger.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        let (call, gas_limit, gas_price) = &sends[0];
        assert_eq!(*gas_limit, 120_000);
        assert_eq!(*gas_price, 120 * GWEI);
        assert_eq!(call.value(), U256::from(100_000u64));
        assert!(!exec.has_outstanding(pool_id(&key()), OperationKind::SubmitBid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_price_fallback() {
        let ledger = Arc::new(FakeLedger {
            gas_price: None,
            ..Default::default()
        });
        let exec = executor(ledger.clone());

        exec.withdraw_manager_fees(&key()).await.unwrap();
        let sends = ledger.sends.lock().unwrap();
        assert_eq!(sends[0].2, FALLBACK_GAS_PRICE * 12 / 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resumes_instead_of_resubmitting() {
        // Receipt shows up only after the first confirmation window expires
        let ledger = Arc::new(FakeLedger {
            pending_polls: AtomicU32::new(8),
            ..Default::default()
        });
        let exec = executor(ledger.clone());

        let outcome = exec.set_swap_fee(&key(), 4000).await.unwrap();
        assert_eq!(outcome.status, TxStatus::Success);
        assert_eq!(ledger.send_count(), 1);
        assert_eq!(ledger.estimates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_transaction_is_resubmitted() {
        // First broadcast never mines and the node forgets it
        let ledger = Arc::new(FakeLedger {
            confirm_after_sends: 2,
            known: AtomicBool::new(false),
            ..Default::default()
        });
        let exec = executor(ledger.clone());

        let outcome = exec.set_swap_fee(&key(), 4000).await.unwrap();
        assert_eq!(outcome.status, TxStatus::Success);
        assert_eq!(ledger.send_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_exhaustion() {
        let ledger = Arc::new(FakeLedger {
            pending_polls: AtomicU32::new(u32::MAX),
            ..Default::default()
        });
        let exec = executor(ledger.clone());

        let err = exec.withdraw_manager_fees(&key()).await.unwrap_err();
        assert!(matches!(err, OperatorError::Confirmation { .. }));
        assert_eq!(ledger.send_count(), 1);
        // Still tracked, so a later call resumes rather than rebroadcasts
        assert!(exec.has_outstanding(pool_id(&key()), OperationKind::WithdrawManagerFees));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_never_reports_earlier_outcome() {
        // First fee's receipt shows up only after its confirmation window
        let ledger = Arc::new(FakeLedger {
            pending_polls: AtomicU32::new(7),
            ..Default::default()
        });
        let exec = executor(ledger.clone()).with_retry(RetryPolicy::new(1, Duration::ZERO));

        let err = exec.set_swap_fee(&key(), 4000).await.unwrap_err();
        assert!(matches!(err, OperatorError::Confirmation { .. }));
        assert!(exec.has_outstanding(pool_id(&key()), OperationKind::SetSwapFee));

        let outcome = exec.set_swap_fee(&key(), 5000).await.unwrap();
        let fees: Vec<u32> = ledger
            .sends
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _, _)| match call {
                HookCall::SetSwapFee { fee, .. } => *fee,
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(fees, vec![4000, 5000]);
        assert_eq!(outcome.hash, B256::repeat_byte(2));
        assert!(!exec.has_outstanding(pool_id(&key()), OperationKind::SetSwapFee));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_waits_while_earlier_pending() {
        let ledger = Arc::new(FakeLedger {
            pending_polls: AtomicU32::new(u32::MAX),
            ..Default::default()
        });
        let exec = executor(ledger.clone()).with_retry(RetryPolicy::new(1, Duration::ZERO));

        assert!(exec.set_swap_fee(&key(), 4000).await.is_err());
        let err = exec.set_swap_fee(&key(), 5000).await.unwrap_err();
        match err {
            OperatorError::Confirmation { hash, .. } => assert_eq!(hash, B256::repeat_byte(1).to_string()),
            other => panic!("unexpected error {:?}", other),
        }
        // Nothing broadcast for the second fee while the first is in flight
        assert_eq!(ledger.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_receipt_is_failed_outcome() {
        let ledger = Arc::new(FakeLedger {
            success: false,
            ..Default::default()
        });
        let exec = executor(ledger.clone());

        let outcome = exec.set_swap_fee(&key(), 4000).await.unwrap();
        assert_eq!(outcome.status, TxStatus::Failed);
        assert_eq!(ledger.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_revert_not_retried() {
        let ledger = Arc::new(FakeLedger {
            estimate: Err(OperatorError::Rejected("execution reverted: NotManager".into())),
            ..Default::default()
        });
        let exec = executor(ledger.clone());

        let err = exec.set_swap_fee(&key(), 4000).await.unwrap_err();
        assert!(matches!(err, OperatorError::Rejected(_)));
        assert_eq!(ledger.estimates.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.send_count(), 0);
    }

    #[tokio::test]
    async fn test_fee_out_of_range_rejected_locally() {
        let ledger = Arc::new(FakeLedger::default());
        let exec = executor(ledger.clone());
        let err = exec.set_swap_fee(&key(), 1_000_001).await.unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));
        assert_eq!(ledger.send_count(), 0);
    }

    #[tokio::test]
    async fn test_reads_pass_through() {
        let exec = executor(Arc::new(FakeLedger::default()));
        assert_eq!(exec.gas_price().await.unwrap(), 120 * GWEI);
        assert_eq!(exec.base_gas_price().await.unwrap(), 100 * GWEI);
        assert_eq!(exec.block_number().await.unwrap(), 500);
        assert_eq!(
            exec.manager_fees(Address::ZERO, B256::ZERO).await.unwrap(),
            U256::from(7u64)
        );
        assert_eq!(exec.slot0(B256::ZERO).await.unwrap().tick, 0);
    }

    #[test]
    fn test_apply_multiplier() {
        assert_eq!(apply_multiplier(100, 1.2), 120);
        assert_eq!(apply_multiplier(1_000, 1.005), 1_000);
        assert_eq!(apply_multiplier(1_000, 1.5), 1_500);
    }

    #[test]
    fn test_calldata_selectors() {
        let call = HookCall::SetSwapFee { key: key(), fee: 3000 };
        assert_eq!(&call.calldata()[..4], IAuctionHook::setSwapFeeCall::SELECTOR.as_slice());
        assert_eq!(call.value(), U256::ZERO);
        assert_eq!(call.kind(), OperationKind::SetSwapFee);
    }
}
