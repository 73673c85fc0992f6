//! Ledger State Reader
//!
//! Fetches raw pool and auction facts for a pool identifier.
//!
//! `HookStateReader` reads from the pool manager (slot0, liquidity) and the
//! auction hook (poolAuctions, nextBid). Independent calls for one pool fire
//! concurrently via `tokio::join!`. Token addresses are not on the read
//! surface; they come from the configured pool key.
//!
//! Created: 2026-02-03

use crate::contracts::{IAuctionHook, IPoolManager, PoolKey};
use crate::error::OperatorError;
use crate::types::{non_zero, pool_id, tick_to_i32, AuctionState, PoolId, PoolState};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Raw ledger reads for one pool. Implementations must be cheap to call
/// repeatedly; the monitor calls both methods on every tick.
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn pool_state(&self, pool_id: &PoolId) -> Result<PoolState, OperatorError>;

    async fn auction_state(&self, pool_id: &PoolId) -> Result<AuctionState, OperatorError>;
}

/// Reads pool state through an alloy provider
pub struct HookStateReader<P> {
    provider: Arc<P>,
    pool_manager: Address,
    hook: Address,
    /// Known pools, keyed by their derived identifier
    pools: HashMap<PoolId, PoolKey>,
}

impl<P: Provider + 'static> HookStateReader<P> {
    pub fn new(provider: Arc<P>, pool_manager: Address, hook: Address, pools: &[PoolKey]) -> Self {
        let pools = pools.iter().map(|key| (pool_id(key), key.clone())).collect();
        Self {
            provider,
            pool_manager,
            hook,
            pools,
        }
    }

    pub fn pool_key(&self, pool_id: &PoolId) -> Option<&PoolKey> {
        self.pools.get(pool_id)
    }

    fn known_key(&self, pool_id: &PoolId) -> Result<&PoolKey, OperatorError> {
        self.pool_key(pool_id)
            .ok_or_else(|| OperatorError::Validation(format!("Unknown pool {}", pool_id)))
    }
}

#[async_trait]
impl<P: Provider + 'static> StateReader for HookStateReader<P> {
    async fn pool_state(&self, pool_id: &PoolId) -> Result<PoolState, OperatorError> {
        let key = self.known_key(pool_id)?;

        let manager = IPoolManager::new(self.pool_manager, self.provider.clone());
        let hook = IAuctionHook::new(self.hook, self.provider.clone());

        let slot0_call = manager.getSlot0(*pool_id);
        let liq_call = manager.getLiquidity(*pool_id);
        let auction_call = hook.poolAuctions(*pool_id);
        let (slot0_res, liq_res, auction_res, block_res) = tokio::join!(
            slot0_call.call(),
            liq_call.call(),
            auction_call.call(),
            self.provider.get_block_number()
        );

        let slot0 = slot0_res.map_err(|e| OperatorError::from_rpc("getSlot0", e))?;
        let liquidity = liq_res.map_err(|e| OperatorError::from_rpc("getLiquidity", e))?;
        let auction = auction_res.map_err(|e| OperatorError::from_rpc("poolAuctions", e))?;
        let block = block_res.map_err(|e| OperatorError::from_rpc("getBlockNumber", e))?;

        let tick = tick_to_i32(slot0.tick, pool_id)?;

        debug!(
            "Read pool {} at block {}: tick={} liquidity={} fee={}",
            pool_id, block, tick, liquidity, auction.currentFee
        );

        Ok(PoolState {
            pool_id: *pool_id,
            token0: key.currency0,
            token1: key.currency1,
            current_manager: non_zero(auction.currentManager),
            rent_per_block: auction.rentPerBlock,
            swap_fee: auction.currentFee.to::<u32>(),
            liquidity,
            sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
            tick,
            last_update_block: block,
        })
    }

    async fn auction_state(&self, pool_id: &PoolId) -> Result<AuctionState, OperatorError> {
        self.known_key(pool_id)?;

        let hook = IAuctionHook::new(self.hook, self.provider.clone());
        let auction_call = hook.poolAuctions(*pool_id);
        let next_call = hook.nextBid(*pool_id);
        let (auction_res, next_res) = tokio::join!(auction_call.call(), next_call.call());

        let auction = auction_res.map_err(|e| OperatorError::from_rpc("poolAuctions", e))?;
        let next = next_res.map_err(|e| OperatorError::from_rpc("nextBid", e))?;

        Ok(AuctionState {
            current_manager: non_zero(auction.currentManager),
            current_rent: auction.rentPerBlock,
            next_bidder: non_zero(next.bidder),
            next_rent: next.rentPerBlock,
            activation_block: next.activationBlock.saturating_to::<u64>(),
            manager_deposit: auction.managerDeposit,
        })
    }
}
