//! Pool Monitor
//!
//! Continuous, deduplicated observation of pool + auction + market state.
//!
//! One poll loop per pool writes the latest snapshot into a `watch` cell.
//! Every subscriber to that pool shares the loop: a new subscriber reads the
//! cell immediately (replay-one), then waits for changes. The loop stops and
//! releases the cell once the last subscriber is dropped.
//!
//! Per tick:
//!   1. Read pool state and auction state concurrently, each under the read
//!      retry policy
//!   2. Either read failing → publish the error, keep polling
//!   3. Same `last_update_block` as the last published snapshot → skip
//!   4. Otherwise derive market data (mutating this pool's history) and publish
//!
//! Created: 2026-02-03

use super::market::{MarketAssumptions, MarketDataCalculator};
use super::reader::StateReader;
use crate::error::OperatorError;
use crate::retry::RetryPolicy;
use crate::types::{AuctionState, PoolId, PoolState, Snapshot};
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type Observation = Option<Result<Snapshot, OperatorError>>;
type Feed = Arc<watch::Sender<Observation>>;

pub struct PoolMonitor {
    reader: Arc<dyn StateReader>,
    market: MarketAssumptions,
    poll_interval: Duration,
    retry: RetryPolicy,
    feeds: Arc<DashMap<PoolId, Feed>>,
}

impl PoolMonitor {
    pub fn new(reader: Arc<dyn StateReader>, market: MarketAssumptions, poll_interval: Duration) -> Self {
        Self {
            reader,
            market,
            poll_interval,
            retry: RetryPolicy::reads(),
            feeds: Arc::new(DashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Subscribe to a pool. Starts its poll loop if no one else is watching.
    /// Must be called from within a tokio runtime.
    pub fn observe(&self, pool_id: PoolId) -> PoolSubscription {
        // The entry guard holds the shard lock, so a loop tearing itself
        // down cannot race with a new subscriber.
        let rx = match self.feeds.entry(pool_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().subscribe(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                let tx = Arc::new(tx);
                entry.insert(tx.clone());

                info!("Starting monitor for pool {} every {:?}", pool_id, self.poll_interval);
                tokio::spawn(poll_loop(PollLoop {
                    pool_id,
                    reader: self.reader.clone(),
                    calculator: MarketDataCalculator::new(self.market.clone()),
                    poll_interval: self.poll_interval,
                    retry: self.retry,
                    tx,
                    feeds: self.feeds.clone(),
                }));
                rx
            }
        };

        PoolSubscription {
            pool_id,
            rx,
            primed: false,
            last_block: None,
        }
    }

    /// Pools with a running poll loop
    pub fn active_pools(&self) -> usize {
        self.feeds.len()
    }
}

struct PollLoop {
    pool_id: PoolId,
    reader: Arc<dyn StateReader>,
    calculator: MarketDataCalculator,
    poll_interval: Duration,
    retry: RetryPolicy,
    tx: Feed,
    feeds: Arc<DashMap<PoolId, Feed>>,
}

async fn poll_loop(mut ctx: PollLoop) {
    let mut ticker = tokio::time::interval(ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_block: Option<u64> = None;

    loop {
        tokio::select! {
            _ = ctx.tx.closed() => {
                let tx = &ctx.tx;
                let removed = ctx
                    .feeds
                    .remove_if(&ctx.pool_id, |_, feed| Arc::ptr_eq(feed, tx) && feed.receiver_count() == 0);
                if removed.is_some() {
                    info!("Stopped monitor for pool {} (no subscribers)", ctx.pool_id);
                    return;
                }
                // A subscriber arrived between the close and the teardown
            }
            _ = ticker.tick() => {
                match read_states(&ctx).await {
                    Ok((pool_state, auction_state)) => {
                        let block = pool_state.last_update_block;
                        if last_block == Some(block) {
                            debug!("Pool {} unchanged at block {}", ctx.pool_id, block);
                            continue;
                        }
                        last_block = Some(block);

                        let market_data = ctx.calculator.update(&pool_state, Utc::now().timestamp_millis());
                        ctx.tx.send_replace(Some(Ok(Snapshot {
                            pool_state,
                            auction_state,
                            market_data,
                        })));
                    }
                    Err(e) => {
                        warn!("Poll failed for pool {}: {}", ctx.pool_id, e);
                        ctx.tx.send_replace(Some(Err(e)));
                    }
                }
            }
        }
    }
}

async fn read_states(ctx: &PollLoop) -> Result<(PoolState, AuctionState), OperatorError> {
    let reader = &*ctx.reader;
    let pool_id = &ctx.pool_id;

    let (pool_state, auction_state) = tokio::join!(
        ctx.retry.run("read pool state", move |_| reader.pool_state(pool_id)),
        ctx.retry.run("read auction state", move |_| reader.auction_state(pool_id)),
    );
    Ok((pool_state?, auction_state?))
}

/// One subscriber's view of a pool. Never yields a snapshot with a
/// `last_update_block` at or below one it already yielded.
pub struct PoolSubscription {
    pool_id: PoolId,
    rx: watch::Receiver<Observation>,
    primed: bool,
    last_block: Option<u64>,
}

impl PoolSubscription {
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Wait for the next observation. The first call returns the cached
    /// latest value if there is one. `None` once the poll loop is gone.
    pub async fn next(&mut self) -> Option<Result<Snapshot, OperatorError>> {
        loop {
            if self.primed {
                if self.rx.changed().await.is_err() {
                    return None;
                }
            } else {
                self.primed = true;
            }

            let observation = self.rx.borrow_and_update().clone();
            if let Some(item) = observation.and_then(|o| self.accept(o)) {
                return Some(item);
            }
        }
    }

    fn accept(&mut self, observation: Result<Snapshot, OperatorError>) -> Option<Result<Snapshot, OperatorError>> {
        match observation {
            Ok(snapshot) => {
                let block = snapshot.pool_state.last_update_block;
                if self.last_block.is_some_and(|seen| block <= seen) {
                    return None;
                }
                self.last_block = Some(block);
                Some(Ok(snapshot))
            }
            Err(e) => Some(Err(e)),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Snapshot, OperatorError>> {
        stream::unfold(self, |mut sub| async move { sub.next().await.map(|item| (item, sub)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, U256};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Default)]
    struct FakeReader {
        block: AtomicU64,
        failing: AtomicBool,
        pool_calls: AtomicU32,
    }

    #[async_trait]
    impl StateReader for FakeReader {
        async fn pool_state(&self, pool_id: &PoolId) -> Result<PoolState, OperatorError> {
            self.pool_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(OperatorError::Rpc("node unavailable".into()));
            }
            Ok(PoolState {
                pool_id: *pool_id,
                token0: Address::repeat_byte(0x01),
                token1: Address::repeat_byte(0x02),
                current_manager: None,
                rent_per_block: U256::ZERO,
                swap_fee: 3000,
                liquidity: 1_000_000,
                sqrt_price_x96: U256::from(1u8) << 96,
                tick: 0,
                last_update_block: self.block.load(Ordering::SeqCst),
            })
        }

        async fn auction_state(&self, _pool_id: &PoolId) -> Result<AuctionState, OperatorError> {
            Ok(AuctionState {
                current_manager: None,
                current_rent: U256::ZERO,
                next_bidder: None,
                next_rent: U256::ZERO,
                activation_block: 0,
                manager_deposit: U256::ZERO,
            })
        }
    }

    fn setup(block: u64) -> (Arc<FakeReader>, PoolMonitor) {
        let reader = Arc::new(FakeReader::default());
        reader.block.store(block, Ordering::SeqCst);
        let monitor = PoolMonitor::new(reader.clone(), MarketAssumptions::default(), TICK);
        (reader, monitor)
    }

    fn pool() -> PoolId {
        B256::repeat_byte(0x42)
    }

    #[tokio::test]
    async fn test_emits_first_snapshot() {
        let (_reader, monitor) = setup(100);
        let mut sub = monitor.observe(pool());

        let snapshot = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(snapshot.pool_state.last_update_block, 100);
        assert_eq!(snapshot.market_data.pool_id, pool());
    }

    #[tokio::test]
    async fn test_same_block_is_deduplicated() {
        let (reader, monitor) = setup(100);
        let mut sub = monitor.observe(pool());
        timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();

        // Several ticks at the same block: nothing new
        assert!(timeout(TICK * 10, sub.next()).await.is_err());

        reader.block.store(101, Ordering::SeqCst);
        let snapshot = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(snapshot.pool_state.last_update_block, 101);
    }

    #[tokio::test]
    async fn test_failure_is_emitted_and_polling_continues() {
        let (reader, monitor) = setup(100);
        reader.failing.store(true, Ordering::SeqCst);
        let mut sub = monitor.observe(pool());

        let item = timeout(WAIT, sub.next()).await.unwrap().unwrap();
        assert_eq!(item, Err(OperatorError::Rpc("node unavailable".into())));
        // Retried before being reported
        assert!(reader.pool_calls.load(Ordering::SeqCst) >= 3);

        reader.failing.store(false, Ordering::SeqCst);
        // Errors published before recovery may still be in flight
        let snapshot = timeout(WAIT, async {
            loop {
                if let Some(Ok(snapshot)) = sub.next().await {
                    return snapshot;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(snapshot.pool_state.last_update_block, 100);
    }

    #[tokio::test]
    async fn test_subscribers_share_loop_and_replay_latest() {
        let (_reader, monitor) = setup(100);
        let mut first = monitor.observe(pool());
        timeout(WAIT, first.next()).await.unwrap().unwrap().unwrap();

        let mut second = monitor.observe(pool());
        assert_eq!(monitor.active_pools(), 1);

        // Late subscriber gets the cached value without waiting for a new block
        let snapshot = timeout(TICK * 5, second.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(snapshot.pool_state.last_update_block, 100);
    }

    #[tokio::test]
    async fn test_loop_stops_when_last_subscriber_drops() {
        let (reader, monitor) = setup(100);
        let a = monitor.observe(pool());
        let b = monitor.observe(pool());
        assert_eq!(monitor.active_pools(), 1);

        drop(a);
        drop(b);

        let stopped = timeout(WAIT, async {
            while monitor.active_pools() > 0 {
                tokio::time::sleep(TICK).await;
            }
        })
        .await;
        assert!(stopped.is_ok());

        let calls = reader.pool_calls.load(Ordering::SeqCst);
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(reader.pool_calls.load(Ordering::SeqCst), calls);

        // Re-subscribing starts a fresh loop
        let mut c = monitor.observe(pool());
        assert!(timeout(WAIT, c.next()).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stream_is_monotonic() {
        let (reader, monitor) = setup(1);
        let stream = monitor.observe(pool()).into_stream();
        tokio::pin!(stream);

        let bumper = {
            let reader = reader.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    tokio::time::sleep(TICK * 2).await;
                    reader.block.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let mut last = 0;
        for _ in 0..3 {
            let snapshot = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
            assert!(snapshot.pool_state.last_update_block > last);
            last = snapshot.pool_state.last_update_block;
        }
        bumper.await.unwrap();
    }
}
