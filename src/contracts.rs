//! Centralized Contract Definitions
//!
//! Solidity interfaces the operator reads from and writes to, defined with
//! alloy's `sol!` macro. `#[sol(rpc)]` generates contract instance types that
//! make calls through any alloy Provider.
//!
//! - IPoolManager:    v4-style singleton pool manager (slot0, liquidity)
//! - IAuctionHook:    rent-auction hook (auction state, bids, fee control)
//! - IServiceManager: operator registration / staking / performance proofs
//!
//! Created: 2026-02-03

use alloy::sol;

// ── Pool manager ─────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IPoolManager {
        function getSlot0(bytes32 poolId) external view returns (uint160 sqrtPriceX96, int24 tick, uint24 protocolFee);
        function getLiquidity(bytes32 poolId) external view returns (uint128 liquidity);
    }
}

// ── Auction hook ─────────────────────────────────────────────────────

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct PoolKey {
        address currency0;
        address currency1;
        uint24 fee;
        int24 tickSpacing;
        address hooks;
    }

    #[sol(rpc)]
    interface IAuctionHook {
        function poolAuctions(bytes32 poolId) external view returns (address currentManager, uint256 rentPerBlock, uint256 managerDeposit, uint256 lastRentBlock, uint256 totalRentCollected, uint24 currentFee);
        function nextBid(bytes32 poolId) external view returns (address bidder, uint256 rentPerBlock, uint256 deposit, uint256 activationBlock, uint256 timestamp);
        function managerFees(address manager, bytes32 poolId) external view returns (uint256 fees);
        function getPendingRent(bytes32 poolId, address lp) external view returns (uint256 rent);

        function submitBid(PoolKey key, uint256 rentPerBlock) external payable;
        function setSwapFee(PoolKey key, uint24 newFee) external;
        function withdrawManagerFees(PoolKey key) external;
    }
}

// ── Service manager (registration) ───────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IServiceManager {
        function registerOperator() external payable;
        function deregisterOperator() external;
        function increaseStake() external payable;
        function submitPerformanceProof(uint256 taskId, uint256 feeOptimizations, uint256 revenueGenerated, uint256 gasUsed, bytes32 proofHash) external;
        function operators(address operator) external view returns (bool isRegistered, uint256 stakedAmount, uint256 registrationBlock, uint256 totalTasksCompleted, uint256 totalTasksFailed, uint256 lastPerformanceUpdate, bool isSlashed);
        function getOperatorPerformanceScore(address operator) external view returns (uint256 score);
        function isOperatorRegistered(address operator) external view returns (bool registered);
    }
}
