//! Operator error taxonomy
//!
//! Every fallible operation in the operator returns `Result<_, OperatorError>`.
//! The variant decides whether a retry policy may re-run the operation:
//! only `Rpc` and `Confirmation` are transient.
//!
//! Created: 2026-02-03

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    /// Malformed or inconsistent configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Degenerate input that no amount of retrying will fix (e.g. zero liquidity)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// RPC timeout, node error, nonce/gas race
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Transaction was broadcast but its receipt has not been observed yet
    #[error("Transaction {hash} not confirmed: {reason}")]
    Confirmation { hash: String, reason: String },

    /// The ledger refused the call before broadcast (gas estimation reverted)
    #[error("Ledger rejected call: {0}")]
    Rejected(String),

    #[error("No valid strategies produced results")]
    AllStrategiesFailed,
}

impl OperatorError {
    /// Transient errors may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, OperatorError::Rpc(_) | OperatorError::Confirmation { .. })
    }

    /// Classify an RPC/contract error string. Execution reverts are not transient.
    pub fn from_rpc<E: std::fmt::Display>(context: &str, err: E) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("revert") || lower.contains("execution reverted") {
            OperatorError::Rejected(format!("{}: {}", context, msg))
        } else {
            OperatorError::Rpc(format!("{}: {}", context, msg))
        }
    }
}
