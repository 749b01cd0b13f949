//! Common error types for pump drivers

use std::time::Duration;

use thiserror::Error;

/// Result type for pump driver operations
pub type PumpResult<T> = Result<T, PumpError>;

/// Errors that can occur while driving a patch pump.
///
/// Dosing operations never propagate these across the host boundary; the
/// dispatcher resolves them into an [`EnactResult`](crate::models::EnactResult)
/// synchronously. They surface directly only from queries and the store.
#[derive(Debug, Error, Clone)]
pub enum PumpError {
    /// The wireless adapter is disabled; nothing was sent
    #[error("Wireless adapter is disabled")]
    LinkUnavailable,

    /// No connected session with the patch
    #[error("Patch is not reachable: {0}")]
    DeviceUnreachable(String),

    /// No response from the patch within the operation's budget
    #[error("No response from patch within {budget:?}")]
    ProtocolTimeout { budget: Duration },

    /// The patch explicitly rejected the request
    #[error("Patch rejected the request: {0}")]
    ProtocolError(String),

    /// The link sequence hit an abnormal condition (bond cleared,
    /// abnormal bonding failure, patch reinitialized)
    #[error("Link sequence aborted: {0}")]
    SequenceAbnormal(String),

    /// A request of the same category is already in flight
    #[error("A {0} command is already in flight")]
    Busy(String),

    /// Stop was requested with no bolus in progress
    #[error("No bolus in progress")]
    NoActiveBolus,

    /// Persisted device record could not be read or written
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PumpError {
    /// Whether this error means the command never reached the patch
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PumpError::LinkUnavailable | PumpError::DeviceUnreachable(_) | PumpError::Busy(_)
        )
    }
}
