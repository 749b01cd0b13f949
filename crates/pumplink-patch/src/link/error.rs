//! Link transport errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LinkError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Service discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Enabling notifications failed: {0}")]
    NotifyFailed(String),

    #[error("Adapter is disabled")]
    AdapterDisabled,

    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(String),
}
