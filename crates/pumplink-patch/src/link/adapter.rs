//! Link transport capability and event types

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::LinkError;

/// Peripheral link event, as reported by the wireless driver.
///
/// The stream is infinite and restartable: subscribing yields events from the
/// point of subscription onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Pairing-level trust establishment started
    Bonding,
    /// Bond with the patch is in place
    Bonded,
    /// The physical link came up
    Connected,
    /// Service discovery finished
    Discovered,
    /// The physical link went down
    Disconnected,
    /// The bond record was cleared on the adapter side
    BondCleared,
    /// Bonding failed outside the normal retry path
    BondingFailed,
    /// The patch rebooted and lost its session state
    Reinitialized,
}

/// Adapter power event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterEvent {
    On,
    Off,
    TurningOn,
    TurningOff,
}

/// Capability exposed by the wireless driver for the one paired patch.
///
/// The driver issues at most one connect → discover → enable-notifications
/// sequence at a time against this interface.
#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Initiate a connection to the peripheral at `address`
    async fn connect(&self, address: &str) -> Result<(), LinkError>;

    /// Discover the peripheral's services after the link is up
    async fn discover_services(&self, address: &str) -> Result<(), LinkError>;

    /// Enable notifications on the given characteristic
    async fn enable_notifications(
        &self,
        address: &str,
        characteristic: Uuid,
    ) -> Result<(), LinkError>;

    /// Hand the connected peripheral's info to the host stack.
    /// Called once each time the link reaches ready.
    async fn register_peripheral_info(&self, address: &str) -> Result<(), LinkError>;

    /// Subscribe to link state events
    fn link_events(&self) -> broadcast::Receiver<LinkEvent>;

    /// Subscribe to adapter power events
    fn adapter_events(&self) -> broadcast::Receiver<AdapterEvent>;

    /// Whether the wireless adapter is currently enabled
    fn is_adapter_enabled(&self) -> bool;
}
