//! Mock link transport for testing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{AdapterEvent, LinkError, LinkEvent, LinkTransport};

/// Transport call observed by the mock, for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(String),
    DiscoverServices(String),
    EnableNotifications(String, Uuid),
    RegisterPeripheralInfo(String),
}

/// Mock link transport.
///
/// By default each transport call succeeds and emits the link event a real
/// driver would produce (`connect` → `Connected`, `discover_services` →
/// `Discovered`). Auto-emission can be switched off per stage to script
/// stalls, and arbitrary events can be injected at any time.
pub struct MockLinkTransport {
    adapter_enabled: AtomicBool,
    emit_connected: AtomicBool,
    emit_discovered: AtomicBool,
    fail_connect: AtomicBool,
    fail_notifications: AtomicBool,
    link_tx: broadcast::Sender<LinkEvent>,
    adapter_tx: broadcast::Sender<AdapterEvent>,
    calls: Mutex<Vec<TransportCall>>,
    registrations: AtomicUsize,
}

impl MockLinkTransport {
    pub fn new() -> Self {
        let (link_tx, _) = broadcast::channel(64);
        let (adapter_tx, _) = broadcast::channel(16);
        Self {
            adapter_enabled: AtomicBool::new(true),
            emit_connected: AtomicBool::new(true),
            emit_discovered: AtomicBool::new(true),
            fail_connect: AtomicBool::new(false),
            fail_notifications: AtomicBool::new(false),
            link_tx,
            adapter_tx,
            calls: Mutex::new(Vec::new()),
            registrations: AtomicUsize::new(0),
        }
    }

    /// Inject a link event (simulates the wireless driver reporting state)
    pub fn emit_link(&self, event: LinkEvent) {
        let _ = self.link_tx.send(event);
    }

    /// Flip adapter power and emit the matching event
    pub fn set_adapter_enabled(&self, enabled: bool) {
        self.adapter_enabled.store(enabled, Ordering::SeqCst);
        let _ = self.adapter_tx.send(if enabled {
            AdapterEvent::On
        } else {
            AdapterEvent::Off
        });
    }

    /// Stop auto-emitting `Connected` after `connect` (scripts a stall)
    pub fn suppress_connected_event(&self) {
        self.emit_connected.store(false, Ordering::SeqCst);
    }

    /// Stop auto-emitting `Discovered` after `discover_services`
    pub fn suppress_discovered_event(&self) {
        self.emit_discovered.store(false, Ordering::SeqCst);
    }

    pub fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_notifications(&self) {
        self.fail_notifications.store(true, Ordering::SeqCst);
    }

    /// Every transport call observed so far, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// How many times peripheral info was registered with the host
    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

impl Default for MockLinkTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkTransport for MockLinkTransport {
    async fn connect(&self, address: &str) -> Result<(), LinkError> {
        self.record(TransportCall::Connect(address.to_string()));
        if self.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(LinkError::ConnectFailed("mock connect failure".into()));
        }
        if self.emit_connected.load(Ordering::SeqCst) {
            self.emit_link(LinkEvent::Bonded);
            self.emit_link(LinkEvent::Connected);
        }
        Ok(())
    }

    async fn discover_services(&self, address: &str) -> Result<(), LinkError> {
        self.record(TransportCall::DiscoverServices(address.to_string()));
        if self.emit_discovered.load(Ordering::SeqCst) {
            self.emit_link(LinkEvent::Discovered);
        }
        Ok(())
    }

    async fn enable_notifications(
        &self,
        address: &str,
        characteristic: Uuid,
    ) -> Result<(), LinkError> {
        self.record(TransportCall::EnableNotifications(
            address.to_string(),
            characteristic,
        ));
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(LinkError::NotifyFailed("mock notify failure".into()));
        }
        Ok(())
    }

    async fn register_peripheral_info(&self, address: &str) -> Result<(), LinkError> {
        self.record(TransportCall::RegisterPeripheralInfo(address.to_string()));
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.link_tx.subscribe()
    }

    fn adapter_events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.adapter_tx.subscribe()
    }

    fn is_adapter_enabled(&self) -> bool {
        self.adapter_enabled.load(Ordering::SeqCst)
    }
}
