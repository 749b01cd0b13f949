//! Connection manager: reconnect sequencing and link monitoring

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use pumplink_core::{PumpError, PumpResult};

use super::ReconnectPhase;
use crate::config::ReconnectConfig;
use crate::link::{AdapterEvent, LinkEvent, LinkTransport};
use crate::state::{LinkState, StateProjection};

/// Drives the link to the paired patch.
///
/// Two responsibilities, both writing link state through the projection (the
/// single-writer rule for LinkState):
///
/// - a persistent monitor task that folds link and adapter events into the
///   projection while no sequence is running;
/// - the reconnect sequence itself, one abortable task at a time, bounded by
///   an overall budget. Aborting tears down the sequence's event subscription
///   and is safe from any state. The manager never self-retries: a later
///   patch-state recurrence is what re-triggers it.
pub struct ConnectionManager {
    transport: Arc<dyn LinkTransport>,
    projection: Arc<StateProjection>,
    config: ReconnectConfig,
    phase: RwLock<ReconnectPhase>,
    sequence: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn LinkTransport>,
        projection: Arc<StateProjection>,
        config: ReconnectConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            transport,
            projection,
            config,
            phase: RwLock::new(ReconnectPhase::Idle),
            sequence: Mutex::new(None),
            monitor: Mutex::new(None),
        });
        manager.start_monitor();
        manager
    }

    pub fn phase(&self) -> ReconnectPhase {
        *self.phase.read()
    }

    fn set_phase(&self, phase: ReconnectPhase) {
        *self.phase.write() = phase;
    }

    /// Whether a reconnect sequence is currently running
    pub fn is_sequence_active(&self) -> bool {
        self.sequence
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start (or restart) the reconnect sequence.
    ///
    /// Re-entrant: any prior sequence is aborted and its subscriptions
    /// dropped first, so at most one sequence runs at a time. No-op while the
    /// adapter is disabled; the caller retries on a later adapter event.
    pub fn start_reconnect(self: &Arc<Self>, address: &str) {
        self.abort_sequence();

        if !self.projection.is_adapter_enabled() {
            debug!("adapter disabled, reconnect skipped");
            return;
        }

        self.set_phase(ReconnectPhase::Connecting);
        let manager = Arc::clone(self);
        let address = address.to_string();
        let handle = tokio::spawn(async move {
            manager.run_sequence(address).await;
        });
        *self.sequence.lock() = Some(handle);
    }

    /// Abort the running sequence, if any. Idempotent, safe from any state.
    pub fn abort_sequence(&self) {
        if let Some(handle) = self.sequence.lock().take() {
            if !handle.is_finished() {
                debug!("aborting reconnect sequence");
            }
            handle.abort();
        }
    }

    async fn run_sequence(self: Arc<Self>, address: String) {
        info!(%address, "reconnect sequence started");
        let budget = self.config.sequence_timeout();
        match timeout(budget, self.drive_sequence(&address)).await {
            Ok(Ok(())) => info!(%address, "link ready"),
            Ok(Err(e)) => {
                warn!(%address, error = %e, "reconnect sequence aborted");
                self.fail();
            }
            Err(_) => {
                warn!(%address, ?budget, "reconnect sequence timed out");
                self.fail();
            }
        }
    }

    async fn drive_sequence(&self, address: &str) -> PumpResult<()> {
        // Subscribe before connecting so no event between the connect call
        // and the first recv is lost.
        let mut events = self.transport.link_events();

        self.transport
            .connect(address)
            .await
            .map_err(|e| PumpError::DeviceUnreachable(e.to_string()))?;

        loop {
            let event = events
                .recv()
                .await
                .map_err(|e| PumpError::Internal(format!("link event stream: {e}")))?;

            match event {
                LinkEvent::Bonding => self.projection.set_link_state(LinkState::Bonding),
                LinkEvent::Bonded => {
                    self.projection.set_bonded(true);
                    self.projection.set_link_state(LinkState::Bonded);
                }
                LinkEvent::Connected => {
                    self.set_phase(ReconnectPhase::Discovering);
                    self.projection.set_link_state(LinkState::Discovering);
                    self.transport
                        .discover_services(address)
                        .await
                        .map_err(|e| PumpError::DeviceUnreachable(e.to_string()))?;
                }
                LinkEvent::Discovered => {
                    self.projection.set_link_state(LinkState::Discovered);
                    self.set_phase(ReconnectPhase::EnablingNotifications);
                    self.projection.set_link_state(LinkState::NotifyEnabling);
                    self.transport
                        .enable_notifications(address, self.config.notify_characteristic)
                        .await
                        .map_err(|e| PumpError::DeviceUnreachable(e.to_string()))?;

                    self.projection.set_link_state(LinkState::Ready);
                    self.set_phase(ReconnectPhase::Ready);
                    if let Err(e) = self.transport.register_peripheral_info(address).await {
                        warn!(%address, error = %e, "peripheral registration failed");
                    }
                    return Ok(());
                }
                LinkEvent::BondCleared => {
                    return Err(PumpError::SequenceAbnormal("bond cleared".into()))
                }
                LinkEvent::BondingFailed => {
                    return Err(PumpError::SequenceAbnormal("abnormal bonding failure".into()))
                }
                LinkEvent::Reinitialized => {
                    return Err(PumpError::SequenceAbnormal("patch reinitialized".into()))
                }
                // Mid-sequence drop; the overall budget bounds the wait
                LinkEvent::Disconnected => {}
            }
        }
    }

    /// Failure is silent beyond diagnostics: link state falls back to
    /// Disconnected and the projection carries the news.
    fn fail(&self) {
        self.set_phase(ReconnectPhase::Failed);
        self.projection.set_link_state(LinkState::Disconnected);
    }

    /// Fold link and adapter events into the projection between sequences
    fn start_monitor(self: &Arc<Self>) {
        let mut link_rx = self.transport.link_events();
        let mut adapter_rx = self.transport.adapter_events();
        let projection = Arc::clone(&self.projection);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = link_rx.recv() => match event {
                        Ok(LinkEvent::Disconnected) => {
                            projection.set_link_state(LinkState::Disconnected);
                        }
                        Ok(LinkEvent::Bonded) => projection.set_bonded(true),
                        Ok(LinkEvent::BondCleared) => projection.set_bonded(false),
                        Ok(LinkEvent::Reinitialized) => {
                            // The patch lost its session state; it is no
                            // longer known to be booted.
                            projection.clear_boot_acknowledgement();
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "link event monitor lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = adapter_rx.recv() => match event {
                        Ok(AdapterEvent::On) => projection.set_adapter_enabled(true),
                        Ok(AdapterEvent::Off) => projection.set_adapter_enabled(false),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "adapter event monitor lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("link monitor ended");
        });

        *self.monitor.lock() = Some(handle);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sequence.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
    }
}
