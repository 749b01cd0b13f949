//! PatchPump: the driver facade
//!
//! Wires the store, state projection, connection manager, command dispatcher,
//! and bolus progress driver together, and implements the host-facing
//! [`Pump`] trait. Reconnection is event-driven: a watch task observes the
//! patch-state projection and starts the reconnect sequence whenever the
//! patch is known alive but the link is down.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pumplink_core::{
    BasalProfile, BolusProgress, DoseEvent, EnactResult, Pump, TempBasalSpec,
};

use crate::bolus::BolusProgressDriver;
use crate::commands::CommandDispatcher;
use crate::config::PatchDriverConfig;
use crate::events::DoseLedger;
use crate::link::LinkTransport;
use crate::protocol::{PatchService, ProtocolCodec, ProtocolRequest};
use crate::session::{ConnectionManager, ReconnectPhase};
use crate::state::{LinkState, PatchState, StateProjection};
use crate::store::{PatchRecord, PatchStore};

/// One paired patch pump
pub struct PatchPump {
    projection: Arc<StateProjection>,
    connection: Arc<ConnectionManager>,
    dispatcher: CommandDispatcher,
    progress: Arc<BolusProgressDriver>,
    ledger: Arc<DoseLedger>,
    record: Arc<RwLock<PatchRecord>>,
    profile: RwLock<Option<BasalProfile>>,
    last_data_time: Arc<RwLock<DateTime<Utc>>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl PatchPump {
    /// Build a driver over the injected transport and codec capabilities.
    ///
    /// Loads the persisted pairing record; if the patch was known booted in a
    /// prior session, the projection starts at disconnected-booted and the
    /// first reconnect fires immediately.
    pub fn new(
        config: PatchDriverConfig,
        transport: Arc<dyn LinkTransport>,
        codec: Arc<dyn ProtocolCodec>,
    ) -> Arc<Self> {
        let store = Arc::new(PatchStore::new(config.store_path.clone()));
        let record = Arc::new(RwLock::new(store.load()));

        let projection = Arc::new(StateProjection::new());
        projection.set_adapter_enabled(transport.is_adapter_enabled());
        if record.read().booted {
            projection.acknowledge_boot();
        }

        let connection = ConnectionManager::new(
            Arc::clone(&transport),
            Arc::clone(&projection),
            config.reconnect.clone(),
        );

        let service = PatchService::new(codec);
        let ledger = Arc::new(DoseLedger::new(256));
        let (progress_tx, _) = broadcast::channel(256);
        let progress = Arc::new(BolusProgressDriver::new(
            service.clone(),
            Arc::clone(&ledger),
            Arc::clone(&record),
            progress_tx,
            config.bolus.step_units,
            config.timeouts.finish_bolus(),
        ));
        let last_data_time = Arc::new(RwLock::new(Utc::now()));
        let dispatcher = CommandDispatcher::new(
            service,
            Arc::clone(&projection),
            Arc::clone(&record),
            store,
            Arc::clone(&ledger),
            Arc::clone(&progress),
            config.timeouts.clone(),
            Arc::clone(&last_data_time),
        );

        let pump = Arc::new(Self {
            projection,
            connection,
            dispatcher,
            progress,
            ledger,
            record,
            profile: RwLock::new(None),
            last_data_time,
            watch_task: Mutex::new(None),
        });
        pump.start_reconnect_watch();
        pump
    }

    /// Current derived patch state
    pub fn patch_state(&self) -> PatchState {
        self.projection.patch_state()
    }

    /// Subscribe to patch state changes (published on change only)
    pub fn subscribe_patch_state(&self) -> watch::Receiver<PatchState> {
        self.projection.subscribe()
    }

    /// Phase of the reconnect sequence, for diagnostics
    pub fn reconnect_phase(&self) -> ReconnectPhase {
        self.connection.phase()
    }

    /// Host hook: the host decided a connection is needed. Only acts while
    /// the patch is known alive but disconnected.
    pub fn connect(&self, reason: &str) {
        debug!(reason, "connect requested");
        if self.projection.patch_state() == PatchState::DisconnectedBooted {
            self.trigger_reconnect(reason);
        }
    }

    /// Host hook: disconnects are driven by the link itself, not the host
    pub fn disconnect(&self, reason: &str) {
        debug!(reason, state = ?self.projection.patch_state(), "disconnect requested");
    }

    // =========================================================================
    // User settings
    // =========================================================================

    pub async fn set_max_bolus_dose(&self, units: f64) -> EnactResult {
        self.dispatcher
            .apply_setting("set_max_bolus_dose", ProtocolRequest::SetMaxBolusDose { units })
            .await
    }

    pub async fn set_low_insulin_notice(&self, units: u32) -> EnactResult {
        if units == 0 {
            // Reminder disabled; nothing to push to the patch
            return EnactResult {
                success: true,
                ..Default::default()
            };
        }
        self.dispatcher
            .apply_setting(
                "set_low_insulin_notice",
                ProtocolRequest::SetLowInsulinNotice { units },
            )
            .await
    }

    pub async fn set_expiration_reminder(&self, hours: u32) -> EnactResult {
        self.dispatcher
            .apply_setting(
                "set_expiration_reminder",
                ProtocolRequest::SetExpirationReminder { hours },
            )
            .await
    }

    pub async fn set_buzzer(&self, enabled: bool) -> EnactResult {
        self.dispatcher
            .apply_setting("set_buzzer", ProtocolRequest::SetBuzzer { enabled })
            .await
    }

    /// Push the host's UTC offset to the patch, carrying the last reported
    /// reservoir level as the protocol requires
    pub async fn update_time_zone(&self, utc_offset_minutes: i32) -> EnactResult {
        let insulin_remaining = self.record.read().identity.insulin_remaining.max(0.0) as u32;
        self.dispatcher
            .apply_setting(
                "update_time_zone",
                ProtocolRequest::SetTimeZone {
                    utc_offset_minutes,
                    insulin_remaining,
                },
            )
            .await
    }

    pub async fn clear_user_settings(&self) -> EnactResult {
        self.dispatcher
            .apply_setting("clear_user_settings", ProtocolRequest::ClearUserSettings)
            .await
    }

    /// Best-effort teardown: clear user settings on the patch and stop the
    /// driver's background tasks
    pub async fn shutdown(&self) {
        info!("patch driver shutting down");
        let _ = self.clear_user_settings().await;
        self.connection.abort_sequence();
        if let Some(handle) = self.watch_task.lock().take() {
            handle.abort();
        }
    }

    // =========================================================================
    // Reconnect trigger
    // =========================================================================

    fn start_reconnect_watch(self: &Arc<Self>) {
        let mut rx = self.projection.subscribe();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let state = *rx.borrow_and_update();
                if state == PatchState::DisconnectedBooted {
                    match weak.upgrade() {
                        Some(pump) => pump.trigger_reconnect("patch alive, link down"),
                        None => break,
                    }
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        *self.watch_task.lock() = Some(handle);
    }

    fn trigger_reconnect(&self, reason: &str) {
        let address = self.record.read().identity.address.clone();
        if address.is_empty() {
            debug!("no paired patch, reconnect skipped");
            return;
        }
        info!(reason, %address, "connection needed");
        self.connection.start_reconnect(&address);
    }
}

#[async_trait]
impl Pump for PatchPump {
    async fn start_immediate_bolus(&self, volume: f64) -> EnactResult {
        self.dispatcher.start_immediate_bolus(volume).await
    }

    async fn stop_bolus(&self) -> EnactResult {
        self.dispatcher.stop_bolus().await
    }

    async fn start_temp_basal(&self, spec: TempBasalSpec) -> EnactResult {
        self.dispatcher.start_temp_basal(spec).await
    }

    async fn cancel_temp_basal(&self) -> EnactResult {
        self.dispatcher.cancel_temp_basal().await
    }

    async fn start_extended_bolus(&self, volume: f64, duration_minutes: u32) -> EnactResult {
        self.dispatcher
            .start_extended_bolus(volume, duration_minutes)
            .await
    }

    async fn cancel_extended_bolus(&self) -> EnactResult {
        self.dispatcher.cancel_extended_bolus().await
    }

    async fn update_basal_program(&self, profile: &BasalProfile) -> EnactResult {
        match self.projection.patch_state() {
            PatchState::ConnectedBooted => {
                let result = self.dispatcher.update_basal_program(profile).await;
                if result.enacted {
                    *self.profile.write() = Some(profile.clone());
                }
                result
            }
            PatchState::DisconnectedNotBooted => {
                // No active patch; keep the program locally for the next
                // activation.
                *self.profile.write() = Some(profile.clone());
                info!("no active patch, basal program stored locally");
                EnactResult::enacted()
            }
            _ => EnactResult::not_enacted(),
        }
    }

    async fn refresh_status(&self) -> EnactResult {
        self.dispatcher.refresh_status().await
    }

    fn is_connected(&self) -> bool {
        self.projection.link_status().state == LinkState::Ready
    }

    fn is_suspended(&self) -> bool {
        self.projection.patch_state() == PatchState::DisconnectedBooted
    }

    fn is_busy(&self) -> bool {
        self.dispatcher.is_busy()
    }

    /// A reachable patch reports "now"; a patch that is alive but out of
    /// reach triggers reconnection and reports the last confirmed contact.
    fn last_data_time(&self) -> DateTime<Utc> {
        match self.projection.patch_state() {
            PatchState::ConnectedBooted | PatchState::DisconnectedNotBooted => Utc::now(),
            PatchState::DisconnectedBooted => {
                self.trigger_reconnect("stale data time");
                *self.last_data_time.read()
            }
            PatchState::Unknown => *self.last_data_time.read(),
        }
    }

    fn serial_number(&self) -> String {
        self.record.read().identity.manufacture_number.clone()
    }

    fn reservoir_level(&self) -> f64 {
        self.record.read().identity.insulin_remaining
    }

    fn base_basal_rate(&self) -> f64 {
        let hour = Local::now().hour();
        self.profile
            .read()
            .as_ref()
            .map(|profile| profile.rate_at_hour(hour))
            .unwrap_or(0.0)
    }

    fn is_profile_set(&self, profile: &BasalProfile) -> bool {
        self.profile.read().as_ref() == Some(profile)
    }

    fn subscribe_progress(&self) -> broadcast::Receiver<BolusProgress> {
        self.progress.subscribe()
    }

    fn subscribe_dose_events(&self) -> broadcast::Receiver<DoseEvent> {
        self.ledger.subscribe()
    }
}

impl Drop for PatchPump {
    fn drop(&mut self) {
        if let Some(handle) = self.watch_task.lock().take() {
            handle.abort();
        }
    }
}
