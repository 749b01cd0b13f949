//! Pump trait - the host-facing surface of a patch driver

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::models::{BasalProfile, BolusProgress, DoseEvent, EnactResult, TempBasalSpec};

/// Host-facing contract of one paired patch pump.
///
/// Every dosing operation resolves synchronously into an [`EnactResult`];
/// a failed command is never auto-retried — repeat dosing requires a new
/// host action. Connectivity is observable through the query methods, and
/// the two broadcast streams carry bolus progress (for the UI) and confirmed
/// dose events (for the host ledger).
#[async_trait]
pub trait Pump: Send + Sync {
    /// Deliver a one-time bolus promptly. On acceptance the driver paces
    /// delivery progress on the progress stream until completion or stop.
    async fn start_immediate_bolus(&self, volume: f64) -> EnactResult;

    /// Stop the bolus in progress. The result carries the device-reported
    /// infused amount, which may be less than requested.
    async fn stop_bolus(&self) -> EnactResult;

    /// Override the basal rate for a bounded duration
    async fn start_temp_basal(&self, spec: TempBasalSpec) -> EnactResult;

    async fn cancel_temp_basal(&self) -> EnactResult;

    /// Deliver a bolus gradually over the given duration
    async fn start_extended_bolus(&self, volume: f64, duration_minutes: u32) -> EnactResult;

    async fn cancel_extended_bolus(&self) -> EnactResult;

    /// Send a new basal program. Any active extended bolus or temp basal is
    /// cancelled first; if a cancellation fails the update is abandoned.
    async fn update_basal_program(&self, profile: &BasalProfile) -> EnactResult;

    /// Query the patch for its current infusion state, refreshing the local
    /// snapshot and the boot acknowledgement.
    async fn refresh_status(&self) -> EnactResult;

    /// Whether the wireless link to the patch is up
    fn is_connected(&self) -> bool;

    /// Whether the patch is known alive but the link is down
    fn is_suspended(&self) -> bool;

    /// Whether any command is currently in flight
    fn is_busy(&self) -> bool;

    /// When the driver last heard from the patch
    fn last_data_time(&self) -> DateTime<Utc>;

    /// Pump serial (manufacture number) of the paired patch
    fn serial_number(&self) -> String;

    /// Last reported reservoir level, in units
    fn reservoir_level(&self) -> f64;

    /// Programmed basal rate for the current hour, in units/hour
    fn base_basal_rate(&self) -> f64;

    /// Whether the given program matches the one the driver last sent
    fn is_profile_set(&self, profile: &BasalProfile) -> bool;

    /// Bolus delivery progress stream for the UI
    fn subscribe_progress(&self) -> broadcast::Receiver<BolusProgress>;

    /// Confirmed dose events for the host ledger
    fn subscribe_dose_events(&self) -> broadcast::Receiver<DoseEvent>;
}
