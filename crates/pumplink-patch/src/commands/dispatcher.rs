//! Command dispatcher: dosing operations against the connected patch

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use pumplink_core::{
    BasalProfile, DoseEventKind, EnactResult, ExtendedBolusInfusion, PumpError, TempBasalInfusion,
    TempBasalSpec,
};

use super::{CommandCategory, CommandKind};
use crate::bolus::BolusProgressDriver;
use crate::config::TimeoutConfig;
use crate::events::DoseLedger;
use crate::protocol::{PatchService, ProtocolRequest};
use crate::state::{LinkState, PatchState, StateProjection};
use crate::store::{PatchRecord, PatchStore};

/// Hint shown to the user when an immediate bolus start times out
const BOLUS_TIMEOUT_HINT: &str =
    "No response from the patch. Check that it is in range and connected.";

/// Executes dosing operations: one request, one response or timeout, per
/// call.
///
/// Preconditions (adapter enabled, patch connected and booted) are re-checked
/// here; failing them resolves to a quiet not-enacted result. The dispatcher
/// is the single writer of the patch record (identity + snapshot), mutating
/// it only on confirmed responses, and emits exactly one dose event per
/// confirmed dosing action. Per-category mutual exclusion rejects conflicting
/// concurrent requests outright — ambiguous double-dosing is worse than a
/// refused call.
pub struct CommandDispatcher {
    service: PatchService,
    projection: Arc<StateProjection>,
    record: Arc<RwLock<PatchRecord>>,
    store: Arc<PatchStore>,
    ledger: Arc<DoseLedger>,
    progress: Arc<BolusProgressDriver>,
    timeouts: TimeoutConfig,
    in_flight: Mutex<HashSet<CommandCategory>>,
    last_data_time: Arc<RwLock<DateTime<Utc>>>,
}

/// Releases the category slot when the dispatch cycle ends
struct CategoryGuard<'a> {
    in_flight: &'a Mutex<HashSet<CommandCategory>>,
    category: CommandCategory,
}

impl Drop for CategoryGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.category);
    }
}

impl CommandDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: PatchService,
        projection: Arc<StateProjection>,
        record: Arc<RwLock<PatchRecord>>,
        store: Arc<PatchStore>,
        ledger: Arc<DoseLedger>,
        progress: Arc<BolusProgressDriver>,
        timeouts: TimeoutConfig,
        last_data_time: Arc<RwLock<DateTime<Utc>>>,
    ) -> Self {
        Self {
            service,
            projection,
            record,
            store,
            ledger,
            progress,
            timeouts,
            in_flight: Mutex::new(HashSet::new()),
            last_data_time,
        }
    }

    /// Whether any command category has a request in flight
    pub fn is_busy(&self) -> bool {
        !self.in_flight.lock().is_empty()
    }

    // =========================================================================
    // Immediate bolus
    // =========================================================================

    pub async fn start_immediate_bolus(&self, volume: f64) -> EnactResult {
        if let Err(result) = self.preconditions("start_immediate_bolus") {
            return result;
        }
        if self.progress.is_active() {
            warn!("bolus rejected, delivery already in progress");
            return EnactResult::not_enacted().with_comment("A bolus is already being delivered");
        }
        let spec = CommandKind::StartBolus.spec(&self.timeouts);
        let guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        let action_seq = self.record.read().identity.bolus_action_seq + 1;
        match self
            .service
            .start_bolus(action_seq, volume, spec.timeout)
            .await
        {
            Ok(expect_secs) => {
                drop(guard);
                self.record.write().identity.bolus_action_seq = action_seq;
                self.persist();
                self.mark_seen();
                info!(volume, expect_secs, action_seq, "bolus accepted");
                self.progress.begin(volume, expect_secs);
                EnactResult::enacted().with_delivered(volume)
            }
            Err(e) => self.failure("start_immediate_bolus", e, spec.timeout_hint),
        }
    }

    /// Stop the bolus in progress. The patch reports the actually-infused
    /// amount, which is what gets surfaced and synchronized — not the
    /// requested volume.
    pub async fn stop_bolus(&self) -> EnactResult {
        if !self.progress.is_active() {
            debug!("stop requested with no bolus in progress");
            return EnactResult::not_enacted().with_comment(PumpError::NoActiveBolus.to_string());
        }
        let spec = CommandKind::CancelBolus.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self.service.cancel_bolus(spec.timeout).await {
            Ok(infused_amount) => {
                self.progress.halt(infused_amount);
                self.mark_seen();
                self.emit(DoseEventKind::BolusStopped { infused_amount });
                info!(infused_amount, "bolus stopped");
                EnactResult::enacted().with_delivered(infused_amount)
            }
            Err(e) => self.failure("stop_bolus", e, false),
        }
    }

    // =========================================================================
    // Temporary basal
    // =========================================================================

    pub async fn start_temp_basal(&self, temp: TempBasalSpec) -> EnactResult {
        if let Err(result) = self.preconditions("start_temp_basal") {
            return result;
        }
        let spec = CommandKind::StartTempBasal.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self
            .service
            .start_temp_basal(temp.rate, temp.duration_minutes, spec.timeout)
            .await
        {
            Ok(()) => {
                self.record.write().snapshot.temp_basal = Some(TempBasalInfusion {
                    rate: temp.rate,
                    duration_minutes: temp.duration_minutes,
                    started_at: Utc::now(),
                });
                self.persist();
                self.mark_seen();
                self.emit(DoseEventKind::TempBasalStarted {
                    rate: temp.rate,
                    duration_minutes: temp.duration_minutes,
                });
                info!(rate = ?temp.rate, duration_minutes = temp.duration_minutes, "temp basal started");
                let mut result = EnactResult::enacted();
                result.rate = Some(temp.rate);
                result.duration_minutes = Some(temp.duration_minutes);
                result
            }
            Err(e) => self.failure("start_temp_basal", e, false),
        }
    }

    pub async fn cancel_temp_basal(&self) -> EnactResult {
        if let Err(result) = self.preconditions("cancel_temp_basal") {
            return result;
        }
        let spec = CommandKind::CancelTempBasal.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self.service.cancel_temp_basal(spec.timeout).await {
            Ok(()) => {
                self.record.write().snapshot.temp_basal = None;
                self.persist();
                self.mark_seen();
                self.emit(DoseEventKind::TempBasalStopped);
                info!("temp basal cancelled");
                let mut result = EnactResult::enacted();
                result.temp_cancel = true;
                result
            }
            Err(e) => self.failure("cancel_temp_basal", e, false),
        }
    }

    // =========================================================================
    // Extended bolus
    // =========================================================================

    pub async fn start_extended_bolus(&self, volume: f64, duration_minutes: u32) -> EnactResult {
        if let Err(result) = self.preconditions("start_extended_bolus") {
            return result;
        }
        let spec = CommandKind::StartExtendedBolus.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self
            .service
            .start_extended_bolus(volume, duration_minutes, spec.timeout)
            .await
        {
            Ok(()) => {
                self.record.write().snapshot.extended_bolus = Some(ExtendedBolusInfusion {
                    volume,
                    duration_minutes,
                    started_at: Utc::now(),
                });
                self.persist();
                self.mark_seen();
                self.emit(DoseEventKind::ExtendedBolusStarted {
                    amount: volume,
                    duration_minutes,
                });
                info!(volume, duration_minutes, "extended bolus started");
                let mut result = EnactResult::enacted();
                result.duration_minutes = Some(duration_minutes);
                result
            }
            Err(e) => self.failure("start_extended_bolus", e, false),
        }
    }

    pub async fn cancel_extended_bolus(&self) -> EnactResult {
        if let Err(result) = self.preconditions("cancel_extended_bolus") {
            return result;
        }
        let spec = CommandKind::CancelExtendedBolus.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self.service.cancel_extended_bolus(spec.timeout).await {
            Ok(()) => {
                self.record.write().snapshot.extended_bolus = None;
                self.persist();
                self.mark_seen();
                self.emit(DoseEventKind::ExtendedBolusStopped);
                info!("extended bolus cancelled");
                let mut result = EnactResult::enacted();
                result.temp_cancel = true;
                result
            }
            Err(e) => self.failure("cancel_extended_bolus", e, false),
        }
    }

    // =========================================================================
    // Basal program
    // =========================================================================

    /// Send a new basal program.
    ///
    /// Any active extended bolus and temp basal are cancelled first through
    /// their own operations; if either cancellation fails, the update is
    /// abandoned and the cancel's failure is returned — partial state is
    /// never sent.
    pub async fn update_basal_program(&self, profile: &BasalProfile) -> EnactResult {
        if let Err(result) = self.preconditions("update_basal_program") {
            return result;
        }
        let spec = CommandKind::UpdateBasalProgram.spec(&self.timeouts);

        if spec.cancel_active_first {
            if self.record.read().snapshot.extended_bolus.is_some() {
                let cancel = self.cancel_extended_bolus().await;
                if !cancel.success {
                    warn!("basal program update abandoned, extended bolus cancel failed");
                    return cancel;
                }
            }
            if self.record.read().snapshot.temp_basal.is_some() {
                let cancel = self.cancel_temp_basal().await;
                if !cancel.success {
                    warn!("basal program update abandoned, temp basal cancel failed");
                    return cancel;
                }
            }
        }

        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self.service.update_basal_program(profile, spec.timeout).await {
            Ok(()) => {
                self.mark_seen();
                info!("basal program updated");
                EnactResult::enacted()
            }
            Err(e) => self.failure("update_basal_program", e, false),
        }
    }

    // =========================================================================
    // Status and settings
    // =========================================================================

    /// Query the patch for its infusion state. Gated on link readiness (not
    /// the full boot precondition — this query is what establishes boot).
    pub async fn refresh_status(&self) -> EnactResult {
        if !self.projection.is_adapter_enabled() {
            debug!("status query skipped, adapter disabled");
            return EnactResult::not_enacted();
        }
        if self.projection.link_status().state != LinkState::Ready {
            debug!("status query skipped, link not ready");
            return EnactResult::not_enacted();
        }
        let spec = CommandKind::QueryStatus.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self.service.query_infusion_info(spec.timeout).await {
            Ok(payload) => {
                {
                    let mut record = self.record.write();
                    record.snapshot = payload.snapshot;
                    record.identity.insulin_remaining = payload.insulin_remaining;
                    record.booted = payload.booted;
                }
                if payload.booted {
                    self.projection.acknowledge_boot();
                }
                self.persist();
                self.mark_seen();
                debug!(
                    insulin_remaining = payload.insulin_remaining,
                    booted = payload.booted,
                    "infusion state refreshed"
                );
                EnactResult {
                    success: true,
                    ..Default::default()
                }
            }
            Err(e) => self.failure("refresh_status", e, false),
        }
    }

    /// Fire one user-setting update; all settings share the ack-only shape
    /// and the settings budget.
    pub async fn apply_setting(
        &self,
        operation: &'static str,
        request: ProtocolRequest,
    ) -> EnactResult {
        if let Err(result) = self.preconditions(operation) {
            return result;
        }
        let spec = CommandKind::Setting.spec(&self.timeouts);
        let _guard = match self.claim(spec.category) {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        match self.service.apply_setting(request, spec.timeout).await {
            Ok(()) => {
                self.mark_seen();
                debug!(operation, "setting applied");
                EnactResult::enacted()
            }
            Err(e) => self.failure(operation, e, false),
        }
    }

    // =========================================================================
    // Shared plumbing
    // =========================================================================

    fn preconditions(&self, operation: &str) -> Result<(), EnactResult> {
        if !self.projection.is_adapter_enabled() {
            debug!(operation, "adapter disabled, command not sent");
            return Err(EnactResult::not_enacted());
        }
        let state = self.projection.patch_state();
        if state != PatchState::ConnectedBooted {
            debug!(operation, ?state, "patch not connected, command not sent");
            return Err(EnactResult::not_enacted());
        }
        Ok(())
    }

    fn claim(&self, category: CommandCategory) -> Result<CategoryGuard<'_>, EnactResult> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(category) {
            warn!(%category, "command rejected, same category already in flight");
            return Err(EnactResult::not_enacted()
                .with_comment(PumpError::Busy(category.to_string()).to_string()));
        }
        Ok(CategoryGuard {
            in_flight: &self.in_flight,
            category,
        })
    }

    fn failure(&self, operation: &str, error: PumpError, timeout_hint: bool) -> EnactResult {
        error!(operation, error = %error, "command failed");
        let result = EnactResult::not_enacted();
        if timeout_hint && matches!(error, PumpError::ProtocolTimeout { .. }) {
            result.with_comment(BOLUS_TIMEOUT_HINT)
        } else {
            result
        }
    }

    fn emit(&self, kind: DoseEventKind) {
        let serial = self.record.read().identity.manufacture_number.clone();
        self.ledger.emit(&serial, kind);
    }

    fn persist(&self) {
        let record = self.record.read().clone();
        if let Err(e) = self.store.save(&record) {
            warn!(error = %e, "failed to persist patch record");
        }
    }

    fn mark_seen(&self) {
        *self.last_data_time.write() = Utc::now();
    }
}
