//! Bolus delivery progress driver
//!
//! After the patch accepts an immediate bolus it reports the expected total
//! delivery time; this driver paces step-wise progress events over that
//! window. Cancellation is cooperative: a shared flag is checked before each
//! step, so the one in-flight device round trip is never interrupted
//! mid-flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pumplink_core::{BolusProgress, DoseEventKind};

use crate::events::DoseLedger;
use crate::protocol::PatchService;
use crate::store::PatchRecord;

pub struct BolusProgressDriver {
    service: PatchService,
    ledger: Arc<DoseLedger>,
    record: Arc<RwLock<PatchRecord>>,
    progress_tx: broadcast::Sender<BolusProgress>,
    step_units: f64,
    finish_budget: Duration,
    active: Mutex<Option<ActiveBolus>>,
}

struct ActiveBolus {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BolusProgressDriver {
    pub fn new(
        service: PatchService,
        ledger: Arc<DoseLedger>,
        record: Arc<RwLock<PatchRecord>>,
        progress_tx: broadcast::Sender<BolusProgress>,
        step_units: f64,
        finish_budget: Duration,
    ) -> Self {
        Self {
            service,
            ledger,
            record,
            progress_tx,
            step_units,
            finish_budget,
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BolusProgress> {
        self.progress_tx.subscribe()
    }

    /// Whether a bolus is currently being paced out
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|active| !active.handle.is_finished() && !active.stop.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Start pacing a bolus the patch just accepted
    pub fn begin(&self, volume: f64, expect_secs: u32) {
        let stop = Arc::new(AtomicBool::new(false));
        let total_steps = ((volume / self.step_units).ceil() as u32).max(1);
        let step_delay =
            Duration::from_millis(u64::from(expect_secs) * 1000 / u64::from(total_steps));

        let task = BolusTask {
            service: self.service.clone(),
            ledger: Arc::clone(&self.ledger),
            record: Arc::clone(&self.record),
            progress_tx: self.progress_tx.clone(),
            stop: Arc::clone(&stop),
            volume,
            step_units: self.step_units,
            total_steps,
            step_delay,
            finish_budget: self.finish_budget,
        };
        let handle = tokio::spawn(task.run());
        *self.active.lock() = Some(ActiveBolus { stop, handle });
    }

    /// Cooperatively halt the running bolus after a confirmed cancel,
    /// surfacing the device-reported infused amount.
    pub fn halt(&self, infused: f64) {
        if let Some(active) = self.active.lock().take() {
            active.stop.store(true, Ordering::SeqCst);
        }
        let _ = self.progress_tx.send(BolusProgress::Stopped { infused });
    }
}

struct BolusTask {
    service: PatchService,
    ledger: Arc<DoseLedger>,
    record: Arc<RwLock<PatchRecord>>,
    progress_tx: broadcast::Sender<BolusProgress>,
    stop: Arc<AtomicBool>,
    volume: f64,
    step_units: f64,
    total_steps: u32,
    step_delay: Duration,
    finish_budget: Duration,
}

impl BolusTask {
    async fn run(self) {
        debug!(
            volume = self.volume,
            steps = self.total_steps,
            delay = ?self.step_delay,
            "bolus progress started"
        );

        for step in 0..=self.total_steps {
            if self.stop.load(Ordering::SeqCst) {
                debug!(step, "bolus progress halted");
                return;
            }

            if step == self.total_steps {
                let _ = self.progress_tx.send(BolusProgress::Completed {
                    delivered: self.volume,
                });
                let serial = self.record.read().identity.manufacture_number.clone();
                self.ledger.emit(
                    &serial,
                    DoseEventKind::BolusDelivered {
                        amount: self.volume,
                    },
                );
                // The dose is already in; a failed confirmation is only logged.
                if let Err(e) = self.service.finish_bolus(self.finish_budget).await {
                    warn!(error = %e, "finish-bolus confirmation failed");
                }
            } else {
                tokio::time::sleep(self.step_delay).await;
                // Re-check after the wait: a stop during the sleep must not
                // leak one more progress event.
                if self.stop.load(Ordering::SeqCst) {
                    debug!(step, "bolus progress halted");
                    return;
                }
                let delivered = (f64::from(step) * self.step_units).min(self.volume);
                let percent = ((delivered / self.volume) * 100.0).min(100.0) as u8;
                let _ = self
                    .progress_tx
                    .send(BolusProgress::Delivering { delivered, percent });
            }
        }
    }
}
