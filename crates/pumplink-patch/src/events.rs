//! Dose event emission
//!
//! One [`DoseEvent`] per confirmed start/stop of a dosing action, pushed to
//! the synchronization sink (a broadcast channel the host ledger subscribes
//! to). Ids are host-generated and strictly monotonic.

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use pumplink_core::{DoseEvent, DoseEventKind};

pub struct DoseLedger {
    tx: broadcast::Sender<DoseEvent>,
    last_id: Mutex<u64>,
}

impl DoseLedger {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            last_id: Mutex::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DoseEvent> {
        self.tx.subscribe()
    }

    /// Emit one event. Ids are the current wall-clock milliseconds, bumped
    /// past the previous id when two emissions land in the same millisecond.
    pub fn emit(&self, serial: &str, kind: DoseEventKind) -> DoseEvent {
        let timestamp = Utc::now();
        let id = {
            let mut last = self.last_id.lock();
            let candidate = timestamp.timestamp_millis().max(0) as u64;
            *last = candidate.max(*last + 1);
            *last
        };
        let event = DoseEvent {
            id,
            timestamp,
            serial: serial.to_string(),
            kind,
        };
        debug!(id = event.id, kind = ?event.kind, "dose event");
        // A send error only means nobody is listening yet
        let _ = self.tx.send(event.clone());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_monotonic() {
        let ledger = DoseLedger::new(16);
        let mut previous = 0;
        for _ in 0..10 {
            let event = ledger.emit("SN1", DoseEventKind::TempBasalStopped);
            assert!(event.id > previous);
            previous = event.id;
        }
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let ledger = DoseLedger::new(16);
        let mut rx = ledger.subscribe();
        let sent = ledger.emit("SN1", DoseEventKind::BolusDelivered { amount: 1.0 });
        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);
    }
}
