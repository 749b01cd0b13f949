//! Persisted device record
//!
//! Only the pairing identity and the last infusion snapshot survive a restart,
//! as one small JSON record. Absence (first run) and staleness (prior session)
//! are both tolerated: a missing or unreadable file yields the default record.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pumplink_core::{DeviceIdentity, InfusionSnapshot, PumpError, PumpResult};

/// The one record that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub identity: DeviceIdentity,
    #[serde(default)]
    pub snapshot: InfusionSnapshot,
    /// Whether the patch had acknowledged boot when last heard from
    #[serde(default)]
    pub booted: bool,
}

/// Keyed JSON store for the patch record. `None` path keeps it in memory only.
pub struct PatchStore {
    path: Option<PathBuf>,
}

impl PatchStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Load the record, falling back to the default on absence or damage
    pub fn load(&self) -> PatchRecord {
        let Some(path) = &self.path else {
            return PatchRecord::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(record) => {
                    debug!(path = %path.display(), "loaded patch record");
                    record
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "patch record unreadable, starting fresh");
                    PatchRecord::default()
                }
            },
            Err(_) => PatchRecord::default(),
        }
    }

    pub fn save(&self, record: &PatchRecord) -> PumpResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(record)
            .map_err(|e| PumpError::Store(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| PumpError::Store(e.to_string()))
    }
}
