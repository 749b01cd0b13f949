//! Domain models shared between the host and the patch driver
//!
//! These types are the vocabulary of the host-facing API: dosing intents and
//! their outcomes, progress and ledger events, and the two records that
//! survive a restart (the pairing identity and the last infusion snapshot).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enact Results
// =============================================================================

/// Outcome of a host-issued dosing operation.
///
/// Dosing calls always resolve into one of these; failures are reported here
/// rather than thrown across the boundary. `enacted` states whether the patch
/// confirmed the action, `success` whether the call as a whole went as asked
/// (a cancel that finds nothing to cancel can be `success` without `enacted`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnactResult {
    pub success: bool,
    pub enacted: bool,
    /// Protocol-reported delivered amount, in units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_amount: Option<f64>,
    /// Accepted temp-basal rate, echoed back on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<TempBasalRate>,
    /// Accepted duration, echoed back on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Whether this result cancels a running temp basal / extended bolus
    #[serde(default)]
    pub temp_cancel: bool,
    /// Human-readable cause, attached only where the host shows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl EnactResult {
    /// The command was confirmed by the patch
    pub fn enacted() -> Self {
        Self {
            success: true,
            enacted: true,
            ..Self::default()
        }
    }

    /// The command was not sent or not confirmed
    pub fn not_enacted() -> Self {
        Self::default()
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_delivered(mut self, amount: f64) -> Self {
        self.delivered_amount = Some(amount);
        self
    }
}

// =============================================================================
// Dosing Parameters
// =============================================================================

/// Temporary basal rate, either absolute or relative to the program
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempBasalRate {
    /// Absolute rate in units/hour
    UnitsPerHour(f64),
    /// Percentage of the programmed basal rate
    Percent(u16),
}

/// A temporary basal request: rate override for a bounded duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempBasalSpec {
    pub rate: TempBasalRate,
    pub duration_minutes: u32,
}

/// A 24-hour basal program, one rate per hour in units/hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalProfile {
    pub hourly_rates: [f64; 24],
}

impl BasalProfile {
    /// A program delivering the same rate around the clock
    pub fn flat(rate: f64) -> Self {
        Self {
            hourly_rates: [rate; 24],
        }
    }

    /// Programmed rate for the given hour of day (0-23)
    pub fn rate_at_hour(&self, hour: u32) -> f64 {
        self.hourly_rates[(hour as usize) % 24]
    }
}

// =============================================================================
// Persisted Records
// =============================================================================

/// Pairing record for the one paired patch.
///
/// Mutated only on confirmed protocol responses; survives reconnects and
/// restarts, but not device replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Wireless address of the paired patch
    pub address: String,
    /// Last reported reservoir level, in units
    #[serde(default)]
    pub insulin_remaining: f64,
    /// Sequence number of the last confirmed bolus action
    #[serde(default)]
    pub bolus_action_seq: u32,
    /// Manufacture number, used as the pump serial in ledger events
    #[serde(default)]
    pub manufacture_number: String,
}

/// Last known infusion state as reported by the patch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfusionSnapshot {
    /// Baseline basal delivery, if the patch reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basal: Option<BasalInfusion>,
    /// Active temporary basal, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_basal: Option<TempBasalInfusion>,
    /// Active extended bolus, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_bolus: Option<ExtendedBolusInfusion>,
    /// Whether all delivery is currently stopped
    #[serde(default)]
    pub is_stopped: bool,
}

/// Reported baseline basal state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalInfusion {
    /// Current rate in units/hour
    pub rate: f64,
    #[serde(default)]
    pub is_stopped: bool,
}

/// Reported temporary basal override
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempBasalInfusion {
    pub rate: TempBasalRate,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
}

/// Reported extended bolus in progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtendedBolusInfusion {
    pub volume: f64,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
}

// =============================================================================
// Ledger and Progress Events
// =============================================================================

/// Canonical record of a confirmed dosing action, emitted once to the host
/// ledger. Never retried or rewritten after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    /// Host-generated monotonic id
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// Pump serial (manufacture number) at emission time
    pub serial: String,
    pub kind: DoseEventKind,
}

/// What was confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DoseEventKind {
    /// Immediate bolus ran to completion at the requested volume
    BolusDelivered { amount: f64 },
    /// Immediate bolus was stopped; amount is what the patch actually infused
    BolusStopped { infused_amount: f64 },
    TempBasalStarted {
        rate: TempBasalRate,
        duration_minutes: u32,
    },
    TempBasalStopped,
    ExtendedBolusStarted {
        amount: f64,
        duration_minutes: u32,
    },
    ExtendedBolusStopped,
}

/// Step-wise bolus delivery progress for the UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BolusProgress {
    /// Another step of the running bolus was paced out
    Delivering { delivered: f64, percent: u8 },
    /// The full requested volume was delivered
    Completed { delivered: f64 },
    /// The bolus was stopped; `infused` is the device-reported amount
    Stopped { infused: f64 },
}
