//! Protocol codec capability and typed request/response messages

use async_trait::async_trait;
use thiserror::Error;

use pumplink_core::{BasalProfile, InfusionSnapshot, TempBasalRate};

/// Typed protocol request, one variant per patch operation
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolRequest {
    StartBolus {
        action_seq: u32,
        volume: f64,
    },
    CancelBolus,
    FinishBolus,
    StartExtendedBolus {
        volume: f64,
        duration_minutes: u32,
    },
    CancelExtendedBolus,
    StartTempBasal {
        rate: TempBasalRate,
        duration_minutes: u32,
    },
    CancelTempBasal,
    UpdateBasalProgram {
        profile: BasalProfile,
    },
    QueryInfusionInfo,
    SetMaxBolusDose {
        units: f64,
    },
    SetLowInsulinNotice {
        units: u32,
    },
    SetExpirationReminder {
        hours: u32,
    },
    SetBuzzer {
        enabled: bool,
    },
    ClearUserSettings,
    SetTimeZone {
        utc_offset_minutes: i32,
        insulin_remaining: u32,
    },
}

/// Typed protocol response
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolResponse {
    /// Plain confirmation with no payload
    Ack,
    /// Immediate bolus accepted; the patch reports the expected delivery time
    BolusStarted { expect_secs: u32 },
    /// Immediate bolus cancelled; the patch reports what it actually infused
    BolusCancelled { infused_amount: f64 },
    /// Current infusion state
    InfusionInfo(InfusionInfoPayload),
}

/// Payload of an infusion-info query
#[derive(Debug, Clone, PartialEq)]
pub struct InfusionInfoPayload {
    pub snapshot: InfusionSnapshot,
    /// Reservoir level, in units
    pub insulin_remaining: f64,
    /// Whether the patch reports itself fully booted
    pub booted: bool,
}

/// Opaque typed request → response mapping over the patch link.
///
/// One call is one protocol round trip. The codec never enforces timeouts;
/// callers own the budget.
#[async_trait]
pub trait ProtocolCodec: Send + Sync {
    async fn request(&self, request: ProtocolRequest) -> Result<ProtocolResponse, CodecError>;
}

#[derive(Debug, Error, Clone)]
pub enum CodecError {
    /// The patch answered with an explicit rejection
    #[error("Rejected by patch: {0}")]
    Rejected(String),

    /// The link is not in a state that can carry a request
    #[error("Link not ready")]
    NotReady,

    /// Encoding/decoding or transport failure below the typed surface
    #[error("Codec failure: {0}")]
    Failed(String),
}
