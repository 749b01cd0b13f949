//! Typed service layer over the protocol codec

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use pumplink_core::{BasalProfile, PumpError, PumpResult, TempBasalRate};

use super::{CodecError, InfusionInfoPayload, ProtocolCodec, ProtocolRequest, ProtocolResponse};

/// Patch service layer: one method per operation, each returning the
/// operation's concrete payload and enforcing the supplied timeout budget.
#[derive(Clone)]
pub struct PatchService {
    codec: Arc<dyn ProtocolCodec>,
}

impl PatchService {
    pub fn new(codec: Arc<dyn ProtocolCodec>) -> Self {
        Self { codec }
    }

    /// One request, one response or timeout
    async fn roundtrip(
        &self,
        request: ProtocolRequest,
        budget: Duration,
    ) -> PumpResult<ProtocolResponse> {
        match timeout(budget, self.codec.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(CodecError::Rejected(reason))) => Err(PumpError::ProtocolError(reason)),
            Ok(Err(CodecError::NotReady)) => {
                Err(PumpError::DeviceUnreachable("link not ready".into()))
            }
            Ok(Err(CodecError::Failed(reason))) => Err(PumpError::DeviceUnreachable(reason)),
            Err(_) => Err(PumpError::ProtocolTimeout { budget }),
        }
    }

    fn expect_ack(response: ProtocolResponse) -> PumpResult<()> {
        match response {
            ProtocolResponse::Ack => Ok(()),
            other => Err(PumpError::ProtocolError(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Start an immediate bolus; returns the expected delivery time in seconds
    pub async fn start_bolus(
        &self,
        action_seq: u32,
        volume: f64,
        budget: Duration,
    ) -> PumpResult<u32> {
        let request = ProtocolRequest::StartBolus { action_seq, volume };
        match self.roundtrip(request, budget).await? {
            ProtocolResponse::BolusStarted { expect_secs } => Ok(expect_secs),
            other => Err(PumpError::ProtocolError(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Cancel the running bolus; returns the device-reported infused amount
    pub async fn cancel_bolus(&self, budget: Duration) -> PumpResult<f64> {
        match self.roundtrip(ProtocolRequest::CancelBolus, budget).await? {
            ProtocolResponse::BolusCancelled { infused_amount } => Ok(infused_amount),
            other => Err(PumpError::ProtocolError(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Confirm bolus completion with the patch
    pub async fn finish_bolus(&self, budget: Duration) -> PumpResult<()> {
        self.roundtrip(ProtocolRequest::FinishBolus, budget)
            .await
            .and_then(Self::expect_ack)
    }

    pub async fn start_extended_bolus(
        &self,
        volume: f64,
        duration_minutes: u32,
        budget: Duration,
    ) -> PumpResult<()> {
        let request = ProtocolRequest::StartExtendedBolus {
            volume,
            duration_minutes,
        };
        self.roundtrip(request, budget).await.and_then(Self::expect_ack)
    }

    pub async fn cancel_extended_bolus(&self, budget: Duration) -> PumpResult<()> {
        self.roundtrip(ProtocolRequest::CancelExtendedBolus, budget)
            .await
            .and_then(Self::expect_ack)
    }

    pub async fn start_temp_basal(
        &self,
        rate: TempBasalRate,
        duration_minutes: u32,
        budget: Duration,
    ) -> PumpResult<()> {
        let request = ProtocolRequest::StartTempBasal {
            rate,
            duration_minutes,
        };
        self.roundtrip(request, budget).await.and_then(Self::expect_ack)
    }

    pub async fn cancel_temp_basal(&self, budget: Duration) -> PumpResult<()> {
        self.roundtrip(ProtocolRequest::CancelTempBasal, budget)
            .await
            .and_then(Self::expect_ack)
    }

    pub async fn update_basal_program(
        &self,
        profile: &BasalProfile,
        budget: Duration,
    ) -> PumpResult<()> {
        let request = ProtocolRequest::UpdateBasalProgram {
            profile: profile.clone(),
        };
        self.roundtrip(request, budget).await.and_then(Self::expect_ack)
    }

    /// Query the patch for its current infusion state
    pub async fn query_infusion_info(&self, budget: Duration) -> PumpResult<InfusionInfoPayload> {
        match self
            .roundtrip(ProtocolRequest::QueryInfusionInfo, budget)
            .await?
        {
            ProtocolResponse::InfusionInfo(payload) => Ok(payload),
            other => Err(PumpError::ProtocolError(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Fire a user-setting update; all settings share the plain-ack shape
    pub async fn apply_setting(
        &self,
        request: ProtocolRequest,
        budget: Duration,
    ) -> PumpResult<()> {
        self.roundtrip(request, budget).await.and_then(Self::expect_ack)
    }
}
