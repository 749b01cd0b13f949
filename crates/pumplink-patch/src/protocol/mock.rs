//! Mock protocol codec for testing

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CodecError, InfusionInfoPayload, ProtocolCodec, ProtocolRequest, ProtocolResponse};

/// Scripted reply for the next request
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(ProtocolResponse),
    Fail(CodecError),
    /// Never answer; lets the caller's timeout budget expire
    Stall,
}

/// Mock codec with a scripted reply queue.
///
/// When the queue is empty, a sensible default is derived from the request
/// (bolus start → accepted, query → booted patch, everything else → ack), so
/// tests only script the interesting replies.
pub struct MockCodec {
    replies: Mutex<VecDeque<MockReply>>,
    latency: Mutex<Duration>,
    requests: Mutex<Vec<ProtocolRequest>>,
}

impl MockCodec {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply for the next un-scripted request
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    /// Simulated round-trip latency
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Every request observed so far, in order
    pub fn requests(&self) -> Vec<ProtocolRequest> {
        self.requests.lock().clone()
    }

    fn default_response(request: &ProtocolRequest) -> ProtocolResponse {
        match request {
            ProtocolRequest::StartBolus { volume, .. } => ProtocolResponse::BolusStarted {
                // One second per step at the default granularity
                expect_secs: (volume / 0.05).ceil() as u32,
            },
            ProtocolRequest::CancelBolus => ProtocolResponse::BolusCancelled {
                infused_amount: 0.0,
            },
            ProtocolRequest::QueryInfusionInfo => {
                ProtocolResponse::InfusionInfo(InfusionInfoPayload {
                    snapshot: Default::default(),
                    insulin_remaining: 200.0,
                    booted: true,
                })
            }
            _ => ProtocolResponse::Ack,
        }
    }
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolCodec for MockCodec {
    async fn request(&self, request: ProtocolRequest) -> Result<ProtocolResponse, CodecError> {
        let latency = *self.latency.lock();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        let reply = self.replies.lock().pop_front();
        self.requests.lock().push(request.clone());

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(error)) => Err(error),
            Some(MockReply::Stall) => std::future::pending().await,
            None => Ok(Self::default_response(&request)),
        }
    }
}
