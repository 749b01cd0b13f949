//! Protocol layer
//!
//! The byte-level request/response codec is external; this crate sees it as
//! an opaque typed mapping ([`ProtocolCodec`]). [`PatchService`] wraps the
//! codec with one method per patch operation, each returning that operation's
//! concrete payload type and enforcing the caller-supplied timeout budget.

mod codec;
pub mod mock;
mod service;

pub use codec::{CodecError, InfusionInfoPayload, ProtocolCodec, ProtocolRequest, ProtocolResponse};
pub use service::PatchService;
