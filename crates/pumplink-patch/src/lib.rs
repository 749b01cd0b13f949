//! pumplink-patch - driver for one paired wearable infusion pump ("patch")
//!
//! This crate owns the wireless-link lifecycle to the paired patch, dispatches
//! dosing commands over that link, paces bolus delivery progress, and drives
//! automatic reconnection after link loss.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         PatchPump                            │
//! │  Implements the pumplink-core Pump trait                     │
//! │                                                              │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐  │
//! │  │StateProjection│ │ConnectionMgr  │  │CommandDispatcher │  │
//! │  │ (PatchState)  │ │ (reconnect)   │  │ (dosing ops)     │  │
//! │  └──────────────┘  └───────┬───────┘  └────────┬─────────┘  │
//! │                            │                   │            │
//! │                            │           ┌───────┴────────┐   │
//! │                            │           │  PatchService  │   │
//! │                            │           │ (typed codec)  │   │
//! │                            │           └───────┬────────┘   │
//! │                   ┌────────┴────────┐  ┌───────┴────────┐   │
//! │                   │  LinkTransport  │  │ ProtocolCodec  │   │
//! │                   │  (capability)   │  │  (capability)  │   │
//! │                   └─────────────────┘  └────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wireless stack and the byte-level codec stay outside: both are injected
//! capabilities (`LinkTransport`, `ProtocolCodec`), with mock implementations
//! for testing.

pub mod bolus;
pub mod commands;
pub mod config;
pub mod driver;
pub mod events;
pub mod link;
pub mod protocol;
pub mod session;
pub mod state;
pub mod store;

pub use commands::{CommandCategory, CommandDispatcher};
pub use config::PatchDriverConfig;
pub use driver::PatchPump;
pub use events::DoseLedger;
pub use link::{AdapterEvent, LinkError, LinkEvent, LinkTransport};
pub use protocol::{CodecError, PatchService, ProtocolCodec, ProtocolRequest, ProtocolResponse};
pub use session::{ConnectionManager, ReconnectPhase};
pub use state::{LinkState, LinkStatus, PatchState, StateProjection};
pub use store::{PatchRecord, PatchStore};

// Re-export for convenience
pub use pumplink_core::{
    BasalProfile, BolusProgress, DoseEvent, DoseEventKind, EnactResult, Pump, PumpError,
    PumpResult, TempBasalRate, TempBasalSpec,
};
