//! pumplink-core - Core trait and types for patch pump drivers
//!
//! This crate provides the fundamental abstractions that allow the host
//! application to drive a wearable infusion pump ("patch") without knowing
//! anything about the wireless plumbing behind it.

pub mod error;
pub mod models;
pub mod pump;

pub use error::{PumpError, PumpResult};
pub use models::*;
pub use pump::Pump;
