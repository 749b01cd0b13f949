//! Link transport layer
//!
//! The wireless stack itself lives outside this crate; it is injected as a
//! [`LinkTransport`] capability covering the connect / discover /
//! enable-notifications triad plus two long-lived event streams (link state
//! and adapter power). A mock implementation is provided for testing.

mod adapter;
pub mod error;
pub mod mock;

pub use adapter::{AdapterEvent, LinkEvent, LinkTransport};
pub use error::LinkError;
