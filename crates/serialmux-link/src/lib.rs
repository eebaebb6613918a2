//! Shared-link arbitration and multiplex clients.
//!
//! A [`LinkManager`] owns one half-duplex link and the token that serializes
//! exchanges on it. [`Client`]s address one device each and offer:
//! - a byte stream over a tunneled channel, emulated by polling
//! - typed register reads and writes
//!
//! Exchanges from different clients never interleave on the wire, and a
//! link that loses framing resynchronizes by itself.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod stats;

pub use client::Client;
pub use clock::{Clock, TokioClock};
pub use config::{ClientConfig, LinkConfig};
pub use error::{LinkError, ResyncReason, Result};
pub use manager::{LinkGuard, LinkManager};
pub use stats::LinkStats;
