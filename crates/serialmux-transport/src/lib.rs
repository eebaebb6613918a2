//! Byte transport capability for serialmux links.
//!
//! The protocol layers above never touch a concrete device. They only need
//! three operations from the wire:
//! - `read` up to N bytes (suspending until at least one is available)
//! - `write` bytes into the outgoing queue
//! - `drain` until queued bytes are physically sent
//!
//! [`StreamTransport`] adapts any tokio `AsyncRead + AsyncWrite` stream
//! (serial bridges over TCP, Unix sockets, `tokio::io::duplex` pipes in tests).

pub mod error;
pub mod socket;
pub mod traits;

pub use error::{Result, TransportError};
pub use socket::{Endpoint, SocketStream};
pub use traits::{StreamTransport, Transport};
