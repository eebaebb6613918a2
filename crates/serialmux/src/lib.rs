//! Host-side multiplexing of devices and byte channels over one serial link.
//!
//! Many devices share a half-duplex bus (typically RS-485). Each is reached
//! by a 7-bit address; each exposes tunneled byte-stream channels and a typed
//! register file. This crate ties the layers together:
//!
//! - [`transport`]: the byte-level link (sockets to serial bridges, in-memory pipes)
//! - [`frame`]: frame codec, varuint, CRC, stream and register sub-frames
//! - [`link`]: the shared link manager and per-device clients

/// Re-export transport types.
pub mod transport {
    pub use serialmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialmux_frame::*;
}

/// Re-export link manager and client types.
pub mod link {
    pub use serialmux_link::*;
}
