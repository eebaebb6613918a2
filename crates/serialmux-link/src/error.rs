use std::fmt;
use std::time::Duration;

use serialmux_frame::{FrameError, RegisterError, VaruintError};
use serialmux_transport::TransportError;

/// Errors surfaced by the link manager and its clients.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A register request could not be built.
    #[error("register error: {0}")]
    Register(#[from] RegisterError),

    /// The operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A header could not be trusted; pending input was discarded.
    #[error("link resynchronized after {reason} ({discarded} bytes discarded)")]
    Resynchronized {
        reason: ResyncReason,
        discarded: usize,
    },
}

/// Why the link had to resynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    /// The header did not start with the frame magic.
    BadMagic(u16),
    /// The header announced a payload above the configured maximum.
    OversizedLength(usize),
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::BadMagic(found) => write!(f, "bad magic 0x{found:04x}"),
            ResyncReason::OversizedLength(len) => write!(f, "oversized length {len}"),
        }
    }
}

impl LinkError {
    /// Whether a retry on the same link can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::Timeout(_)
                | LinkError::Resynchronized { .. }
                | LinkError::Frame(FrameError::CrcMismatch { .. })
        )
    }
}

impl From<VaruintError> for LinkError {
    fn from(err: VaruintError) -> Self {
        LinkError::Frame(FrameError::Varuint(err))
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
