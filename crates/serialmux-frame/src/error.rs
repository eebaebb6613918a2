use crate::register::RegisterType;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header does not start with the frame magic; the link is out of sync.
    #[error("invalid frame magic 0x{found:04x} (expected 0xab54)")]
    InvalidMagic { found: u16 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An address does not fit in 7 bits.
    #[error("address 0x{0:02x} does not fit in 7 bits")]
    InvalidAddress(u8),

    /// The received checksum does not match the frame contents.
    #[error("crc mismatch (computed 0x{expected:04x}, received 0x{actual:04x})")]
    CrcMismatch { expected: u16, actual: u16 },

    /// A varuint field was malformed.
    #[error("varuint error: {0}")]
    Varuint(#[from] VaruintError),
}

/// Malformed varuint encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VaruintError {
    /// The fifth byte still had its continuation bit set.
    #[error("varuint longer than 5 bytes")]
    Overlong,

    /// The decoded value does not fit in 32 bits.
    #[error("varuint value {0} exceeds u32")]
    OutOfRange(u64),
}

/// Misuse of the register request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// `write_multiple` was called without any values.
    #[error("write_multiple requires at least one value")]
    EmptyValues,

    /// `write_multiple` values do not share one type.
    #[error("write_multiple value {index} is {found:?}, expected {expected:?}")]
    MixedTypes {
        expected: RegisterType,
        found: RegisterType,
        index: usize,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
