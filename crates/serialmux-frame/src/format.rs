//! Wire constants shared by every encoder and decoder.
//!
//! Sub-frame ids are varuints on the wire; register ids carry the value
//! type in their low two bits (see [`RegisterType`](crate::RegisterType)).

/// Frame magic, transmitted little-endian (`54 AB`).
pub const FRAME_MAGIC: u16 = 0xab54;

/// Magic as it appears on the wire.
pub const MAGIC_BYTES: [u8; 2] = FRAME_MAGIC.to_le_bytes();

/// Fixed header: magic (2) + source (1) + destination (1).
pub const HEADER_SIZE: usize = 4;

/// Trailing CRC-16.
pub const CRC_SIZE: usize = 2;

/// Longest varuint accepted on read.
pub const MAX_VARUINT_SIZE: usize = 5;

/// Source byte flag asking the destination to answer.
pub const RESPONSE_REQUEST: u8 = 0x80;

/// Mask selecting the 7-bit address from a source or destination byte.
pub const ADDRESS_MASK: u8 = 0x7f;

/// Address every device listens on.
pub const BROADCAST_ID: u8 = 0x7f;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD: usize = 255;

/// Payloads shorter than this cannot hold a complete sub-frame.
pub const MIN_SUBFRAME_PAYLOAD: usize = 3;

/// Largest data chunk carried by one stream sub-frame.
pub const MAX_STREAM_CHUNK: usize = 100;

pub const WRITE_SINGLE_BASE: u32 = 0x10;
pub const WRITE_MULTIPLE_BASE: u32 = 0x14;
pub const READ_SINGLE_BASE: u32 = 0x18;
pub const READ_MULTIPLE_BASE: u32 = 0x1c;
pub const REPLY_SINGLE_BASE: u32 = 0x20;
pub const REPLY_MULTIPLE_BASE: u32 = 0x24;
pub const WRITE_ERROR: u32 = 0x28;
pub const READ_ERROR: u32 = 0x29;

/// Low bits of a register sub-frame id selecting the value type.
pub const REGISTER_TYPE_MASK: u32 = 0x03;

/// Host to device stream data (also used as the empty poll).
pub const STREAM_CLIENT_TO_SERVER: u32 = 0x40;

/// Device to host stream data.
pub const STREAM_SERVER_TO_CLIENT: u32 = 0x41;

/// Returns a human-readable name for a sub-frame id.
pub fn subframe_name(id: u32) -> &'static str {
    if (0x10..0x28).contains(&id) {
        return match id & !REGISTER_TYPE_MASK {
            WRITE_SINGLE_BASE => "WRITE_SINGLE",
            WRITE_MULTIPLE_BASE => "WRITE_MULTIPLE",
            READ_SINGLE_BASE => "READ_SINGLE",
            READ_MULTIPLE_BASE => "READ_MULTIPLE",
            REPLY_SINGLE_BASE => "REPLY_SINGLE",
            _ => "REPLY_MULTIPLE",
        };
    }
    match id {
        WRITE_ERROR => "WRITE_ERROR",
        READ_ERROR => "READ_ERROR",
        STREAM_CLIENT_TO_SERVER => "STREAM_CLIENT_TO_SERVER",
        STREAM_SERVER_TO_CLIENT => "STREAM_SERVER_TO_CLIENT",
        _ => "UNKNOWN",
    }
}
