//! Addressed, checksummed framing for a shared serial link.
//!
//! Every frame carries:
//! - A 2-byte magic number (0xAB54, little-endian) for stream synchronization
//! - 7-bit source and destination addresses (bit 7 of the source asks for a reply)
//! - A varuint payload length (at most 255)
//! - A CRC-16/CCITT over everything before it
//!
//! Payloads hold sub-frames: stream data for tunneled byte channels, or the
//! typed register protocol in [`register`].

pub mod codec;
pub mod crc;
pub mod error;
pub mod format;
pub mod register;
pub mod stream;
pub mod varuint;

pub use codec::{check_magic, decode_frame, encode_frame, CrcMode, Frame, FrameConfig};
pub use error::{FrameError, RegisterError, Result, VaruintError};
pub use format::{
    subframe_name, BROADCAST_ID, CRC_SIZE, FRAME_MAGIC, HEADER_SIZE, MAX_PAYLOAD,
    MAX_STREAM_CHUNK, MIN_SUBFRAME_PAYLOAD, RESPONSE_REQUEST, STREAM_CLIENT_TO_SERVER,
    STREAM_SERVER_TO_CLIENT,
};
pub use register::{
    parse_register_reply, ParseStop, Register, RegisterReply, RegisterRequest, RegisterResult,
    RegisterType, RegisterValue,
};
pub use stream::{encode_stream_subframe, parse_stream_subframe, stream_payload, StreamChunk};
pub use varuint::{read_varuint, write_varuint, VaruintDecoder};
