//! Tunneled byte-stream sub-frames.
//!
//! Layout: `id (varuint) | channel (varuint) | length (varuint) | data`.
//! An empty client-to-server sub-frame sent with the response-request flag
//! is the poll that lets a device answer with its queued output.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::VaruintError;
use crate::varuint::{encoded_len, read_varuint, write_varuint};

/// One decoded stream sub-frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Sub-frame id, [`STREAM_CLIENT_TO_SERVER`](crate::format::STREAM_CLIENT_TO_SERVER)
    /// or [`STREAM_SERVER_TO_CLIENT`](crate::format::STREAM_SERVER_TO_CLIENT).
    pub id: u32,
    pub channel: u32,
    pub data: Bytes,
}

/// Append a stream sub-frame to `dst`.
pub fn encode_stream_subframe(id: u32, channel: u32, data: &[u8], dst: &mut impl BufMut) {
    write_varuint(id, dst);
    write_varuint(channel, dst);
    write_varuint(data.len() as u32, dst);
    dst.put_slice(data);
}

/// Build a payload holding a single stream sub-frame.
pub fn stream_payload(id: u32, channel: u32, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        encoded_len(id) + encoded_len(channel) + encoded_len(data.len() as u32) + data.len(),
    );
    encode_stream_subframe(id, channel, data, &mut buf);
    buf.freeze()
}

/// Parse the stream sub-frame at the start of `payload`.
///
/// Returns `Ok(None)` when the header is incomplete. If the payload holds
/// fewer bytes than announced, the available bytes are returned.
pub fn parse_stream_subframe(payload: &Bytes) -> Result<Option<StreamChunk>, VaruintError> {
    let mut cursor = payload.as_ref();
    let (Some(id), Some(channel), Some(len)) = (
        read_varuint(&mut cursor)?,
        read_varuint(&mut cursor)?,
        read_varuint(&mut cursor)?,
    ) else {
        return Ok(None);
    };

    let start = payload.len() - cursor.len();
    let end = start + (len as usize).min(cursor.len());
    Ok(Some(StreamChunk {
        id,
        channel,
        data: payload.slice(start..end),
    }))
}
