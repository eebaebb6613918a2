use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::crc::crc16;
use crate::error::{FrameError, Result};
use crate::format::{
    ADDRESS_MASK, CRC_SIZE, FRAME_MAGIC, HEADER_SIZE, MAGIC_BYTES, MAX_PAYLOAD, RESPONSE_REQUEST,
};
use crate::varuint::{encoded_len, read_varuint, write_varuint};

/// What to do with a frame whose checksum does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CrcMode {
    /// Deliver the frame anyway; [`Frame::crc_ok`] records the mismatch.
    #[default]
    Ignore,
    /// Reject the frame with [`FrameError::CrcMismatch`].
    Enforce,
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 255.
    pub max_payload_size: usize,
    /// Checksum policy on decode.
    pub crc_mode: CrcMode,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            crc_mode: CrcMode::Ignore,
        }
    }
}

/// One addressed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 7-bit sender address.
    pub source: u8,
    /// Whether the sender asked the destination to answer.
    pub request_reply: bool,
    /// 7-bit receiver address.
    pub destination: u8,
    /// Sub-frame bytes.
    pub payload: Bytes,
    /// Checksum as received (or as computed, for locally built frames).
    pub crc: u16,
    /// Whether `crc` matched the frame contents.
    pub crc_ok: bool,
}

impl Frame {
    /// Create a new frame that does not ask for a reply.
    pub fn new(source: u8, destination: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            source,
            request_reply: false,
            destination,
            payload: payload.into(),
            crc: 0,
            crc_ok: true,
        }
    }

    /// Set the response-request flag.
    pub fn with_request_reply(mut self, request_reply: bool) -> Self {
        self.request_reply = request_reply;
        self
    }

    /// The source byte as transmitted, flag included.
    pub fn source_byte(&self) -> u8 {
        if self.request_reply {
            self.source | RESPONSE_REQUEST
        } else {
            self.source
        }
    }

    /// Encode this frame, appending to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if self.source > ADDRESS_MASK {
            return Err(FrameError::InvalidAddress(self.source));
        }
        encode_frame(self.source_byte(), self.destination, &self.payload, dst)
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + encoded_len(self.payload.len() as u32) + self.payload.len() + CRC_SIZE
    }
}

/// Encode a frame into the wire format.
///
/// `source` is the raw source byte, so callers may already have OR'ed in
/// [`RESPONSE_REQUEST`].
///
/// Wire format:
/// ```text
/// ┌────────────┬────────┬──────┬─────────────┬──────────┬──────────┐
/// │ Magic (2B) │ Source │ Dest │ Length      │ Payload  │ CRC (2B) │
/// │ 0x54 0xAB  │ (1B)   │ (1B) │ (varuint)   │          │ LE       │
/// └────────────┴────────┴──────┴─────────────┴──────────┴──────────┘
/// ```
pub fn encode_frame(source: u8, destination: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    if destination > ADDRESS_MASK {
        return Err(FrameError::InvalidAddress(destination));
    }

    let start = dst.len();
    dst.reserve(HEADER_SIZE + 2 + payload.len() + CRC_SIZE);
    dst.put_slice(&MAGIC_BYTES);
    dst.put_u8(source);
    dst.put_u8(destination);
    write_varuint(payload.len() as u32, dst);
    dst.put_slice(payload);
    let crc = crc16(&dst[start..]);
    dst.put_u16_le(crc);
    Ok(())
}

/// Check the two magic bytes at the start of a header.
pub fn check_magic(magic: [u8; 2]) -> Result<()> {
    let found = u16::from_le_bytes(magic);
    if found != FRAME_MAGIC {
        return Err(FrameError::InvalidMagic { found });
    }
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A frame rejected for
/// its checksum is consumed too, so decoding can continue after it; a bad
/// magic consumes nothing and leaves resynchronization to the caller.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    check_magic([src[0], src[1]])?;

    let mut cursor = &src[HEADER_SIZE..];
    let before = cursor.remaining();
    let Some(payload_len) = read_varuint(&mut cursor)? else {
        return Ok(None);
    };
    let len_size = before - cursor.remaining();
    let payload_len = payload_len as usize;

    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let body_end = HEADER_SIZE + len_size + payload_len;
    let total = body_end + CRC_SIZE;
    if src.len() < total {
        return Ok(None);
    }

    let expected = crc16(&src[..body_end]);
    let actual = u16::from_le_bytes([src[body_end], src[body_end + 1]]);
    let source_byte = src[2];
    let destination = src[3];

    let mut frame_bytes = src.split_to(total);
    let crc_ok = expected == actual;
    if !crc_ok {
        trace!(expected, actual, "frame crc mismatch");
        if config.crc_mode == CrcMode::Enforce {
            return Err(FrameError::CrcMismatch { expected, actual });
        }
    }

    frame_bytes.advance(HEADER_SIZE + len_size);
    frame_bytes.truncate(payload_len);

    Ok(Some(Frame {
        source: source_byte & ADDRESS_MASK,
        request_reply: source_byte & RESPONSE_REQUEST != 0,
        destination: destination & ADDRESS_MASK,
        payload: frame_bytes.freeze(),
        crc: actual,
        crc_ok,
    }))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::VaruintError;

    #[test]
    fn test_encode_known_stream_frame() {
        let mut buf = BytesMut::new();
        encode_frame(0x00, 0x05, &[0x40, 0x01, 0x04, b't', b'e', b's', b't'], &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0x54, 0xab, 0x00, 0x05, 0x07, 0x40, 0x01, 0x04, b't', b'e', b's', b't', 0x01, 0xa0]
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let frame = Frame::new(3, 9, Bytes::from_static(b"hello")).with_request_reply(true);
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.wire_size());

        let decoded = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.source, 3);
        assert!(decoded.request_reply);
        assert_eq!(decoded.destination, 9);
        assert_eq!(decoded.payload.as_ref(), b"hello");
        assert!(decoded.crc_ok);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x54, 0xab, 0x00][..]);
        let result = decode_frame(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(1, 2, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 3);

        let result = decode_frame(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 3);
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0xab, 0x54, 0x00, 0x05, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, &FrameConfig::default());
        assert!(matches!(
            result,
            Err(FrameError::InvalidMagic { found: 0x54ab })
        ));
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn test_encode_rejects_large_payload() {
        let mut buf = BytesMut::new();
        let result = encode_frame(0, 1, &[0u8; 256], &mut buf);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 256, max: 255 })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_wide_addresses() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_frame(0, 0x80, b"", &mut buf),
            Err(FrameError::InvalidAddress(0x80))
        ));
        assert!(matches!(
            Frame::new(0x90, 1, Bytes::new()).encode(&mut buf),
            Err(FrameError::InvalidAddress(0x90))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_payload_uses_two_byte_length() {
        let payload = vec![0x5a; MAX_PAYLOAD];
        let mut buf = BytesMut::new();
        encode_frame(1, 2, &payload, &mut buf).unwrap();
        assert_eq!(buf[4..6], [0xff, 0x01]);

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_decode_rejects_length_over_config() {
        let mut buf = BytesMut::new();
        encode_frame(1, 2, &[0u8; 40], &mut buf).unwrap();
        let config = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let result = decode_frame(&mut buf, &config);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 40, max: 16 })
        ));
    }

    #[test]
    fn test_decode_overlong_length() {
        let mut buf = BytesMut::from(&[0x54, 0xab, 0x01, 0x02, 0x80, 0x80, 0x80, 0x80, 0x80][..]);
        let result = decode_frame(&mut buf, &FrameConfig::default());
        assert!(matches!(
            result,
            Err(FrameError::Varuint(VaruintError::Overlong))
        ));
    }

    #[test]
    fn test_crc_mismatch_ignored_by_default() {
        let mut buf = BytesMut::new();
        encode_frame(5, 0, b"abc", &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert!(!frame.crc_ok);
        assert_eq!(frame.payload.as_ref(), b"abc");
    }

    #[test]
    fn test_crc_mismatch_enforced_consumes_frame() {
        let mut buf = BytesMut::new();
        encode_frame(5, 0, b"abc", &mut buf).unwrap();
        buf[7] ^= 0x01;
        encode_frame(5, 0, b"next", &mut buf).unwrap();

        let config = FrameConfig {
            crc_mode: CrcMode::Enforce,
            ..FrameConfig::default()
        };
        let result = decode_frame(&mut buf, &config);
        assert!(matches!(result, Err(FrameError::CrcMismatch { .. })));

        let next = decode_frame(&mut buf, &config).unwrap().unwrap();
        assert_eq!(next.payload.as_ref(), b"next");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, 2, b"first", &mut buf).unwrap();
        encode_frame(3 | RESPONSE_REQUEST, 4, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!((f1.source, f1.destination), (1, 2));
        assert!(!f1.request_reply);

        let f2 = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!((f2.source, f2.destination), (3, 4));
        assert!(f2.request_reply);
        assert_eq!(f2.payload.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(0, 0, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 1 + CRC_SIZE);

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert!(frame.payload.is_empty());
    }

    proptest! {
        #[test]
        fn roundtrip_any_frame(
            source in 0u8..0x80,
            destination in 0u8..0x80,
            request_reply in any::<bool>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD),
        ) {
            let frame = Frame::new(source, destination, payload.clone())
                .with_request_reply(request_reply);
            let mut buf = BytesMut::new();
            frame.encode(&mut buf).unwrap();

            let decoded = decode_frame(&mut buf, &FrameConfig::default()).unwrap().unwrap();
            prop_assert_eq!(decoded.source, source);
            prop_assert_eq!(decoded.destination, destination);
            prop_assert_eq!(decoded.request_reply, request_reply);
            prop_assert_eq!(decoded.payload.as_ref(), payload.as_slice());
            prop_assert!(decoded.crc_ok);
        }

        #[test]
        fn single_byte_corruption_is_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut buf = BytesMut::new();
            encode_frame(1, 2, &payload, &mut buf).unwrap();
            // Corrupt the payload or the checksum, leaving the framing intact.
            let first = HEADER_SIZE + 1;
            let target = first + index.index(buf.len() - first);
            buf[target] ^= flip;

            let config = FrameConfig { crc_mode: CrcMode::Enforce, ..FrameConfig::default() };
            let is_crc_mismatch = matches!(
                decode_frame(&mut buf, &config),
                Err(FrameError::CrcMismatch { .. })
            );
            prop_assert!(is_crc_mismatch);
        }
    }
}
