//! Little-endian base-128 unsigned integers.
//!
//! Each byte carries 7 value bits, least significant group first; the top bit
//! flags that another byte follows. Reads stop after [`MAX_VARUINT_SIZE`]
//! bytes so a corrupt stream can never drive an unbounded decode.

use bytes::{Buf, BufMut};

use crate::error::VaruintError;
use crate::format::MAX_VARUINT_SIZE;

/// Append `value` to `dst`.
pub fn write_varuint(value: u32, dst: &mut impl BufMut) {
    let mut value = value;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if value == 0 {
            return;
        }
    }
}

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u32) -> usize {
    let mut value = value;
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Read one varuint from `src`.
///
/// Returns `Ok(None)` if `src` runs out before the value is complete.
pub fn read_varuint(src: &mut impl Buf) -> Result<Option<u32>, VaruintError> {
    let mut decoder = VaruintDecoder::new();
    while src.has_remaining() {
        if let Some(value) = decoder.push(src.get_u8())? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Incremental decoder for sources that deliver one byte at a time.
#[derive(Debug, Default, Clone)]
pub struct VaruintDecoder {
    value: u64,
    consumed: usize,
}

impl VaruintDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte. Returns the value once the final byte arrives.
    pub fn push(&mut self, byte: u8) -> Result<Option<u32>, VaruintError> {
        self.value |= u64::from(byte & 0x7f) << (7 * self.consumed);
        self.consumed += 1;

        if byte & 0x80 == 0 {
            let value = self.value;
            *self = Self::default();
            return u32::try_from(value)
                .map(Some)
                .map_err(|_| VaruintError::OutOfRange(value));
        }
        if self.consumed >= MAX_VARUINT_SIZE {
            return Err(VaruintError::Overlong);
        }
        Ok(None)
    }

    /// Bytes consumed by the value in progress.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use proptest::prelude::*;

    use super::*;

    fn decode(bytes: &[u8]) -> Result<Option<u32>, VaruintError> {
        let mut src = bytes;
        read_varuint(&mut src)
    }

    #[test]
    fn known_encodings() {
        assert_eq!(decode(&[0x05]), Ok(Some(0x05)));
        assert_eq!(decode(&[0x05, 0x06]), Ok(Some(0x05)));
        assert_eq!(decode(&[0x85, 0x01]), Ok(Some(0x85)));
        assert_eq!(decode(&[0x85, 0x81, 0x01]), Ok(Some(0x4085)));
    }

    #[test]
    fn empty_source_is_no_data() {
        assert_eq!(decode(&[]), Ok(None));
    }

    #[test]
    fn unterminated_value_is_no_data() {
        assert_eq!(decode(&[0x85]), Ok(None));
        assert_eq!(decode(&[0xff, 0xff, 0xff]), Ok(None));
    }

    #[test]
    fn fifth_continuation_byte_is_a_fault() {
        assert_eq!(
            decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(VaruintError::Overlong)
        );
    }

    #[test]
    fn five_byte_value_above_u32_is_rejected() {
        assert_eq!(
            decode(&[0xff, 0xff, 0xff, 0xff, 0x7f]),
            Err(VaruintError::OutOfRange(0x7_ffff_ffff))
        );
    }

    #[test]
    fn u32_max_uses_five_bytes() {
        let mut buf = BytesMut::new();
        write_varuint(u32::MAX, &mut buf);
        assert_eq!(buf.as_ref(), &[0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(decode(&buf), Ok(Some(u32::MAX)));
    }

    #[test]
    fn zero_is_one_byte() {
        let mut buf = BytesMut::new();
        write_varuint(0, &mut buf);
        assert_eq!(buf.as_ref(), &[0x00]);
    }

    #[test]
    fn decoder_consumes_only_the_value() {
        let mut src: &[u8] = &[0x85, 0x01, 0x42];
        assert_eq!(read_varuint(&mut src), Ok(Some(0x85)));
        assert_eq!(src, &[0x42]);
    }

    #[test]
    fn decoder_resets_after_each_value() {
        let mut decoder = VaruintDecoder::new();
        assert_eq!(decoder.push(0x85), Ok(None));
        assert_eq!(decoder.consumed(), 1);
        assert_eq!(decoder.push(0x01), Ok(Some(0x85)));
        assert_eq!(decoder.consumed(), 0);
        assert_eq!(decoder.push(0x07), Ok(Some(0x07)));
    }

    proptest! {
        #[test]
        fn roundtrip(value in any::<u32>()) {
            let mut buf = BytesMut::new();
            write_varuint(value, &mut buf);
            prop_assert_eq!(buf.len(), encoded_len(value));
            prop_assert_eq!(decode(&buf), Ok(Some(value)));
        }
    }
}
