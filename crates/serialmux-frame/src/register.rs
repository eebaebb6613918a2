//! Typed register access carried inside frame payloads.
//!
//! A request is a run of sub-frames built with [`RegisterRequest`]; a reply
//! is parsed with [`parse_register_reply`] into a [`RegisterReply`] mapping
//! register numbers to values or error codes.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{RegisterError, VaruintError};
use crate::format::{
    READ_ERROR, READ_MULTIPLE_BASE, READ_SINGLE_BASE, REGISTER_TYPE_MASK, REPLY_MULTIPLE_BASE,
    REPLY_SINGLE_BASE, WRITE_ERROR, WRITE_MULTIPLE_BASE, WRITE_SINGLE_BASE,
};
use crate::varuint::{read_varuint, write_varuint};

/// Register number on the remote device.
pub type Register = u32;

/// Value type, encoded in the low two bits of register sub-frame ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    Float = 3,
}

impl RegisterType {
    /// Type selected by the low bits of a sub-frame id.
    pub fn from_tag(tag: u32) -> Self {
        match tag & REGISTER_TYPE_MASK {
            0 => Self::Int8,
            1 => Self::Int16,
            2 => Self::Int32,
            _ => Self::Float,
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Encoded width in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Float => "float",
        }
    }
}

/// A typed register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Float(f32),
}

impl RegisterValue {
    pub fn register_type(&self) -> RegisterType {
        match self {
            Self::Int8(_) => RegisterType::Int8,
            Self::Int16(_) => RegisterType::Int16,
            Self::Int32(_) => RegisterType::Int32,
            Self::Float(_) => RegisterType::Float,
        }
    }

    /// Append the fixed-width little-endian encoding.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match *self {
            Self::Int8(v) => dst.put_i8(v),
            Self::Int16(v) => dst.put_i16_le(v),
            Self::Int32(v) => dst.put_i32_le(v),
            Self::Float(v) => dst.put_f32_le(v),
        }
    }

    /// Read one value of `ty`, or `None` if `src` is too short.
    pub fn decode(ty: RegisterType, src: &mut impl Buf) -> Option<Self> {
        if src.remaining() < ty.size() {
            return None;
        }
        Some(match ty {
            RegisterType::Int8 => Self::Int8(src.get_i8()),
            RegisterType::Int16 => Self::Int16(src.get_i16_le()),
            RegisterType::Int32 => Self::Int32(src.get_i32_le()),
            RegisterType::Float => Self::Float(src.get_f32_le()),
        })
    }

    /// The value widened to `f64`, convenient for display.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int8(v) => f64::from(v),
            Self::Int16(v) => f64::from(v),
            Self::Int32(v) => f64::from(v),
            Self::Float(v) => f64::from(v),
        }
    }
}

/// One register's entry in a reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterResult {
    Value(RegisterValue),
    /// Device-specific error code.
    Error(u32),
}

impl RegisterResult {
    pub fn value(&self) -> Option<RegisterValue> {
        match self {
            Self::Value(value) => Some(*value),
            Self::Error(_) => None,
        }
    }
}

/// Builds the sub-frames for one register exchange.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    buf: BytesMut,
    expect_response: bool,
}

impl RegisterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a reply even when only writes were queued, to observe errors.
    ///
    /// Any read operation turns this on automatically.
    pub fn expect_response(&mut self, expect: bool) -> &mut Self {
        self.expect_response = expect;
        self
    }

    /// Whether the device is expected to answer.
    pub fn expects_response(&self) -> bool {
        self.expect_response
    }

    pub fn read_single(&mut self, register: Register, ty: RegisterType) -> &mut Self {
        write_varuint(READ_SINGLE_BASE + ty.tag(), &mut self.buf);
        write_varuint(register, &mut self.buf);
        self.expect_response = true;
        self
    }

    pub fn read_multiple(&mut self, register: Register, count: u32, ty: RegisterType) -> &mut Self {
        write_varuint(READ_MULTIPLE_BASE + ty.tag(), &mut self.buf);
        write_varuint(register, &mut self.buf);
        write_varuint(count, &mut self.buf);
        self.expect_response = true;
        self
    }

    pub fn write_single(&mut self, register: Register, value: RegisterValue) -> &mut Self {
        write_varuint(WRITE_SINGLE_BASE + value.register_type().tag(), &mut self.buf);
        write_varuint(register, &mut self.buf);
        value.encode(&mut self.buf);
        self
    }

    /// Write consecutive registers starting at `start`. All values must share one type.
    pub fn write_multiple(
        &mut self,
        start: Register,
        values: &[RegisterValue],
    ) -> Result<&mut Self, RegisterError> {
        let first = values.first().ok_or(RegisterError::EmptyValues)?;
        let expected = first.register_type();
        if let Some((index, value)) = values
            .iter()
            .enumerate()
            .find(|(_, value)| value.register_type() != expected)
        {
            return Err(RegisterError::MixedTypes {
                expected,
                found: value.register_type(),
                index,
            });
        }

        write_varuint(WRITE_MULTIPLE_BASE + expected.tag(), &mut self.buf);
        write_varuint(start, &mut self.buf);
        write_varuint(values.len() as u32, &mut self.buf);
        for value in values {
            value.encode(&mut self.buf);
        }
        Ok(self)
    }

    /// The encoded payload so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the encoded payload.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Why reply parsing ended before the payload was used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStop {
    /// A sub-frame id outside the reply vocabulary.
    UnknownSubframe(u32),
    /// A sub-frame was cut short.
    Truncated,
    /// A multiple-register reply ran past the last register number.
    RegisterOverflow,
}

/// Values and errors reported by a device, keyed by register.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterReply {
    values: BTreeMap<Register, RegisterResult>,
    stop: Option<ParseStop>,
}

impl RegisterReply {
    pub fn get(&self, register: Register) -> Option<&RegisterResult> {
        self.values.get(&register)
    }

    /// The value for `register`, if present and not an error.
    pub fn value(&self, register: Register) -> Option<RegisterValue> {
        self.get(register).and_then(RegisterResult::value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, &RegisterResult)> + '_ {
        self.values.iter().map(|(register, result)| (*register, result))
    }

    /// Why parsing stopped early, if it did.
    pub fn stop(&self) -> Option<ParseStop> {
        self.stop
    }

    /// True when every byte of the payload was understood.
    pub fn is_complete(&self) -> bool {
        self.stop.is_none()
    }

    pub fn into_map(self) -> BTreeMap<Register, RegisterResult> {
        self.values
    }
}

enum Subframe {
    Entries(Vec<(Register, RegisterResult)>),
    End,
    Stop(ParseStop),
}

/// Parse every reply sub-frame in `payload`.
///
/// Parsing is lenient: an unknown sub-frame id or a truncated sub-frame ends
/// the parse and everything decoded so far is kept; [`RegisterReply::stop`]
/// records why. Only a malformed varuint is an error.
pub fn parse_register_reply(payload: &[u8]) -> Result<RegisterReply, VaruintError> {
    let mut src = payload;
    let mut reply = RegisterReply::default();

    loop {
        match parse_subframe(&mut src)? {
            Subframe::Entries(entries) => reply.values.extend(entries),
            Subframe::End => break,
            Subframe::Stop(stop) => {
                debug!(
                    ?stop,
                    parsed = reply.values.len(),
                    remaining = src.len(),
                    "register reply parse stopped early"
                );
                reply.stop = Some(stop);
                break;
            }
        }
    }

    Ok(reply)
}

fn parse_subframe(src: &mut &[u8]) -> Result<Subframe, VaruintError> {
    let Some(id) = read_varuint(src)? else {
        return Ok(Subframe::End);
    };

    let base = id & !REGISTER_TYPE_MASK;
    let ty = RegisterType::from_tag(id);

    let entries = if base == REPLY_SINGLE_BASE {
        let Some(register) = read_varuint(src)? else {
            return Ok(Subframe::Stop(ParseStop::Truncated));
        };
        let Some(value) = RegisterValue::decode(ty, src) else {
            return Ok(Subframe::Stop(ParseStop::Truncated));
        };
        vec![(register, RegisterResult::Value(value))]
    } else if base == REPLY_MULTIPLE_BASE {
        let (Some(start), Some(count)) = (read_varuint(src)?, read_varuint(src)?) else {
            return Ok(Subframe::Stop(ParseStop::Truncated));
        };
        if src.len() < (count as usize).saturating_mul(ty.size()) {
            return Ok(Subframe::Stop(ParseStop::Truncated));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let Some(register) = start.checked_add(offset) else {
                return Ok(Subframe::Stop(ParseStop::RegisterOverflow));
            };
            let Some(value) = RegisterValue::decode(ty, src) else {
                return Ok(Subframe::Stop(ParseStop::Truncated));
            };
            entries.push((register, RegisterResult::Value(value)));
        }
        entries
    } else if id == WRITE_ERROR || id == READ_ERROR {
        let (Some(register), Some(code)) = (read_varuint(src)?, read_varuint(src)?) else {
            return Ok(Subframe::Stop(ParseStop::Truncated));
        };
        vec![(register, RegisterResult::Error(code))]
    } else {
        return Ok(Subframe::Stop(ParseStop::UnknownSubframe(id)));
    };

    Ok(Subframe::Entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &[u8]) -> RegisterReply {
        parse_register_reply(payload).unwrap()
    }

    #[test]
    fn reply_single_int8() {
        let reply = parse(&[0x20, 0x10, 0x08]);
        assert_eq!(reply.len(), 1);
        assert_eq!(reply.value(0x10), Some(RegisterValue::Int8(0x08)));
        assert!(reply.is_complete());
    }

    #[test]
    fn reply_single_int16() {
        let reply = parse(&[0x21, 0x10, 0x02, 0x03]);
        assert_eq!(reply.value(0x10), Some(RegisterValue::Int16(0x0302)));
    }

    #[test]
    fn reply_single_int32() {
        let reply = parse(&[0x22, 0x10, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(reply.value(0x10), Some(RegisterValue::Int32(0x0605_0403)));
    }

    #[test]
    fn reply_single_float() {
        let reply = parse(&[0x23, 0x10, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(reply.value(0x10), Some(RegisterValue::Float(0.0)));
    }

    #[test]
    fn reply_multiple_int8() {
        let reply = parse(&[0x24, 0x10, 0x03, 0x04, 0x05, 0x06]);
        let expected: BTreeMap<_, _> = [
            (0x10, RegisterResult::Value(RegisterValue::Int8(4))),
            (0x11, RegisterResult::Value(RegisterValue::Int8(5))),
            (0x12, RegisterResult::Value(RegisterValue::Int8(6))),
        ]
        .into_iter()
        .collect();
        assert_eq!(reply.into_map(), expected);
    }

    #[test]
    fn concatenated_subframes_and_errors() {
        let reply = parse(&[
            0x21, 0x01, 0xff, 0xff, // reg 1: int16 -1
            0x28, 0x02, 0x07, // reg 2: write error 7
            0x29, 0x03, 0x85, 0x01, // reg 3: read error 0x85
        ]);
        assert_eq!(reply.value(1), Some(RegisterValue::Int16(-1)));
        assert_eq!(reply.get(2), Some(&RegisterResult::Error(7)));
        assert_eq!(reply.get(3), Some(&RegisterResult::Error(0x85)));
        assert!(reply.is_complete());
    }

    #[test]
    fn repeated_register_last_write_wins() {
        let reply = parse(&[0x20, 0x05, 0x01, 0x20, 0x05, 0x02]);
        assert_eq!(reply.len(), 1);
        assert_eq!(reply.value(5), Some(RegisterValue::Int8(2)));
    }

    #[test]
    fn unknown_subframe_keeps_earlier_entries() {
        let reply = parse(&[0x20, 0x10, 0x08, 0x41, 0x01, 0x00]);
        assert_eq!(reply.value(0x10), Some(RegisterValue::Int8(8)));
        assert_eq!(reply.stop(), Some(ParseStop::UnknownSubframe(0x41)));
    }

    #[test]
    fn truncated_tail_is_not_an_error() {
        let reply = parse(&[0x20, 0x10, 0x08, 0x22, 0x11, 0x01, 0x02]);
        assert_eq!(reply.len(), 1);
        assert_eq!(reply.stop(), Some(ParseStop::Truncated));
    }

    #[test]
    fn truncated_multiple_drops_whole_subframe() {
        let reply = parse(&[0x25, 0x10, 0x03, 0x01, 0x00, 0x02, 0x00]);
        assert!(reply.is_empty());
        assert_eq!(reply.stop(), Some(ParseStop::Truncated));
    }

    #[test]
    fn empty_payload_is_empty_reply() {
        let reply = parse(&[]);
        assert!(reply.is_empty());
        assert!(reply.is_complete());
    }

    #[test]
    fn overlong_varuint_is_an_error() {
        let result = parse_register_reply(&[0x20, 0x80, 0x80, 0x80, 0x80, 0x80]);
        assert_eq!(result, Err(VaruintError::Overlong));
    }

    #[test]
    fn request_encoding() {
        let mut request = RegisterRequest::new();
        request
            .read_single(0x10, RegisterType::Int16)
            .read_multiple(0x200, 3, RegisterType::Float)
            .write_single(0x05, RegisterValue::Int32(-2));

        assert_eq!(
            request.as_bytes(),
            &[
                0x19, 0x10, // read single int16
                0x1f, 0x80, 0x04, 0x03, // read multiple float, reg 0x200, count 3
                0x12, 0x05, 0xfe, 0xff, 0xff, 0xff, // write single int32 -2
            ]
        );
        assert!(request.expects_response());
    }

    #[test]
    fn write_multiple_encoding() {
        let mut request = RegisterRequest::new();
        request
            .write_multiple(
                0x20,
                &[RegisterValue::Float(1.0), RegisterValue::Float(-0.5)],
            )
            .unwrap();

        let mut expected = vec![0x17, 0x20, 0x02];
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        expected.extend_from_slice(&(-0.5f32).to_le_bytes());
        assert_eq!(request.as_bytes(), expected.as_slice());
        assert!(!request.expects_response());
    }

    #[test]
    fn write_multiple_rejects_mixed_types() {
        let mut request = RegisterRequest::new();
        let err = request
            .write_multiple(0, &[RegisterValue::Int8(1), RegisterValue::Int16(2)])
            .unwrap_err();
        assert_eq!(
            err,
            RegisterError::MixedTypes {
                expected: RegisterType::Int8,
                found: RegisterType::Int16,
                index: 1,
            }
        );
        assert!(request.is_empty());
    }

    #[test]
    fn write_multiple_rejects_empty() {
        let mut request = RegisterRequest::new();
        assert_eq!(
            request.write_multiple(0, &[]).unwrap_err(),
            RegisterError::EmptyValues
        );
    }

    #[test]
    fn write_only_request_can_ask_for_reply() {
        let mut request = RegisterRequest::new();
        request.write_single(1, RegisterValue::Int8(3));
        assert!(!request.expects_response());
        request.expect_response(true);
        assert!(request.expects_response());
        assert_eq!(request.len(), 3);
        assert_eq!(request.into_bytes().as_ref(), &[0x10, 0x01, 0x03]);
    }

    #[test]
    fn written_values_parse_back_as_reply() {
        for value in [
            RegisterValue::Int8(-100),
            RegisterValue::Int16(-30_000),
            RegisterValue::Int32(1 << 30),
            RegisterValue::Float(3.25),
        ] {
            let mut payload = BytesMut::new();
            write_varuint(REPLY_SINGLE_BASE + value.register_type().tag(), &mut payload);
            write_varuint(7, &mut payload);
            value.encode(&mut payload);
            assert_eq!(parse(&payload).value(7), Some(value));
        }
    }
}
