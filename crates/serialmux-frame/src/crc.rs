//! CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no xorout).

const POLY: u16 = 0x1021;
const INIT: u16 = 0xffff;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Checksum of `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(INIT, |crc, &byte| {
        let index = ((crc >> 8) ^ u16::from(byte)) & 0xff;
        (crc << 8) ^ TABLE[index as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        // Standard check input for CRC-16/CCITT-FALSE.
        assert_eq!(crc16(b"123456789"), 0x29b1);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc16(&[]), 0xffff);
    }

    #[test]
    fn known_stream_frame() {
        let frame = [
            0x54, 0xab, 0x00, 0x05, 0x07, 0x40, 0x01, 0x04, b't', b'e', b's', b't',
        ];
        assert_eq!(crc16(&frame), 0xa001);
    }
}
