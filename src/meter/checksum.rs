//! # Frame Checksum
//!
//! Omnimeters protect every command and every read response with a 16-bit
//! table driven checksum (reflected polynomial `0xA001`, initial value
//! `0xFFFF`). The register is byte swapped and masked with `0x7F7F` so both
//! checksum bytes survive a 7-bit serial link.
//!
//! Outgoing frames carry the checksum of everything after the leading SOH
//! byte. Incoming 255 byte frames declare theirs in the last two bytes and
//! are checked over `raw[1..253]`.

use crate::constants::{OMNI_CHECKSUM_END, OMNI_CHECKSUM_MASK, OMNI_CHECKSUM_START, OMNI_FRAME_LEN};
use crate::error::MeterError;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Lookup table, one entry per byte value.
pub static CRC_TABLE: [u16; 256] = build_table();

/// Computes the masked, byte swapped checksum of `buf`.
pub fn checksum(buf: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buf {
        crc = (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u16) & 0xFF) as usize];
    }
    crc.swap_bytes() & OMNI_CHECKSUM_MASK
}

/// Checksum rendered as four lowercase hex digits.
pub fn checksum_hex(buf: &[u8]) -> String {
    format!("{:04x}", checksum(buf))
}

/// Checksum as the two bytes appended to a command frame.
pub fn checksum_bytes(buf: &[u8]) -> [u8; 2] {
    checksum(buf).to_be_bytes()
}

/// True if `declared` is the checksum of `payload`.
pub fn verify(payload: &[u8], declared: u16) -> bool {
    checksum(payload) == declared
}

/// Checks a full response frame against the checksum in its last two bytes.
pub fn verify_response(raw: &[u8]) -> Result<(), MeterError> {
    if raw.len() != OMNI_FRAME_LEN {
        return Err(MeterError::Frame(format!(
            "expected {} bytes, got {}",
            OMNI_FRAME_LEN,
            raw.len()
        )));
    }
    let declared = u16::from_be_bytes([raw[OMNI_CHECKSUM_END], raw[OMNI_CHECKSUM_END + 1]]);
    let computed = checksum(&raw[OMNI_CHECKSUM_START..OMNI_CHECKSUM_END]);
    if declared != computed {
        return Err(MeterError::Checksum { declared, computed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_edges() {
        assert_eq!(CRC_TABLE[0], 0x0000);
        assert_eq!(CRC_TABLE[1], 0xc0c1);
        assert_eq!(CRC_TABLE[2], 0xc181);
        assert_eq!(CRC_TABLE[3], 0x0140);
        assert_eq!(CRC_TABLE[255], 0x4040);
    }

    #[test]
    fn test_known_vector() {
        // Unmasked register for "123456789" is 0x4b37, swapped 0x374b.
        assert_eq!(checksum(b"123456789"), 0x374b);
        assert_eq!(checksum_hex(b"123456789"), "374b");
    }

    #[test]
    fn test_empty_buffer() {
        // 0xffff swapped and masked
        assert_eq!(checksum(&[]), 0x7f7f);
    }

    #[test]
    fn test_result_is_seven_bit_clean() {
        for seed in 0u8..=255 {
            let buf = [seed, seed.wrapping_mul(7), 0x55, seed ^ 0xAA];
            let [hi, lo] = checksum_bytes(&buf);
            assert!(hi < 0x80 && lo < 0x80);
        }
    }

    #[test]
    fn test_verify_response_rejects_short_frame() {
        let err = verify_response(&[0u8; 10]).unwrap_err();
        assert_eq!(err.category(), "frame");
    }
}
