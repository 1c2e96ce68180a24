//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used to render `Hex` fields, log raw frames and load canned
//! frames from text.
//!
//! ## Usage
//!
//! ```rust
//! use omnimeter_rs::util::hex::{encode_hex, decode_hex, pretty_hex};
//!
//! let data = [0x01, 0x42, 0x30, 0x03, 0x75];
//! let hex_str = encode_hex(&data);
//! assert_eq!(hex_str, "0142300375");
//!
//! let decoded = decode_hex(&hex_str).unwrap();
//! assert_eq!(decoded, data);
//!
//! println!("{}", pretty_hex(&data, 16));
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Pretty-print hex data with offsets and an ASCII column.
///
/// Omnimeter frames are mostly printable ASCII, so the right hand column is
/// usually the quickest way to eyeball a response.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    if data.is_empty() || bytes_per_line == 0 {
        return String::new();
    }

    let lines: Vec<String> = data
        .chunks(bytes_per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("{:04x}: ", i * bytes_per_line);
            for byte in chunk {
                line.push_str(&format!("{byte:02x} "));
            }
            for _ in chunk.len()..bytes_per_line {
                line.push_str("   ");
            }
            line.push('|');
            for &byte in chunk {
                if byte.is_ascii_graphic() || byte == b' ' {
                    line.push(byte as char);
                } else {
                    line.push('.');
                }
            }
            line.push('|');
            line
        })
        .collect();

    lines.join("\n")
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "01 42 30 03 75" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
