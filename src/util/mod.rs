//! # Utility Modules
//!
//! Common helpers used throughout the omnimeter-rs crate.

pub mod hex;

pub use hex::{decode_hex, encode_hex, format_hex_compact, pretty_hex, HexError};
