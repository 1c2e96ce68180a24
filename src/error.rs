//! # Omnimeter Error Handling
//!
//! This module defines the MeterError enum, which represents the different error
//! types that can occur in the omnimeter-rs crate.
//!
//! `Validation` is raised before any byte is written to the line. Every other
//! variant is produced mid-sequence and has already been logged with the active
//! command context by the time the caller sees it.

use thiserror::Error;

/// Represents the different error types that can occur in the Omnimeter crate.
#[derive(Debug, Error)]
pub enum MeterError {
    /// The serial line is not open or no bytes arrived within the wait budget.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response frame had the wrong length or could not be unpacked.
    #[error("Frame error: {0}")]
    Frame(String),

    /// Computed checksum does not match the one declared in the frame.
    #[error("Checksum mismatch: declared {declared:04x}, computed {computed:04x}")]
    Checksum { declared: u16, computed: u16 },

    /// The password sub-exchange was rejected or never acknowledged.
    #[error("Password failure: {0}")]
    Auth(String),

    /// An ACK was expected after a command frame and did not arrive.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A caller supplied parameter is outside its documented bounds.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration file or value could not be used.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeterError {
    /// Short, stable name of the error category, used as a log prefix.
    pub fn category(&self) -> &'static str {
        match self {
            MeterError::Transport(_) => "transport",
            MeterError::Frame(_) => "frame",
            MeterError::Checksum { .. } => "checksum",
            MeterError::Auth(_) => "auth",
            MeterError::Protocol(_) => "protocol",
            MeterError::Validation(_) => "validation",
            MeterError::Config(_) => "config",
            MeterError::Io(_) => "io",
            MeterError::Json(_) => "json",
        }
    }

    /// True for errors detected before any I/O took place.
    pub fn is_validation(&self) -> bool {
        matches!(self, MeterError::Validation(_))
    }
}

impl From<tokio_serial::Error> for MeterError {
    fn from(err: tokio_serial::Error) -> Self {
        MeterError::Transport(err.to_string())
    }
}
