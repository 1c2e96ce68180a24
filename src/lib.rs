//! # omnimeter-rs - A Rust Crate for EKM Omnimeter Serial Communication
//!
//! The omnimeter-rs crate talks to EKM Omnimeter v3 and v4 electricity meters
//! over an RS-485 serial line (9600 baud, 7E1).
//!
//! ## Features
//!
//! - Read a v3 single frame or a v4 A/B frame pair and decode it into named
//!   fields with kWh precision scaling
//! - Derived power factor and signed net power
//! - Every password protected write command (time, CT ratio, max demand,
//!   relays, pulse ratios, LCD rotation, tariff schedules, seasons, holidays)
//! - Settings reads of tariff schedules, monthly totals and holiday dates
//! - Observer notification and serde snapshots after each read
//! - Pluggable transport, with an in-memory mock for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use omnimeter_rs::{default_sink, Meter, PollConfig, SerialConfig, SerialTransport, V4Meter};
//!
//! # fn main() -> Result<(), omnimeter_rs::MeterError> {
//! let sink = default_sink();
//! let port = SerialTransport::new("/dev/ttyUSB0", SerialConfig::default(), PollConfig::default(), sink.clone());
//! let mut meter = V4Meter::with_sink("300001463", sink);
//! meter.attach_port(Box::new(port));
//! meter.request(true)?;
//! println!("{:?}", meter.get_field("RMS_Watts_Tot"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod meter;
pub mod util;

pub use crate::config::{MeterConfig, MeterEntry};
pub use crate::error::MeterError;
pub use crate::logging::{
    default_sink, init_logger, log_debug, log_error, log_info, log_warn, FacadeSink, LogSink, MemorySink, NullSink,
    SharedSink,
};

pub use meter::{
    meter_for, net_watts, power_factor, render_json, CommandProtocol, FieldValue, Generation, Meter, MeterObserver,
    MeterSnapshot, MockTransport, ObserverId, Password, PollConfig, ReadBuffer, SerialConfig, SerialTransport, Transport,
    V3Meter, V4Meter,
};
