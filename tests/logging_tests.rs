//! Unit tests for the logging functionality in the `omnimeter-rs` crate.

use log::Level;
use omnimeter_rs::logging::{init_logger, log_debug, log_error, log_info, log_warn, LogSink, MemorySink, NullSink};
use omnimeter_rs::{Meter, MockTransport, V4Meter};
use std::sync::Arc;

/// Tests that the logging helpers work as expected.
#[test]
fn test_logging() {
    // Just ensure logging functions do not panic after init.
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
}

/// Tests that the logger is correctly initialized, more than once.
#[test]
fn test_init_logger() {
    init_logger();
    init_logger();
}

/// Tests that the memory sink prefixes lines with their context.
#[test]
fn test_memory_sink_context() {
    let sink = MemorySink::new();
    sink.log(Level::Info, "setCTRatio", "Password accepted");
    sink.log(Level::Warn, "", "Empty return read.");
    let lines = sink.lines();
    assert_eq!(lines[0], (Level::Info, "(setCTRatio) Password accepted".to_string()));
    assert_eq!(lines[1], (Level::Warn, "Empty return read.".to_string()));
}

/// Tests that a meter writes its diagnostics to the injected sink only.
#[test]
fn test_meter_uses_injected_sink() {
    let sink = MemorySink::new();
    let mut meter = V4Meter::with_sink("300001463", Arc::new(sink.clone()));
    meter.attach_port(Box::new(MockTransport::new()));

    assert!(meter.set_max_demand_reset_now("00000000").is_err());

    assert!(sink.contains("Context: setMaxDemandResetNow"));
    assert!(sink.contains("(request[v4A]) Empty return read."));
    assert!(sink.contains("(setMaxDemandResetNow) (writeCmdMsg) Bad read CRC on setting"));
}

/// Tests that the null sink swallows everything.
#[test]
fn test_null_sink() {
    let mut meter = V4Meter::with_sink("1", Arc::new(NullSink));
    assert!(meter.request(true).is_err());
}
