//! Frame decoding tests against the real meter layouts.


use frame_builder::{build_frame, ADDRESS};
use omnimeter_rs::logging::MemorySink;
use omnimeter_rs::meter::decoder::{decode, kwh_divisor, read_scale_code};
use omnimeter_rs::meter::schema::{field, schedules_layout, v4_a_layout, v4_b_layout, FieldValue};
use omnimeter_rs::meter::types::ReadSchedules;
use omnimeter_rs::MeterError;

fn a_frame() -> Vec<u8> {
    build_frame(
        &v4_a_layout(),
        &[
            (field::METER_ADDRESS, ADDRESS),
            (field::KWH_TOT, "00001255"),
            (field::RMS_VOLTS_LN_1, "1202"),
            (field::AMPS_LN_1, "00153"),
            (field::LINE_FREQ, "5998"),
            (field::STATE_WATTS_DIR, "2"),
            (field::KWH_SCALE, "2"),
            (field::METER_TIME, "24063001120000"),
        ],
    )
}

/// Tests scaling of every float flavour in the A frame.
#[test]
fn test_a_frame_values() {
    let sink = MemorySink::new();
    let raw = a_frame();
    let mut buf = v4_a_layout();
    let code = read_scale_code(&raw, &buf).unwrap();
    assert_eq!(code, 2);

    decode(&raw, &mut buf, code, &sink, "test").unwrap();

    assert_eq!(buf.native(field::KWH_TOT), Some(&FieldValue::Float(12.55)));
    assert_eq!(buf.formatted(field::RMS_VOLTS_LN_1), Some("120.2"));
    assert_eq!(buf.formatted(field::AMPS_LN_1), Some("15.3"));
    assert_eq!(buf.formatted(field::LINE_FREQ), Some("59.98"));
    assert_eq!(buf.native(field::STATE_WATTS_DIR), Some(&FieldValue::Int(2)));
    assert_eq!(buf.formatted(field::METER_ADDRESS), Some(ADDRESS));
    assert_eq!(buf.formatted("reserved_1"), Some("30"));
    assert!(sink.lines().is_empty());
}

/// Tests that decoding the same frame twice gives the same buffer.
#[test]
fn test_decode_is_idempotent() {
    let sink = MemorySink::new();
    let raw = a_frame();
    let mut once = v4_a_layout();
    decode(&raw, &mut once, 2, &sink, "test").unwrap();
    let mut twice = once.clone();
    decode(&raw, &mut twice, 2, &sink, "test").unwrap();
    assert_eq!(once, twice);
}

/// Tests that calculated fields survive a decode untouched.
#[test]
fn test_calculated_fields_untouched() {
    let sink = MemorySink::new();
    let raw = build_frame(&v4_b_layout(), &[]);
    let mut buf = v4_b_layout();
    buf.set(field::NET_CALC_WATTS_TOT, "-20".into(), FieldValue::Int(-20));
    decode(&raw, &mut buf, 1, &sink, "test").unwrap();
    assert_eq!(buf.formatted(field::NET_CALC_WATTS_TOT), Some("-20"));
}

/// Tests that a frame of the wrong length is rejected whole.
#[test]
fn test_short_frame_rejected() {
    let sink = MemorySink::new();
    let mut buf = v4_a_layout();
    let err = decode(&a_frame()[..200], &mut buf, 1, &sink, "test").unwrap_err();
    assert!(matches!(err, MeterError::Frame(_)));
    assert_eq!(buf.formatted(field::KWH_TOT), Some(""));
}

/// Tests that a garbled float is logged and left empty while the rest decodes.
#[test]
fn test_garbled_float_skipped() {
    let sink = MemorySink::new();
    let raw = build_frame(&v4_a_layout(), &[(field::KWH_TOT, "12ab5678"), (field::RMS_WATTS_LN_1, "0000042")]);
    let mut buf = v4_a_layout();
    decode(&raw, &mut buf, 1, &sink, "request[v4A]").unwrap();
    assert_eq!(buf.formatted(field::KWH_TOT), Some(""));
    assert_eq!(buf.native(field::RMS_WATTS_LN_1), Some(&FieldValue::Int(42)));
    assert!(sink.contains("(request[v4A]) Field kWh_Tot not decoded"));
}

/// Tests schedule tariff values decode as integers.
#[test]
fn test_schedule_block() {
    let sink = MemorySink::new();
    let layout = schedules_layout(ReadSchedules::Schedules5To8);
    let raw = build_frame(&layout, &[("Schd_6_Tariff_2_Hour", "07"), ("Schd_6_Tariff_2_Min", "30")]);
    let mut buf = layout;
    decode(&raw, &mut buf, 1, &sink, "test").unwrap();
    assert_eq!(buf.formatted("Schd_6_Tariff_2_Hour"), Some("7"));
    assert_eq!(buf.formatted("Schd_6_Tariff_2_Min"), Some("30"));
}

/// Tests the kWh divisor table.
#[test]
fn test_kwh_divisor() {
    assert_eq!(kwh_divisor(0), Ok(1.0));
    assert_eq!(kwh_divisor(1), Ok(10.0));
    assert_eq!(kwh_divisor(2), Ok(100.0));
    assert_eq!(kwh_divisor(3), Err(3));
}
