//! End-to-end meter tests over the in-memory transport
//!
//! Each test queues canned meter answers on a `MockTransport`, drives a
//! `V3Meter` or `V4Meter` through its public API and then checks the decoded
//! values, the command message and the exact frames that went out.


use frame_builder::{build_frame, corrupt, seal, ADDRESS};
use omnimeter_rs::constants::OMNI_TERMINATOR;
use omnimeter_rs::meter::frame::{password_frame, read_query, settings_read_frame, write_frame, QueryKind};
use omnimeter_rs::meter::observer::{MeterObserver, ObserverError};
use omnimeter_rs::meter::schema::{holidays_layout, months_layout, v3_layout, v4_a_layout, v4_b_layout};
use omnimeter_rs::meter::types::{
    CtRatio, DirectionFlag, LcdItem, MaxDemandPeriod, ReadMonths, Relay, RelayState, ScaleKwh,
};
use omnimeter_rs::meter::{ReadCommand, WriteCommand};
use omnimeter_rs::{FieldValue, MemorySink, Meter, MeterError, MockTransport, Password, ReadBuffer, V3Meter, V4Meter};
use std::sync::{Arc, Mutex};

const PASSWORD: &str = "00000000";

fn frame_a(scale: &str) -> Vec<u8> {
    build_frame(
        &v4_a_layout(),
        &[
            ("Meter_Address", ADDRESS),
            ("kWh_Tot", "00012345"),
            ("RMS_Watts_Ln_1", "0000999"),
            ("Cos_Theta_Ln_1", "L090"),
            ("State_Watts_Dir", &DirectionFlag::ReverseForwardForward.code().to_string()),
            ("kWh_Scale", scale),
            ("Meter_Time", "24063001120000"),
        ],
    )
}

fn frame_b() -> Vec<u8> {
    build_frame(
        &v4_b_layout(),
        &[
            ("Meter_Address", ADDRESS),
            ("kWh_Tariff_1", "00000125"),
            ("RMS_Watts_Ln_1", "0000100"),
            ("RMS_Watts_Ln_2", "0000050"),
            ("RMS_Watts_Ln_3", "0000030"),
            ("Cos_Theta_Ln_1", "L080"),
            ("Cos_Theta_Ln_2", "C080"),
            ("Cos_Theta_Ln_3", " 100"),
            ("CT_Ratio", "0200"),
            ("Meter_Time", "24063001120005"),
        ],
    )
}

fn v4_meter() -> (V4Meter, MockTransport, MemorySink) {
    let sink = MemorySink::new();
    let mut meter = V4Meter::with_sink(ADDRESS, Arc::new(sink.clone()));
    let mock = MockTransport::new();
    meter.attach_port(Box::new(mock.clone()));
    (meter, mock, sink)
}

fn queue_read(mock: &MockTransport) {
    mock.queue_response(&frame_a("1"));
    mock.queue_response(&frame_b());
}

fn query(kind: QueryKind) -> Vec<u8> {
    read_query(ADDRESS, kind).to_vec()
}

fn password() -> Vec<u8> {
    password_frame(&Password::new(PASSWORD).unwrap()).to_vec()
}

/// Tests that a v4 read decodes both frames, derives net watts and power
/// factors, and sends A query, B query and terminator in that order.
#[test]
fn test_v4_dual_frame_read() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);

    meter.request(true).unwrap();

    assert_eq!(meter.get_field("kWh_Tot"), Some("1234.5"));
    assert_eq!(meter.get_field("kWh_Tariff_1"), Some("12.5"));
    assert_eq!(meter.get_field("Net_Calc_Watts_Ln_1"), Some("-100"));
    assert_eq!(meter.get_field("Net_Calc_Watts_Ln_2"), Some("50"));
    assert_eq!(meter.get_field("Net_Calc_Watts_Ln_3"), Some("30"));
    assert_eq!(meter.get_field("Net_Calc_Watts_Tot"), Some("-20"));
    assert_eq!(meter.get_field("Power_Factor_Ln_1"), Some("80"));
    assert_eq!(meter.get_field("Power_Factor_Ln_2"), Some("120"));
    assert_eq!(meter.get_field("Power_Factor_Ln_3"), Some("100"));
    assert_eq!(meter.get_field("Meter_Address"), Some(ADDRESS));

    let sent = mock.sent_frames();
    assert_eq!(sent, vec![query(QueryKind::A), query(QueryKind::B), OMNI_TERMINATOR.to_vec()]);
}

/// Tests that fields present in both frames take the B frame value.
#[test]
fn test_b_frame_wins_merge() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    meter.request(true).unwrap();

    assert_eq!(meter.get_field("RMS_Watts_Ln_1"), Some("100"));
    assert_eq!(meter.get_field("Cos_Theta_Ln_1"), Some("L080"));
    assert_eq!(meter.get_field("Meter_Time"), Some("24063001120005"));
    assert!(meter.get_field("reserved_1").is_none());
    assert!(meter.get_field("crc16").is_none());
}

/// Tests that a request without terminator leaves the session open.
#[test]
fn test_request_without_terminator() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    meter.request(false).unwrap();
    assert_eq!(mock.sent_frames().len(), 2);
}

/// Tests that a corrupted B frame fails the read, keeps the unified buffer
/// empty and still terminates the session.
#[test]
fn test_checksum_failure_on_b() {
    let (mut meter, mock, sink) = v4_meter();
    let mut b = frame_b();
    corrupt(&mut b, 40);
    mock.queue_response(&frame_a("1"));
    mock.queue_response(&b);

    let err = meter.request(true).unwrap_err();
    assert!(matches!(err, MeterError::Checksum { .. }));
    assert!(meter.get_field("kWh_Tot").is_none());
    assert_eq!(mock.sent_frames().last().unwrap(), &OMNI_TERMINATOR.to_vec());
    assert!(sink.contains("Checksum mismatch"));
}

/// Tests that the kWh precision is taken from the first good A frame and
/// reused for later reads.
#[test]
fn test_precision_cached_from_first_a_frame() {
    let (mut meter, mock, _) = v4_meter();
    mock.queue_response(&frame_a("2"));
    mock.queue_response(&frame_b());
    meter.request(true).unwrap();
    assert_eq!(meter.get_field("kWh_Tot"), Some("123.45"));
    assert_eq!(meter.core().kwh_precision(), Some(2));

    mock.queue_response(&frame_a("0"));
    mock.queue_response(&frame_b());
    meter.request(true).unwrap();
    assert_eq!(meter.get_field("kWh_Tot"), Some("123.45"));
}

/// Tests that an explicit precision override beats the frame's scale code.
#[test]
fn test_precision_override() {
    let (mut meter, mock, _) = v4_meter();
    meter.set_precision_override(Some(ScaleKwh::NoScale));
    queue_read(&mock);
    meter.request(true).unwrap();
    assert_eq!(meter.get_field("kWh_Tot"), Some("12345.0"));
}

/// Tests that an unreadable scale code resolves to no scaling and the B frame
/// decodes with the same precision as the A frame.
#[test]
fn test_unreadable_scale_code_applies_to_both_frames() {
    let (mut meter, mock, sink) = v4_meter();
    mock.queue_response(&frame_a("x"));
    mock.queue_response(&frame_b());
    meter.request(true).unwrap();

    assert_eq!(meter.get_field("kWh_Tot"), Some("12345.0"));
    assert_eq!(meter.get_field("kWh_Tariff_1"), Some("125.0"));
    assert_eq!(meter.core().kwh_precision(), Some(i64::from(ScaleKwh::NoScale.code())));
    assert!(sink.contains("kWh_Scale unreadable"));
    assert!(!sink.contains("assuming Scale10"));
}

/// Tests that a v3 meter reads one frame with fixed tenth-kWh precision.
#[test]
fn test_v3_single_frame_read() {
    let sink = MemorySink::new();
    let mut meter = V3Meter::with_sink("300001162", Arc::new(sink));
    let mock = MockTransport::new();
    meter.attach_port(Box::new(mock.clone()));
    mock.queue_response(&build_frame(
        &v3_layout(),
        &[
            ("Meter_Address", "000300001162"),
            ("kWh_Tot", "00012345"),
            ("Max_Demand", "00000420"),
            ("Cos_Theta_Ln_1", "C075"),
        ],
    ));

    meter.request(true).unwrap();

    assert_eq!(meter.get_field("kWh_Tot"), Some("1234.5"));
    assert_eq!(meter.get_field("Max_Demand"), Some("42.0"));
    assert_eq!(meter.get_field("Power_Factor_Ln_1"), Some("125"));
    assert_eq!(
        mock.sent_frames(),
        vec![read_query("000300001162", QueryKind::Single).to_vec(), OMNI_TERMINATOR.to_vec()]
    );
}

/// Tests the full write sequence: pre-read, password, write, terminator.
#[test]
fn test_set_ct_ratio_success() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_ack();
    mock.queue_ack();

    meter.set_ct_ratio(CtRatio::Amps200, PASSWORD).unwrap();

    assert_eq!(meter.command_message(), "Success(setCTRatio): 06 returned.");
    let sent = mock.sent_frames();
    assert_eq!(sent.len(), 5);
    assert_eq!(sent[2], password());
    assert_eq!(sent[3], write_frame(WriteCommand::CtRatio, b"0200").to_vec());
    assert_eq!(sent[4], OMNI_TERMINATOR.to_vec());
}

/// Tests that a rejected password stops the write and still terminates.
#[test]
fn test_password_failure() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_silence();

    let err = meter.set_max_demand_period(MaxDemandPeriod::ThirtyMinutes, PASSWORD).unwrap_err();

    assert!(matches!(err, MeterError::Auth(_)));
    assert_eq!(meter.command_message(), "Password failure");
    let sent = mock.sent_frames();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[3], OMNI_TERMINATOR.to_vec());
}

/// Tests that a write without ACK is a protocol error.
#[test]
fn test_write_not_acknowledged() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_ack();
    mock.queue_silence();

    let err = meter.set_max_demand_reset_now(PASSWORD).unwrap_err();

    assert!(matches!(err, MeterError::Protocol(_)));
    assert_eq!(meter.command_message(), "Failure(setMaxDemandResetNow): no 06 returned.");
    assert_eq!(mock.sent_frames().last().unwrap(), &OMNI_TERMINATOR.to_vec());
}

/// Tests that a failed pre-read aborts the write before the password.
#[test]
fn test_pre_read_failure() {
    let (mut meter, mock, _) = v4_meter();

    let err = meter.set_ct_ratio(CtRatio::Amps400, PASSWORD).unwrap_err();

    assert!(matches!(err, MeterError::Transport(_)));
    assert_eq!(meter.command_message(), "Bad read CRC on setting");
    assert_eq!(mock.sent_frames(), vec![query(QueryKind::A), OMNI_TERMINATOR.to_vec()]);
}

/// Tests that relay writes pre-read only the A frame.
#[test]
fn test_relay_pre_reads_a_only() {
    let (mut meter, mock, _) = v4_meter();
    mock.queue_response(&frame_a("1"));
    mock.queue_ack();
    mock.queue_ack();

    meter.set_relay(15, Relay::Relay2, RelayState::Close, PASSWORD).unwrap();

    let sent = mock.sent_frames();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0], query(QueryKind::A));
    assert_eq!(sent[2], write_frame(WriteCommand::Relay(Relay::Relay2), b"10015").to_vec());
}

/// Tests the LCD payload is forty zero filled two digit codes.
#[test]
fn test_set_lcd_payload() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_ack();
    mock.queue_ack();

    meter.set_lcd(&[LcdItem::KwhTot, LcdItem::RmsWattsTot], PASSWORD).unwrap();

    let mut payload = b"0112".to_vec();
    payload.resize(80, b'0');
    assert_eq!(mock.sent_frames()[3], write_frame(WriteCommand::Lcd, &payload).to_vec());
}

/// Tests that out-of-range parameters fail without touching the line.
#[test]
fn test_validation_has_no_io() {
    let (mut meter, mock, _) = v4_meter();

    let err = meter.assign_holiday_date(20, 1, 1).unwrap_err();
    assert!(err.is_validation());
    assert!(meter.set_ct_ratio(CtRatio::Amps200, "123").unwrap_err().is_validation());
    assert!(meter.set_relay(10_000, Relay::Relay1, RelayState::Open, PASSWORD).unwrap_err().is_validation());
    assert!(meter.set_lcd(&[], PASSWORD).unwrap_err().is_validation());
    assert!(meter.set_time(23, 2, 30, 0, 0, 0, PASSWORD).unwrap_err().is_validation());
    assert!(meter.set_weekend_holiday_schedules(8, 0, PASSWORD).unwrap_err().is_validation());
    assert_eq!(meter.command_message(), "Out of bounds: weekend schedule 8 holiday schedule 0");

    assert!(mock.sent_frames().is_empty());
    assert_eq!(mock.poll_count(), 0);
}

/// Tests the set time payload, including the computed weekday.
#[test]
fn test_set_time_payload() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_ack();
    mock.queue_ack();

    // 2024-06-30 is a Sunday.
    meter.set_time(24, 6, 30, 13, 5, 9, PASSWORD).unwrap();

    assert_eq!(
        mock.sent_frames()[3],
        write_frame(WriteCommand::Time, b"24063007130509").to_vec()
    );
}

/// Tests reading holidays: pre-read, settings frame, terminator, decode.
#[test]
fn test_read_holiday_dates() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_response(&build_frame(
        &holidays_layout(),
        &[
            ("Holiday_1_Mon", "12"),
            ("Holiday_1_Day", "25"),
            ("Weekend_Schd", "02"),
            ("Holiday_Schd", "03"),
        ],
    ));

    meter.read_holiday_dates().unwrap();

    let holiday = meter.extract_holiday_date(0);
    assert_eq!((holiday.holiday.as_str(), holiday.month.as_str(), holiday.day.as_str()), ("1", "12", "25"));
    let schedules = meter.extract_holiday_weekend_schedules();
    assert_eq!((schedules.weekend.as_str(), schedules.holiday.as_str()), ("2", "3"));
    let sent = mock.sent_frames();
    assert_eq!(sent[2], settings_read_frame(ReadCommand::HolidayDates).to_vec());
    assert_eq!(sent[3], OMNI_TERMINATOR.to_vec());
}

/// Tests that month totals decode with the precision of the last A frame.
#[test]
fn test_read_month_tariffs() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    mock.queue_response(&build_frame(
        &months_layout(),
        &[("Month_1_Tot", "00004567"), ("Month_1_Tariff_2", "00000010")],
    ));

    meter.read_month_tariffs(ReadMonths::Kwh).unwrap();

    let month = meter.extract_month_tariff(0);
    assert_eq!(month.kwh_tot, "456.7");
    assert_eq!(month.kwh_tariff[1], "1.0");
    assert_eq!(month.month, "1");
}

/// Tests that read_settings stops at the first failing block.
#[test]
fn test_read_settings_stops_on_failure() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    let mut holidays = build_frame(&holidays_layout(), &[]);
    corrupt(&mut holidays, 10);
    mock.queue_response(&holidays);

    assert!(meter.read_settings().is_err());
    assert_eq!(mock.sent_frames().len(), 4);
    assert_eq!(mock.pending_responses(), 0);
}

struct Counter(Arc<Mutex<Vec<String>>>);

impl MeterObserver for Counter {
    fn update(&mut self, buffer: &ReadBuffer) -> Result<(), ObserverError> {
        let kwh = buffer.formatted("kWh_Tot").unwrap_or("").to_string();
        self.0.lock().unwrap().push(kwh);
        Ok(())
    }
}

struct Failing;

impl MeterObserver for Failing {
    fn update(&mut self, _buffer: &ReadBuffer) -> Result<(), ObserverError> {
        Err(ObserverError("store offline".into()))
    }
}

/// Tests that observers run in order and a failing one does not stop the rest.
#[test]
fn test_observers_notified_after_read() {
    let (mut meter, mock, sink) = v4_meter();
    let seen = Arc::new(Mutex::new(Vec::new()));
    meter.register_observer(Box::new(Failing));
    meter.register_observer(Box::new(Counter(seen.clone())));
    queue_read(&mock);

    meter.request(true).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["1234.5".to_string()]);
    assert!(sink.contains("store offline"));

    // A failed read notifies nobody.
    meter.request(true).unwrap_err();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

/// Tests that an unregistered observer is no longer notified and is handed
/// back exactly once.
#[test]
fn test_unregister_observer() {
    let (mut meter, mock, _) = v4_meter();
    let kept = Arc::new(Mutex::new(Vec::new()));
    let dropped = Arc::new(Mutex::new(Vec::new()));
    meter.register_observer(Box::new(Counter(kept.clone())));
    let id = meter.register_observer(Box::new(Counter(dropped.clone())));

    assert!(meter.unregister_observer(id).is_some());
    assert!(meter.unregister_observer(id).is_none());

    queue_read(&mock);
    meter.request(true).unwrap();
    assert_eq!(kept.lock().unwrap().len(), 1);
    assert!(dropped.lock().unwrap().is_empty());
}

/// Tests that the snapshot carries native values and both raw frames.
#[test]
fn test_snapshot_after_read() {
    let (mut meter, mock, _) = v4_meter();
    queue_read(&mock);
    meter.request(true).unwrap();

    let snapshot = meter.snapshot();
    assert_eq!(snapshot.address, ADDRESS);
    assert_eq!(snapshot.fields.get("Net_Calc_Watts_Tot").unwrap().native, FieldValue::Int(-20));
    assert_eq!(snapshot.raw_a.len(), 510);
    assert_eq!(snapshot.raw_b.len(), 510);

    let json = meter.render_json().unwrap();
    assert!(json.starts_with("{\n  \"Meter_Address\": \"000300001463\""));
}

/// Tests that a port can be moved from one meter to another.
#[test]
fn test_port_moves_between_meters() {
    let (mut first, mock, _) = v4_meter();
    let mut second = V4Meter::new("300001464");
    let port = first.detach_port().unwrap();
    second.attach_port(port);

    assert!(first.request(true).is_err());
    let mut a = frame_a("1");
    a[4..16].copy_from_slice(b"000300001464");
    seal(&mut a);
    mock.queue_response(&a);
    mock.queue_response(&frame_b());
    second.request(true).unwrap();
    assert_eq!(mock.sent_frames()[0], read_query("300001464", QueryKind::A).to_vec());
}
