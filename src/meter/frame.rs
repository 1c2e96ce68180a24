//! # Omnimeter Command Frames
//!
//! Builders for every frame the client sends:
//!
//! | Frame | Layout |
//! |---|---|
//! | read query | `/?` address selector `!\r\n` |
//! | password | `SOH P1 STX ( password ) ETX` checksum |
//! | write | `SOH W1 STX` code `(` payload `) ETX` checksum |
//! | settings read | `SOH R1 STX` code `( ) ETX` checksum |
//! | terminator | `SOH B0 ETX u` |
//!
//! Codes are four ASCII characters: a two digit group (`00`) followed by the
//! setting code. Payload values are zero padded ASCII decimal digits. The
//! checksum covers everything after SOH and is appended as two bytes.

use crate::constants::{
    OMNI_ACK, OMNI_ETX, OMNI_QUERY_PREFIX, OMNI_QUERY_SUFFIX, OMNI_SOH, OMNI_STX,
    OMNI_TERMINATOR, OMNI_V4_SELECT_A, OMNI_V4_SELECT_B,
};
use crate::meter::checksum::checksum_bytes;
use crate::meter::password::Password;
use crate::meter::types::{PulseInput, ReadMonths, ReadSchedules, Relay};
use bytes::{BufMut, Bytes, BytesMut};

/// Which frame a read query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// v3 meters answer a bare query.
    Single,
    /// v4 A frame.
    A,
    /// v4 B frame.
    B,
}

/// Setting changed by a write frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCommand {
    MaxDemandPeriod,
    MaxDemandResetInterval,
    Password,
    MaxDemandResetNow,
    Time,
    CtRatio,
    /// Zero based schedule index.
    ScheduleTariffs(u8),
    SeasonSchedules,
    HolidayDates,
    WeekendHolidaySchedules,
    Relay(Relay),
    PulseInputRatio(PulseInput),
    ZeroResettableKwh,
    PulseOutputRatio,
    Lcd,
}

impl WriteCommand {
    /// The four character subcommand code.
    pub fn code(self) -> [u8; 4] {
        match self {
            WriteCommand::MaxDemandPeriod => *b"0050",
            WriteCommand::MaxDemandResetInterval => *b"00D5",
            WriteCommand::Password => *b"0020",
            WriteCommand::MaxDemandResetNow => *b"0040",
            WriteCommand::Time => *b"0060",
            WriteCommand::CtRatio => *b"00D0",
            WriteCommand::ScheduleTariffs(schedule) => [b'0', b'0', b'7', digit(schedule)],
            WriteCommand::SeasonSchedules => *b"0080",
            WriteCommand::HolidayDates => *b"00B0",
            WriteCommand::WeekendHolidaySchedules => *b"00C0",
            WriteCommand::Relay(relay) => [b'0', b'0', b'8', digit(relay.code())],
            WriteCommand::PulseInputRatio(line) => [b'0', b'0', b'A', digit(line.code() - 1)],
            WriteCommand::ZeroResettableKwh => *b"00D3",
            WriteCommand::PulseOutputRatio => *b"00D4",
            WriteCommand::Lcd => *b"00D2",
        }
    }

    /// Context label used in logs and command messages.
    pub fn label(self) -> &'static str {
        match self {
            WriteCommand::MaxDemandPeriod => "setMaxDemandPeriod",
            WriteCommand::MaxDemandResetInterval => "setMaxDemandResetInterval",
            WriteCommand::Password => "setMeterPassword",
            WriteCommand::MaxDemandResetNow => "setMaxDemandResetNow",
            WriteCommand::Time => "setTime",
            WriteCommand::CtRatio => "setCTRatio",
            WriteCommand::ScheduleTariffs(_) => "setScheduleTariffs",
            WriteCommand::SeasonSchedules => "setSeasonSchedules",
            WriteCommand::HolidayDates => "setHolidayDates",
            WriteCommand::WeekendHolidaySchedules => "setWeekendHolidaySchedules",
            WriteCommand::Relay(_) => "setRelay",
            WriteCommand::PulseInputRatio(_) => "setPulseInputRatio",
            WriteCommand::ZeroResettableKwh => "setZeroResettableKWH",
            WriteCommand::PulseOutputRatio => "setPulseOutputRatio",
            WriteCommand::Lcd => "setLCD",
        }
    }
}

/// Settings block fetched by a settings read frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCommand {
    ScheduleTariffs(ReadSchedules),
    MonthTariffs(ReadMonths),
    HolidayDates,
}

impl ReadCommand {
    pub fn code(self) -> [u8; 4] {
        match self {
            ReadCommand::ScheduleTariffs(block) => [b'0', b'0', b'7', digit(block.code())],
            ReadCommand::MonthTariffs(dir) => [b'0', b'0', b'1', digit(dir.code())],
            ReadCommand::HolidayDates => *b"00B0",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReadCommand::ScheduleTariffs(_) => "readScheduleTariffs",
            ReadCommand::MonthTariffs(_) => "readMonthTariffs",
            ReadCommand::HolidayDates => "readHolidayDates",
        }
    }
}

fn digit(value: u8) -> u8 {
    b'0' + (value % 10)
}

/// Appends `value` as exactly `width` zero padded decimal digits.
///
/// Wider values keep their low order digits, matching the fixed field width.
pub fn put_decimal(buf: &mut BytesMut, value: u32, width: usize) {
    let text = format!("{value:0width$}");
    buf.put_slice(&text.as_bytes()[text.len() - width..]);
}

/// Appends the checksum of everything after the leading SOH.
fn seal(mut buf: BytesMut) -> Bytes {
    let crc = checksum_bytes(&buf[1..]);
    buf.put_slice(&crc);
    buf.freeze()
}

/// Builds a read query for a meter address.
///
/// Addresses shorter than twelve characters are left padded with zeros.
pub fn read_query(address: &str, kind: QueryKind) -> Bytes {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_slice(OMNI_QUERY_PREFIX);
    buf.put_slice(normalize_address(address).as_bytes());
    match kind {
        QueryKind::Single => {}
        QueryKind::A => buf.put_slice(OMNI_V4_SELECT_A),
        QueryKind::B => buf.put_slice(OMNI_V4_SELECT_B),
    }
    buf.put_slice(OMNI_QUERY_SUFFIX);
    buf.freeze()
}

/// Left pads an address with zeros to twelve characters.
pub fn normalize_address(address: &str) -> String {
    format!("{address:0>12}")
}

/// Builds the password sub-exchange frame.
pub fn password_frame(password: &Password) -> Bytes {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_slice(&[OMNI_SOH, b'P', b'1', OMNI_STX, b'(']);
    buf.put_slice(password.as_bytes());
    buf.put_slice(&[b')', OMNI_ETX]);
    seal(buf)
}

/// Builds a write frame around an already serialized payload.
pub fn write_frame(command: WriteCommand, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 16);
    buf.put_slice(&[OMNI_SOH, b'W', b'1', OMNI_STX]);
    buf.put_slice(&command.code());
    buf.put_u8(b'(');
    buf.put_slice(payload);
    buf.put_slice(&[b')', OMNI_ETX]);
    seal(buf)
}

/// Builds a settings read frame.
pub fn settings_read_frame(command: ReadCommand) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_slice(&[OMNI_SOH, b'R', b'1', OMNI_STX]);
    buf.put_slice(&command.code());
    buf.put_slice(&[b'(', b')', OMNI_ETX]);
    seal(buf)
}

/// The fixed termination frame.
pub fn terminator() -> Bytes {
    Bytes::from_static(&OMNI_TERMINATOR)
}

/// True when a response is exactly the single ACK byte.
pub fn is_ack(response: &[u8]) -> bool {
    response == &[OMNI_ACK]
}
