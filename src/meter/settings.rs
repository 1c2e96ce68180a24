//! # Settings Staging and Extraction
//!
//! Multi-value settings (season schedules, holiday dates, schedule tariffs)
//! are staged in typed structs before they are written. Each setter validates
//! its arguments and each struct serializes to exactly one write payload.
//!
//! The `extract_*` functions go the other way: they pull values out of the
//! buffers filled by the settings reads, returning `"0"` strings when the
//! requested index is out of range.

use crate::constants::Extents;
use crate::error::MeterError;
use crate::meter::frame::{put_decimal, WriteCommand};
use crate::meter::schema::{field, holiday_key, month_key, schedule_key, ReadBuffer};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Filler appended to season and schedule tariff payloads.
const PAYLOAD_TAIL: &[u8; 24] = b"000000000000000000000000";

fn invalid(msg: String) -> MeterError {
    MeterError::Validation(msg)
}

fn check_month_day(month: u8, day: u8) -> Result<(), MeterError> {
    if month > 12 || day > 31 {
        return Err(invalid(format!("Out of bounds: month {month} day {day}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SeasonStart {
    month: u8,
    day: u8,
    /// One based, as sent.
    schedule: u8,
}

/// Start date and schedule of each of the four seasons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonSchedules {
    seasons: [SeasonStart; Extents::SEASONS],
}

impl SeasonSchedules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages one season. `season` and `schedule` are zero based; a month
    /// or day of zero leaves the season unused.
    pub fn assign(&mut self, season: usize, month: u8, day: u8, schedule: usize) -> Result<(), MeterError> {
        if season >= Extents::SEASONS || schedule >= Extents::SCHEDULES {
            return Err(invalid(format!(
                "Out of bounds: season {} schedule {}",
                season + 1,
                schedule + 1
            )));
        }
        check_month_day(month, day)?;
        self.seasons[season] = SeasonStart {
            month,
            day,
            schedule: schedule as u8 + 1,
        };
        Ok(())
    }

    /// `(month, day, schedule + 1)` per season, then 24 zeros.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(48);
        for s in &self.seasons {
            put_decimal(&mut buf, s.month.into(), 2);
            put_decimal(&mut buf, s.day.into(), 2);
            put_decimal(&mut buf, s.schedule.into(), 2);
        }
        buf.put_slice(PAYLOAD_TAIL);
        buf.freeze()
    }
}

/// The twenty holiday dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayDates {
    dates: [(u8, u8); Extents::HOLIDAYS],
}

impl HolidayDates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages holiday `holiday` (zero based, below 20).
    pub fn assign(&mut self, holiday: usize, month: u8, day: u8) -> Result<(), MeterError> {
        if holiday >= Extents::HOLIDAYS {
            return Err(invalid(format!("Out of bounds: holiday {}", holiday + 1)));
        }
        check_month_day(month, day)?;
        self.dates[holiday] = (month, day);
        Ok(())
    }

    /// `(month, day)` per holiday.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(80);
        for &(month, day) in &self.dates {
            put_decimal(&mut buf, month.into(), 2);
            put_decimal(&mut buf, day.into(), 2);
        }
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TariffStart {
    hour: u8,
    minute: u8,
    rate: u8,
}

/// The four tariff start times of a single schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleTariffs {
    schedule: u8,
    tariffs: [TariffStart; Extents::TARIFFS],
}

impl ScheduleTariffs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages one tariff period. `schedule` and `tariff` are zero based.
    ///
    /// A payload only carries one schedule, so staging a different schedule
    /// retargets the whole struct.
    pub fn assign(&mut self, schedule: usize, tariff: usize, hour: u8, minute: u8, rate: u8) -> Result<(), MeterError> {
        if schedule >= Extents::SCHEDULES || tariff >= Extents::TARIFFS {
            return Err(invalid(format!(
                "Out of bounds: tariff {} for schedule {}",
                tariff + 1,
                schedule + 1
            )));
        }
        if hour > 23 || minute > 59 || rate > 99 {
            return Err(invalid(format!(
                "Out of bounds in Schedule_{}: hour {hour} minute {minute} rate {rate}",
                schedule + 1
            )));
        }
        self.schedule = schedule as u8;
        self.tariffs[tariff] = TariffStart { hour, minute, rate };
        Ok(())
    }

    /// Zero based schedule this payload targets.
    pub fn schedule(&self) -> usize {
        self.schedule.into()
    }

    pub fn command(&self) -> WriteCommand {
        WriteCommand::ScheduleTariffs(self.schedule)
    }

    /// `(hour, minute, rate)` per tariff, then 24 zeros.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(48);
        for t in &self.tariffs {
            put_decimal(&mut buf, t.hour.into(), 2);
            put_decimal(&mut buf, t.minute.into(), 2);
            put_decimal(&mut buf, t.rate.into(), 2);
        }
        buf.put_slice(PAYLOAD_TAIL);
        buf.freeze()
    }
}

/// One tariff period of a schedule, as read back from the meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleTariffReading {
    pub schedule: String,
    pub tariff: String,
    pub hour: String,
    pub min: String,
    pub rate: String,
}

/// Forward and reverse tariff registers of one past month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTariffReading {
    pub month: String,
    pub kwh_tariff: [String; 4],
    pub kwh_tot: String,
    pub rev_kwh_tariff: [String; 4],
    pub rev_kwh_tot: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolidayDateReading {
    pub holiday: String,
    pub month: String,
    pub day: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolidayWeekendSchedules {
    pub weekend: String,
    pub holiday: String,
}

fn zero() -> String {
    "0".to_string()
}

fn value(buf: &ReadBuffer, key: &str) -> Option<String> {
    buf.formatted(key).map(str::to_string)
}

/// Reads one schedule tariff out of the two schedule blocks.
pub fn extract_schedule_tariff(
    schedules_1_to_4: &ReadBuffer,
    schedules_5_to_8: &ReadBuffer,
    schedule: usize,
    tariff: usize,
) -> ScheduleTariffReading {
    let (s, t) = (schedule + 1, tariff + 1);
    let mut reading = ScheduleTariffReading {
        schedule: s.to_string(),
        tariff: t.to_string(),
        hour: zero(),
        min: zero(),
        rate: zero(),
    };
    if schedule >= Extents::SCHEDULES || tariff >= Extents::TARIFFS {
        return reading;
    }
    let table = if s > 4 { schedules_5_to_8 } else { schedules_1_to_4 };
    let parts = (
        value(table, &schedule_key(s, t, "Hour")),
        value(table, &schedule_key(s, t, "Min")),
        value(table, &schedule_key(s, t, "Rate")),
    );
    if let (Some(hour), Some(min), Some(rate)) = parts {
        reading.hour = hour;
        reading.min = format!("{min:0>2}");
        reading.rate = rate;
    }
    reading
}

/// Reads month `month` (zero based, below 6) from the forward and reverse
/// month blocks.
pub fn extract_month_tariff(forward: &ReadBuffer, reverse: &ReadBuffer, month: usize) -> MonthTariffReading {
    let m = month + 1;
    let in_range = month < Extents::MONTHS;
    let get = |buf: &ReadBuffer, part: &str| {
        in_range
            .then(|| value(buf, &month_key(m, part)))
            .flatten()
            .unwrap_or_else(zero)
    };
    let tariffs = |buf: &ReadBuffer| {
        [1, 2, 3, 4].map(|t| get(buf, &format!("Tariff_{t}")))
    };
    MonthTariffReading {
        month: m.to_string(),
        kwh_tariff: tariffs(forward),
        kwh_tot: get(forward, "Tot"),
        rev_kwh_tariff: tariffs(reverse),
        rev_kwh_tot: get(reverse, "Tot"),
    }
}

/// Reads holiday `holiday` (zero based, below 20).
pub fn extract_holiday_date(holidays: &ReadBuffer, holiday: usize) -> HolidayDateReading {
    let h = holiday + 1;
    if holiday < Extents::HOLIDAYS {
        if let (Some(month), Some(day)) = (
            value(holidays, &holiday_key(h, "Mon")),
            value(holidays, &holiday_key(h, "Day")),
        ) {
            return HolidayDateReading {
                holiday: h.to_string(),
                month,
                day,
            };
        }
    }
    HolidayDateReading {
        holiday: zero(),
        month: zero(),
        day: zero(),
    }
}

pub fn extract_holiday_weekend_schedules(holidays: &ReadBuffer) -> HolidayWeekendSchedules {
    HolidayWeekendSchedules {
        weekend: value(holidays, field::WEEKEND_SCHD).unwrap_or_else(zero),
        holiday: value(holidays, field::HOLIDAY_SCHD).unwrap_or_else(zero),
    }
}
