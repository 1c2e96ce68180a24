//! Meter clock helpers.
//!
//! Meters report time as a 14 digit `yymmddwwhhmmss` string, where `ww` is
//! the weekday, and expect the same layout when the clock is set.

use crate::error::MeterError;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

/// Broken out `Meter_Time` value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EkmDate {
    pub yy: u32,
    pub mm: u32,
    pub dd: u32,
    pub weekday: u32,
    pub hh: u32,
    pub minutes: u32,
    pub ss: u32,
}

impl EkmDate {
    /// Splits a meter time string. Anything that is not exactly fourteen
    /// digits yields all zeros.
    pub fn split(text: &str) -> EkmDate {
        let text = text.trim();
        if text.len() != 14 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return EkmDate::default();
        }
        let part = |i: usize| text[i..i + 2].parse().unwrap_or(0);
        EkmDate {
            yy: part(0),
            mm: part(2),
            dd: part(4),
            weekday: part(6),
            hh: part(8),
            minutes: part(10),
            ss: part(12),
        }
    }

    /// Calendar value, assuming the 2000s. `None` for the all-zero date or
    /// any impossible date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2000 + self.yy as i32, self.mm, self.dd)?.and_hms_opt(self.hh, self.minutes, self.ss)
    }
}

/// ISO weekday (Monday = 1) of a two digit year date.
pub fn iso_weekday(yy: u32, mm: u32, dd: u32) -> Result<u32, MeterError> {
    NaiveDate::from_ymd_opt(2000 + (yy % 100) as i32, mm, dd)
        .map(|d| d.weekday().number_from_monday())
        .ok_or_else(|| MeterError::Validation(format!("No such date: {yy:02}-{mm:02}-{dd:02}")))
}

/// Local wall clock as `(yy, mm, dd, hh, mi, ss)`.
pub fn local_now() -> (u32, u32, u32, u32, u32, u32) {
    let now = Local::now();
    (
        (now.year() % 100) as u32,
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
    )
}
