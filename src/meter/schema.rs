//! # Field Schema
//!
//! Every Omnimeter read response is a fixed 255 byte frame made of fixed width
//! ASCII fields. A [`ReadBuffer`] describes one such frame: an ordered list of
//! [`FieldDescriptor`]s whose order mirrors the byte order on the wire, plus
//! the decoded output of each field.
//!
//! Calculated fields (power factor, net watts) take no wire bytes; they sit
//! after the checksum field and are filled in by the meter variant once the
//! frame is decoded.
//!
//! ## Layouts
//!
//! | Layout | Used by |
//! |---|---|
//! | [`v3_layout`] | v3 read |
//! | [`v4_a_layout`], [`v4_b_layout`] | v4 read |
//! | [`schedules_layout`] | schedule tariff reads |
//! | [`holidays_layout`] | holiday read |
//! | [`months_layout`] | forward and reverse month tariff reads |

use crate::constants::{Extents, OMNI_CRC_FIELD};
use crate::meter::types::ReadSchedules;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Field names shared across layouts and used by the derived-field logic.
pub mod field {
    pub const MODEL: &str = "Model";
    pub const FIRMWARE: &str = "Firmware";
    pub const METER_ADDRESS: &str = "Meter_Address";
    pub const KWH_TOT: &str = "kWh_Tot";
    pub const REV_KWH_TOT: &str = "Rev_kWh_Tot";
    pub const REACTIVE_ENERGY_TOT: &str = "Reactive_Energy_Tot";
    pub const RESETTABLE_KWH_TOT: &str = "Resettable_kWh_Tot";
    pub const RESETTABLE_REV_KWH_TOT: &str = "Resettable_Rev_kWh_Tot";
    pub const RMS_VOLTS_LN_1: &str = "RMS_Volts_Ln_1";
    pub const RMS_VOLTS_LN_2: &str = "RMS_Volts_Ln_2";
    pub const RMS_VOLTS_LN_3: &str = "RMS_Volts_Ln_3";
    pub const AMPS_LN_1: &str = "Amps_Ln_1";
    pub const AMPS_LN_2: &str = "Amps_Ln_2";
    pub const AMPS_LN_3: &str = "Amps_Ln_3";
    pub const RMS_WATTS_LN_1: &str = "RMS_Watts_Ln_1";
    pub const RMS_WATTS_LN_2: &str = "RMS_Watts_Ln_2";
    pub const RMS_WATTS_LN_3: &str = "RMS_Watts_Ln_3";
    pub const RMS_WATTS_TOT: &str = "RMS_Watts_Tot";
    pub const COS_THETA_LN_1: &str = "Cos_Theta_Ln_1";
    pub const COS_THETA_LN_2: &str = "Cos_Theta_Ln_2";
    pub const COS_THETA_LN_3: &str = "Cos_Theta_Ln_3";
    pub const REACTIVE_PWR_LN_1: &str = "Reactive_Pwr_Ln_1";
    pub const REACTIVE_PWR_LN_2: &str = "Reactive_Pwr_Ln_2";
    pub const REACTIVE_PWR_LN_3: &str = "Reactive_Pwr_Ln_3";
    pub const REACTIVE_PWR_TOT: &str = "Reactive_Pwr_Tot";
    pub const LINE_FREQ: &str = "Line_Freq";
    pub const MAX_DEMAND: &str = "Max_Demand";
    pub const MAX_DEMAND_PERIOD: &str = "Max_Demand_Period";
    pub const RMS_WATTS_MAX_DEMAND: &str = "RMS_Watts_Max_Demand";
    pub const METER_TIME: &str = "Meter_Time";
    pub const CT_RATIO: &str = "CT_Ratio";
    pub const PULSE_CNT_1: &str = "Pulse_Cnt_1";
    pub const PULSE_CNT_2: &str = "Pulse_Cnt_2";
    pub const PULSE_CNT_3: &str = "Pulse_Cnt_3";
    pub const PULSE_RATIO_1: &str = "Pulse_Ratio_1";
    pub const PULSE_RATIO_2: &str = "Pulse_Ratio_2";
    pub const PULSE_RATIO_3: &str = "Pulse_Ratio_3";
    pub const PULSE_OUTPUT_RATIO: &str = "Pulse_Output_Ratio";
    pub const STATE_INPUTS: &str = "State_Inputs";
    pub const STATE_WATTS_DIR: &str = "State_Watts_Dir";
    pub const STATE_OUT: &str = "State_Out";
    pub const KWH_SCALE: &str = "kWh_Scale";
    pub const STATUS_A: &str = "Status_A";
    pub const STATUS_B: &str = "Status_B";
    pub const STATUS_C: &str = "Status_C";
    pub const POWER_FACTOR_LN_1: &str = "Power_Factor_Ln_1";
    pub const POWER_FACTOR_LN_2: &str = "Power_Factor_Ln_2";
    pub const POWER_FACTOR_LN_3: &str = "Power_Factor_Ln_3";
    pub const NET_CALC_WATTS_LN_1: &str = "Net_Calc_Watts_Ln_1";
    pub const NET_CALC_WATTS_LN_2: &str = "Net_Calc_Watts_Ln_2";
    pub const NET_CALC_WATTS_LN_3: &str = "Net_Calc_Watts_Ln_3";
    pub const NET_CALC_WATTS_TOT: &str = "Net_Calc_Watts_Tot";
    pub const WEEKEND_SCHD: &str = "Weekend_Schd";
    pub const HOLIDAY_SCHD: &str = "Holiday_Schd";
}

/// How the bytes of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Hex,
    Int,
    Float,
    String,
    PowerFactor,
}

/// Divisor applied to `Float` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScaleKind {
    None,
    Div10,
    Div100,
    /// Divisor comes from the meter's resolved kWh precision.
    KwhDynamic,
}

/// Native value of a decoded field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Int(0)
    }
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Float(v) => Some(*v as i64),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{}", format_float(*v)),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Renders a float the way the meter tooling always has: shortest round-trip
/// digits with at least one decimal place (`100.0`, `12.55`).
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// One field of a frame layout together with its last decoded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub size: usize,
    pub kind: FieldKind,
    pub scale: ScaleKind,
    pub calculated: bool,
    pub is_event: bool,
    pub formatted: String,
    pub native: FieldValue,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, size: usize, kind: FieldKind, scale: ScaleKind) -> Self {
        FieldDescriptor {
            name: name.into(),
            size,
            kind,
            scale,
            calculated: false,
            is_event: false,
            formatted: String::new(),
            native: FieldValue::default(),
        }
    }

    /// True for reserved filler and checksum fields, which never reach the
    /// unified record.
    pub fn is_internal(&self) -> bool {
        is_internal_name(&self.name)
    }

    /// Stores a decoded value.
    pub fn set(&mut self, formatted: String, native: FieldValue) {
        self.formatted = formatted;
        self.native = native;
    }
}

/// Case-insensitive check for `reserved` or `crc` in a field name.
pub fn is_internal_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.contains("RESERVED") || upper.contains("CRC")
}

/// Ordered mapping from field name to descriptor.
///
/// Re-inserting an existing name keeps its original position and replaces the
/// descriptor, which is exactly the overwrite rule used when merging frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadBuffer {
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder step: appends a wire field.
    pub fn field(mut self, name: &str, size: usize, kind: FieldKind, scale: ScaleKind) -> Self {
        self.insert(FieldDescriptor::new(name, size, kind, scale));
        self
    }

    /// Builder step: appends a wire field flagged as an event field.
    pub fn event(mut self, name: &str, size: usize, kind: FieldKind) -> Self {
        let mut desc = FieldDescriptor::new(name, size, kind, ScaleKind::None);
        desc.is_event = true;
        self.insert(desc);
        self
    }

    /// Builder step: flags the most recently appended field as an event field.
    pub fn as_event(mut self) -> Self {
        if let Some(desc) = self.fields.last_mut() {
            desc.is_event = true;
        }
        self
    }

    /// Builder step: appends a calculated integer field, preset to `0`.
    pub fn calculated(mut self, name: &str, size: usize) -> Self {
        let mut desc = FieldDescriptor::new(name, size, FieldKind::Int, ScaleKind::None);
        desc.calculated = true;
        desc.formatted = "0".to_string();
        self.insert(desc);
        self
    }

    /// Inserts or replaces a descriptor.
    pub fn insert(&mut self, desc: FieldDescriptor) {
        match self.index.get(&desc.name) {
            Some(&pos) => self.fields[pos] = desc,
            None => {
                self.index.insert(desc.name.clone(), self.fields.len());
                self.fields.push(desc);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldDescriptor> {
        match self.index.get(name) {
            Some(&pos) => self.fields.get_mut(pos),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Formatted value of a field, if present.
    pub fn formatted(&self, name: &str) -> Option<&str> {
        self.get(name).map(|d| d.formatted.as_str())
    }

    /// Native value of a field, if present.
    pub fn native(&self, name: &str) -> Option<&FieldValue> {
        self.get(name).map(|d| &d.native)
    }

    /// Sets both outputs of a field. Unknown names are ignored and reported.
    pub fn set(&mut self, name: &str, formatted: String, native: FieldValue) -> bool {
        match self.get_mut(name) {
            Some(desc) => {
                desc.set(formatted, native);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FieldDescriptor> {
        self.fields.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.index.clear();
    }

    /// Number of bytes the non-calculated fields take on the wire.
    pub fn wire_size(&self) -> usize {
        self.fields.iter().filter(|d| !d.calculated).map(|d| d.size).sum()
    }

    /// Byte offset of a wire field, or `None` for calculated or unknown names.
    pub fn wire_offset(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for desc in self.fields.iter().filter(|d| !d.calculated) {
            if desc.name == name {
                return Some(offset);
            }
            offset += desc.size;
        }
        None
    }

    /// Copies every non-internal field of `other` into `self`, overwriting
    /// fields that already exist.
    pub fn merge_public(&mut self, other: &ReadBuffer) {
        for desc in other.iter().filter(|d| !d.is_internal()) {
            self.insert(desc.clone());
        }
    }

    /// Ordered `(name, formatted)` pairs, without reserved and checksum fields.
    pub fn public_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|d| !d.is_internal())
            .map(|d| (d.name.as_str(), d.formatted.as_str()))
    }
}

impl<'a> IntoIterator for &'a ReadBuffer {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

use FieldKind::{Float, Hex, Int, PowerFactor, String as Str};
use ScaleKind::{Div10, Div100, KwhDynamic, None as NoScale};

fn header(buf: ReadBuffer, reserved: &str) -> ReadBuffer {
    buf.field(reserved, 1, Hex, NoScale)
        .event(field::MODEL, 2, Hex)
        .event(field::FIRMWARE, 1, Hex)
        .event(field::METER_ADDRESS, 12, Str)
}

fn line_readings(buf: ReadBuffer) -> ReadBuffer {
    buf.field(field::RMS_VOLTS_LN_1, 4, Float, Div10)
        .field(field::RMS_VOLTS_LN_2, 4, Float, Div10)
        .field(field::RMS_VOLTS_LN_3, 4, Float, Div10)
        .field(field::AMPS_LN_1, 5, Float, Div10)
        .field(field::AMPS_LN_2, 5, Float, Div10)
        .field(field::AMPS_LN_3, 5, Float, Div10)
        .field(field::RMS_WATTS_LN_1, 7, Int, NoScale)
        .field(field::RMS_WATTS_LN_2, 7, Int, NoScale)
        .field(field::RMS_WATTS_LN_3, 7, Int, NoScale)
        .field(field::RMS_WATTS_TOT, 7, Int, NoScale)
        .field(field::COS_THETA_LN_1, 4, PowerFactor, NoScale)
        .field(field::COS_THETA_LN_2, 4, PowerFactor, NoScale)
        .field(field::COS_THETA_LN_3, 4, PowerFactor, NoScale)
}

fn kwh(buf: ReadBuffer, names: &[&str]) -> ReadBuffer {
    names
        .iter()
        .fold(buf, |b, name| b.field(name, 8, Float, KwhDynamic))
}

fn power_factors(buf: ReadBuffer) -> ReadBuffer {
    buf.calculated(field::POWER_FACTOR_LN_1, 4)
        .calculated(field::POWER_FACTOR_LN_2, 4)
        .calculated(field::POWER_FACTOR_LN_3, 4)
}

/// The single v3 read frame.
pub fn v3_layout() -> ReadBuffer {
    let buf = header(ReadBuffer::new(), "reserved_10");
    let buf = kwh(
        buf,
        &[
            field::KWH_TOT,
            "kWh_Tariff_1",
            "kWh_Tariff_2",
            "kWh_Tariff_3",
            "kWh_Tariff_4",
            field::REV_KWH_TOT,
            "Rev_kWh_Tariff_1",
            "Rev_kWh_Tariff_2",
            "Rev_kWh_Tariff_3",
            "Rev_kWh_Tariff_4",
        ],
    );
    let buf = line_readings(buf)
        .field(field::MAX_DEMAND, 8, Float, KwhDynamic)
        .as_event()
        .event(field::MAX_DEMAND_PERIOD, 1, Int)
        .field(field::METER_TIME, 14, Str, NoScale)
        .event(field::CT_RATIO, 4, Int)
        .field(field::PULSE_CNT_1, 8, Int, NoScale)
        .field(field::PULSE_CNT_2, 8, Int, NoScale)
        .field(field::PULSE_CNT_3, 8, Int, NoScale)
        .event(field::PULSE_RATIO_1, 4, Int)
        .event(field::PULSE_RATIO_2, 4, Int)
        .event(field::PULSE_RATIO_3, 4, Int)
        .event(field::STATE_INPUTS, 3, Int)
        .field("reserved_11", 19, Hex, NoScale)
        .field(field::STATUS_A, 1, Hex, NoScale)
        .field("reserved_12", 4, Hex, NoScale)
        .field(OMNI_CRC_FIELD, 2, Hex, NoScale);
    power_factors(buf)
}

/// The v4 A frame (energy registers, line readings, state flags).
pub fn v4_a_layout() -> ReadBuffer {
    let buf = header(ReadBuffer::new(), "reserved_1");
    let buf = kwh(
        buf,
        &[
            field::KWH_TOT,
            field::REACTIVE_ENERGY_TOT,
            field::REV_KWH_TOT,
            "kWh_Ln_1",
            "kWh_Ln_2",
            "kWh_Ln_3",
            "Rev_kWh_Ln_1",
            "Rev_kWh_Ln_2",
            "Rev_kWh_Ln_3",
            field::RESETTABLE_KWH_TOT,
            field::RESETTABLE_REV_KWH_TOT,
        ],
    );
    let buf = line_readings(buf)
        .field(field::REACTIVE_PWR_LN_1, 7, Int, NoScale)
        .field(field::REACTIVE_PWR_LN_2, 7, Int, NoScale)
        .field(field::REACTIVE_PWR_LN_3, 7, Int, NoScale)
        .field(field::REACTIVE_PWR_TOT, 7, Int, NoScale)
        .field(field::LINE_FREQ, 4, Float, Div100)
        .field(field::PULSE_CNT_1, 8, Int, NoScale)
        .field(field::PULSE_CNT_2, 8, Int, NoScale)
        .field(field::PULSE_CNT_3, 8, Int, NoScale)
        .field(field::STATE_INPUTS, 1, Int, NoScale)
        .event(field::STATE_WATTS_DIR, 1, Int)
        .event(field::STATE_OUT, 1, Int)
        .event(field::KWH_SCALE, 1, Int)
        .field("reserved_2", 2, Hex, NoScale)
        .field(field::METER_TIME, 14, Str, NoScale)
        .field("reserved_3", 2, Hex, NoScale)
        .field("reserved_4", 4, Hex, NoScale)
        .field(OMNI_CRC_FIELD, 2, Hex, NoScale);
    power_factors(buf)
}

/// The v4 B frame (tariff registers, demand, ratios, status).
pub fn v4_b_layout() -> ReadBuffer {
    let buf = header(ReadBuffer::new(), "reserved_5");
    let buf = kwh(
        buf,
        &[
            "kWh_Tariff_1",
            "kWh_Tariff_2",
            "kWh_Tariff_3",
            "kWh_Tariff_4",
            "Rev_kWh_Tariff_1",
            "Rev_kWh_Tariff_2",
            "Rev_kWh_Tariff_3",
            "Rev_kWh_Tariff_4",
        ],
    );
    let buf = line_readings(buf)
        .field(field::RMS_WATTS_MAX_DEMAND, 8, Float, Div10)
        .event(field::MAX_DEMAND_PERIOD, 1, Int)
        .event(field::PULSE_RATIO_1, 4, Int)
        .event(field::PULSE_RATIO_2, 4, Int)
        .event(field::PULSE_RATIO_3, 4, Int)
        .event(field::CT_RATIO, 4, Int)
        .field("reserved_6", 1, Hex, NoScale)
        .event(field::PULSE_OUTPUT_RATIO, 4, Int)
        .field("reserved_7", 53, Hex, NoScale)
        .event(field::STATUS_A, 1, Hex)
        .event(field::STATUS_B, 1, Hex)
        .event(field::STATUS_C, 1, Hex)
        .field(field::METER_TIME, 14, Str, NoScale)
        .field("reserved_8", 2, Hex, NoScale)
        .field("reserved_9", 4, Hex, NoScale)
        .field(OMNI_CRC_FIELD, 2, Hex, NoScale)
        .calculated(field::NET_CALC_WATTS_LN_1, 7)
        .calculated(field::NET_CALC_WATTS_LN_2, 7)
        .calculated(field::NET_CALC_WATTS_LN_3, 7)
        .calculated(field::NET_CALC_WATTS_TOT, 7);
    power_factors(buf)
}

/// Key of one schedule tariff value, e.g. `Schd_3_Tariff_2_Min`.
pub fn schedule_key(schedule: usize, tariff: usize, part: &str) -> String {
    format!("Schd_{schedule}_Tariff_{tariff}_{part}")
}

/// Schedule tariffs for schedules 1 to 4 or 5 to 8.
///
/// Each schedule holds four `(Hour, Min, Rate)` triples followed by 24 bytes
/// of filler; the last schedule is followed by a 79 byte tail instead.
pub fn schedules_layout(block: ReadSchedules) -> ReadBuffer {
    let (first, reserved) = match block {
        ReadSchedules::Schedules1To4 => (1, 40),
        ReadSchedules::Schedules5To8 => (5, 30),
    };
    let mut buf = ReadBuffer::new().field(&format!("reserved_{reserved}"), 6, Hex, NoScale);
    for (n, schedule) in (first..first + 4).enumerate() {
        for tariff in 1..=Extents::TARIFFS {
            for part in ["Hour", "Min", "Rate"] {
                buf = buf.event(&schedule_key(schedule, tariff, part), 2, Int);
            }
        }
        let tail = if n < 3 { 24 } else { 79 };
        buf = buf.field(&format!("reserved_{}", reserved + 1 + n), tail, Hex, NoScale);
    }
    buf.field(OMNI_CRC_FIELD, 2, Hex, NoScale)
}

/// Key of a holiday date part, e.g. `Holiday_7_Mon`.
pub fn holiday_key(holiday: usize, part: &str) -> String {
    format!("Holiday_{holiday}_{part}")
}

/// Holiday dates plus the weekend and holiday schedule assignment.
pub fn holidays_layout() -> ReadBuffer {
    let mut buf = ReadBuffer::new().field("reserved_20", 6, Hex, NoScale);
    for holiday in 1..=Extents::HOLIDAYS {
        buf = buf
            .event(&holiday_key(holiday, "Mon"), 2, Int)
            .event(&holiday_key(holiday, "Day"), 2, Int);
    }
    buf.event(field::WEEKEND_SCHD, 2, Int)
        .event(field::HOLIDAY_SCHD, 2, Int)
        .field("reserved_21", 163, Hex, NoScale)
        .field(OMNI_CRC_FIELD, 2, Hex, NoScale)
}

/// Key of a month register, e.g. `Month_2_Tariff_4` or `Month_6_Tot`.
pub fn month_key(month: usize, part: &str) -> String {
    format!("Month_{month}_{part}")
}

/// Month tariff totals for the last six months, forward or reverse.
pub fn months_layout() -> ReadBuffer {
    let mut buf = ReadBuffer::new().field("reserved_echo_cmd", 6, Hex, NoScale);
    for month in 1..=Extents::MONTHS {
        buf = buf.field(&month_key(month, "Tot"), 8, Float, KwhDynamic);
        for tariff in 1..=Extents::TARIFFS {
            buf = buf.field(&month_key(month, &format!("Tariff_{tariff}")), 8, Float, KwhDynamic);
        }
    }
    buf.field("reserved_1", 7, Hex, NoScale)
        .field(OMNI_CRC_FIELD, 2, Hex, NoScale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OMNI_FRAME_LEN;

    #[test]
    fn test_every_layout_fills_a_frame() {
        let layouts = [
            v3_layout(),
            v4_a_layout(),
            v4_b_layout(),
            schedules_layout(ReadSchedules::Schedules1To4),
            schedules_layout(ReadSchedules::Schedules5To8),
            holidays_layout(),
            months_layout(),
        ];
        for layout in &layouts {
            assert_eq!(layout.wire_size(), OMNI_FRAME_LEN);
        }
    }

    #[test]
    fn test_scale_field_offset() {
        let a = v4_a_layout();
        assert_eq!(a.wire_offset(field::KWH_SCALE), Some(230));
        assert_eq!(a.wire_offset(OMNI_CRC_FIELD), Some(253));
        assert_eq!(a.wire_offset(field::POWER_FACTOR_LN_1), None);
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut buf = ReadBuffer::new()
            .field("a", 1, Int, NoScale)
            .field("b", 1, Int, NoScale);
        let mut replacement = FieldDescriptor::new("a", 3, Hex, NoScale);
        replacement.formatted = "ff".into();
        buf.insert(replacement);
        let names: Vec<_> = buf.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(buf.formatted("a"), Some("ff"));
    }

    #[test]
    fn test_internal_names() {
        assert!(is_internal_name("reserved_echo_cmd"));
        assert!(is_internal_name("crc16"));
        assert!(is_internal_name("Reserved_X"));
        assert!(!is_internal_name("kWh_Tot"));
    }

    #[test]
    fn test_schedule_names() {
        let buf = schedules_layout(ReadSchedules::Schedules5To8);
        assert!(buf.contains("Schd_8_Tariff_4_Rate"));
        assert!(buf.contains("reserved_34"));
        assert!(!buf.contains("Schd_1_Tariff_1_Hour"));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(12.55), "12.55");
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(0.0), "0.0");
    }
}
