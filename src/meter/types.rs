//! # Omnimeter Setting Types
//!
//! Typed values accepted by the write commands and reported by the decoded
//! frames. Every enum carries the exact numeric code the meter uses on the
//! wire; conversions from raw numbers go through `TryFrom` so out-of-range
//! input surfaces as a [`MeterError::Validation`].

use crate::error::MeterError;
use bitflags::bitflags;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Meter generation, selects the dialect used on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// Single 255 byte frame per read.
    V3,
    /// A and B frames per read.
    V4,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::V3 => f.write_str("v3"),
            Generation::V4 => f.write_str("v4"),
        }
    }
}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty, $what:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every value, in ascending code order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            /// Numeric code sent to or read from the meter.
            pub fn code(self) -> $repr {
                match self {
                    $( $name::$variant => $code ),+
                }
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = MeterError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                match value {
                    $( v if v == $code => Ok($name::$variant), )+
                    other => Err(MeterError::Validation(format!(
                        concat!("Unsupported ", $what, ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

coded_enum! {
    /// Window over which max demand is measured.
    MaxDemandPeriod: u8, "max demand period" {
        FifteenMinutes = 1,
        ThirtyMinutes = 2,
        SixtyMinutes = 3,
    }
}

coded_enum! {
    /// Automatic max demand reset schedule.
    MaxDemandResetInterval: u8, "max demand reset interval" {
        Off = 0,
        Monthly = 1,
        Weekly = 2,
        Daily = 3,
        Hourly = 4,
    }
}

coded_enum! {
    /// Legal current transformer ratios, in amps.
    ///
    /// # Known discrepancy
    ///
    /// The vendor constant table historically assigned `200` to the label
    /// `Amps_100`, making the lowest two labels collide. The vendor documentation
    /// table and the legal-value message both list `100`, so [`CtRatio::Amps100`]
    /// carries `100` here. This is unconfirmed on hardware; callers who depend
    /// on the legacy behaviour should send [`CtRatio::Amps200`] explicitly.
    CtRatio: u16, "CT ratio" {
        Amps100 = 100,
        Amps200 = 200,
        Amps400 = 400,
        Amps600 = 600,
        Amps800 = 800,
        Amps1000 = 1000,
        Amps1200 = 1200,
        Amps1500 = 1500,
        Amps2000 = 2000,
        Amps3000 = 3000,
        Amps4000 = 4000,
        Amps5000 = 5000,
    }
}

coded_enum! {
    /// Pulse output ratios accepted by v4 meters.
    PulseOutput: u16, "pulse output ratio" {
        Ratio1 = 1,
        Ratio2 = 2,
        Ratio4 = 4,
        Ratio5 = 5,
        Ratio8 = 8,
        Ratio10 = 10,
        Ratio16 = 16,
        Ratio20 = 20,
        Ratio25 = 25,
        Ratio40 = 40,
        Ratio50 = 50,
        Ratio80 = 80,
        Ratio100 = 100,
        Ratio200 = 200,
        Ratio400 = 400,
        Ratio800 = 800,
        Ratio1600 = 1600,
    }
}

coded_enum! {
    /// Pulse input line.
    PulseInput: u8, "pulse input line" {
        Line1 = 1,
        Line2 = 2,
        Line3 = 3,
    }
}

coded_enum! {
    /// Relay selector on v4 meters.
    Relay: u8, "relay" {
        Relay1 = 1,
        Relay2 = 2,
    }
}

coded_enum! {
    RelayState: u8, "relay state" {
        Open = 0,
        Close = 1,
    }
}

coded_enum! {
    /// Output state reported in `State_Out` (v4).
    StateOut: u8, "output state" {
        OffOff = 1,
        OffOn = 2,
        OnOff = 3,
        OnOn = 4,
    }
}

coded_enum! {
    /// Which block of four schedules a schedule read returns.
    ReadSchedules: u8, "schedule block" {
        Schedules1To4 = 0,
        Schedules5To8 = 1,
    }
}

coded_enum! {
    /// Direction of the month tariff read.
    ReadMonths: u8, "month direction" {
        Kwh = 1,
        KwhReverse = 2,
    }
}

coded_enum! {
    /// Per-line power direction reported in `State_Watts_Dir` (v4).
    ///
    /// Each word is the direction of line 1, 2 and 3 in that order.
    DirectionFlag: u8, "direction code" {
        ForwardForwardForward = 1,
        ForwardForwardReverse = 2,
        ForwardReverseForward = 3,
        ReverseForwardForward = 4,
        ForwardReverseReverse = 5,
        ReverseForwardReverse = 6,
        ReverseReverseForward = 7,
        ReverseReverseReverse = 8,
    }
}

impl DirectionFlag {
    /// Sign multiplier for lines 1, 2 and 3.
    pub fn signs(self) -> [i64; 3] {
        use DirectionFlag::*;
        match self {
            ForwardForwardForward => [1, 1, 1],
            ForwardForwardReverse => [1, 1, -1],
            ForwardReverseForward => [1, -1, 1],
            ReverseForwardForward => [-1, 1, 1],
            ForwardReverseReverse => [1, -1, -1],
            ReverseForwardReverse => [-1, 1, -1],
            ReverseReverseForward => [-1, -1, 1],
            ReverseReverseReverse => [-1, -1, -1],
        }
    }
}

coded_enum! {
    /// kWh precision code found in `kWh_Scale`.
    ScaleKwh: u8, "kWh scale" {
        NoScale = 0,
        Scale10 = 1,
        Scale100 = 2,
    }
}

impl ScaleKwh {
    pub fn divisor(self) -> f64 {
        match self {
            ScaleKwh::NoScale => 1.0,
            ScaleKwh::Scale10 => 10.0,
            ScaleKwh::Scale100 => 100.0,
        }
    }
}

/// Lead character of a `Cos_Theta` reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosTheta {
    InductiveLag,
    CapacitiveLead,
    NoLeadOrLag,
}

impl CosTheta {
    pub fn from_prefix(c: char) -> Self {
        match c {
            'L' => CosTheta::InductiveLag,
            'C' => CosTheta::CapacitiveLead,
            _ => CosTheta::NoLeadOrLag,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            CosTheta::InductiveLag => 'L',
            CosTheta::CapacitiveLead => 'C',
            CosTheta::NoLeadOrLag => ' ',
        }
    }
}

/// Relay hold time bounds.
pub struct RelayInterval;

impl RelayInterval {
    /// Hold the relay state indefinitely.
    pub const HOLD: u16 = 0;
    pub const MAX: u16 = crate::constants::OMNI_RELAY_MAX_SECONDS;
}

bitflags! {
    /// Pulse input levels reported in `State_Inputs` (v4).
    ///
    /// A set flag means the line is low; zero means all three lines are high.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InputStates: u8 {
        const LINE_3_LOW = 0b0000_0001;
        const LINE_2_LOW = 0b0000_0010;
        const LINE_1_LOW = 0b0000_0100;
    }
}

impl InputStates {
    /// Decodes the `State_Inputs` code, rejecting values above 7.
    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_bits)
    }
}

macro_rules! lcd_items {
    ( $( $variant:ident = $code:literal => $name:literal ),+ $(,)? ) => {
        coded_enum! {
            /// Items that can be placed in the v4 LCD rotation.
            LcdItem: u8, "LCD item" {
                $( $variant = $code ),+
            }
        }

        impl LcdItem {
            /// Field style name of the item, as shown in meter documentation.
            pub fn name(self) -> &'static str {
                match self {
                    $( LcdItem::$variant => $name ),+
                }
            }
        }
    };
}

lcd_items! {
    KwhTot = 1 => "kWh_Tot",
    RevKwhTot = 2 => "Rev_kWh_Tot",
    RmsVoltsLn1 = 3 => "RMS_Volts_Ln_1",
    RmsVoltsLn2 = 4 => "RMS_Volts_Ln_2",
    RmsVoltsLn3 = 5 => "RMS_Volts_Ln_3",
    AmpsLn1 = 6 => "Amps_Ln_1",
    AmpsLn2 = 7 => "Amps_Ln_2",
    AmpsLn3 = 8 => "Amps_Ln_3",
    RmsWattsLn1 = 9 => "RMS_Watts_Ln_1",
    RmsWattsLn2 = 10 => "RMS_Watts_Ln_2",
    RmsWattsLn3 = 11 => "RMS_Watts_Ln_3",
    RmsWattsTot = 12 => "RMS_Watts_Tot",
    PowerFactorLn1 = 13 => "Power_Factor_Ln_1",
    PowerFactorLn2 = 14 => "Power_Factor_Ln_2",
    PowerFactorLn3 = 15 => "Power_Factor_Ln_3",
    KwhTariff1 = 16 => "kWh_Tariff_1",
    KwhTariff2 = 17 => "kWh_Tariff_2",
    KwhTariff3 = 18 => "kWh_Tariff_3",
    KwhTariff4 = 19 => "kWh_Tariff_4",
    RevKwhTariff1 = 20 => "Rev_kWh_Tariff_1",
    RevKwhTariff2 = 21 => "Rev_kWh_Tariff_2",
    RevKwhTariff3 = 22 => "Rev_kWh_Tariff_3",
    RevKwhTariff4 = 23 => "Rev_kWh_Tariff_4",
    ReactivePwrLn1 = 24 => "Reactive_Pwr_Ln_1",
    ReactivePwrLn2 = 25 => "Reactive_Pwr_Ln_2",
    ReactivePwrLn3 = 26 => "Reactive_Pwr_Ln_3",
    ReactivePwrTot = 27 => "Reactive_Pwr_Tot",
    LineFreq = 28 => "Line_Freq",
    PulseCnt1 = 29 => "Pulse_Cnt_1",
    PulseCnt2 = 30 => "Pulse_Cnt_2",
    PulseCnt3 = 31 => "Pulse_Cnt_3",
    KwhLn1 = 32 => "kWh_Ln_1",
    RevKwhLn1 = 33 => "Rev_kWh_Ln_1",
    KwhLn2 = 34 => "kWh_Ln_2",
    RevKwhLn2 = 35 => "Rev_kWh_Ln_2",
    KwhLn3 = 36 => "kWh_Ln_3",
    RevKwhLn3 = 37 => "Rev_kWh_Ln_3",
    ReactiveEnergyTot = 38 => "Reactive_Energy_Tot",
    MaxDemandRst = 39 => "Max_Demand_Rst",
    RevKwhRst = 40 => "Rev_kWh_Rst",
    StateInputs = 41 => "State_Inputs",
    MaxDemand = 42 => "Max_Demand",
}

static LCD_LOOKUP: Lazy<HashMap<&'static str, LcdItem>> =
    Lazy::new(|| LcdItem::ALL.iter().map(|item| (item.name(), *item)).collect());

impl LcdItem {
    /// Looks up an item by its field style name.
    pub fn from_name(name: &str) -> Option<LcdItem> {
        LCD_LOOKUP.get(name).copied()
    }
}

/// Numeric LCD code for a field style name, `0` when the name is unknown.
pub fn lcd_code(name: &str) -> u8 {
    LcdItem::from_name(name).map(LcdItem::code).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_ratio_lowest_label_is_one_hundred() {
        assert_eq!(CtRatio::Amps100.code(), 100);
        assert_eq!(CtRatio::try_from(100).unwrap(), CtRatio::Amps100);
        assert!(CtRatio::try_from(150).is_err());
        assert_eq!(CtRatio::ALL.len(), 12);
    }

    #[test]
    fn test_direction_signs_cover_all_codes() {
        for code in 1..=8u8 {
            let flag = DirectionFlag::try_from(code).unwrap();
            let signs = flag.signs();
            assert!(signs.iter().all(|s| *s == 1 || *s == -1));
        }
        assert_eq!(DirectionFlag::ReverseForwardForward.signs(), [-1, 1, 1]);
        assert!(DirectionFlag::try_from(0).is_err());
        assert!(DirectionFlag::try_from(9).is_err());
    }

    #[test]
    fn test_lcd_lookup() {
        assert_eq!(LcdItem::from_name("Pulse_Cnt_1"), Some(LcdItem::PulseCnt1));
        assert_eq!(lcd_code("Max_Demand"), 42);
        assert_eq!(lcd_code("Not_A_Field"), 0);
        assert_eq!(LcdItem::ALL.len(), 42);
    }

    #[test]
    fn test_input_states() {
        assert_eq!(InputStates::from_code(0), Some(InputStates::empty()));
        assert_eq!(
            InputStates::from_code(1),
            Some(InputStates::LINE_3_LOW)
        );
        assert_eq!(InputStates::from_code(7), Some(InputStates::all()));
        assert_eq!(InputStates::from_code(8), None);
    }

    #[test]
    fn test_cos_theta_prefix() {
        assert_eq!(CosTheta::from_prefix('L'), CosTheta::InductiveLag);
        assert_eq!(CosTheta::from_prefix('C'), CosTheta::CapacitiveLead);
        assert_eq!(CosTheta::from_prefix(' '), CosTheta::NoLeadOrLag);
        assert_eq!(CosTheta::CapacitiveLead.prefix(), 'C');
    }
}
