//! The meter module contains the Omnimeter protocol engine: frame layouts and
//! decoding, checksums, the command protocol, the serial transport and the
//! v3/v4 device models built on top of them.

pub mod checksum;
pub mod date;
pub mod decoder;
pub mod device;
pub mod frame;
pub mod observer;
pub mod password;
pub mod protocol;
pub mod schema;
pub mod serial_mock;
pub mod settings;
pub mod snapshot;
pub mod transport;
pub mod types;

pub use checksum::{checksum, checksum_bytes, checksum_hex, verify, verify_response};
pub use date::{iso_weekday, EkmDate};
pub use decoder::{decode, kwh_divisor, read_scale_code};
pub use device::{meter_for, net_watts, power_factor, Meter, MeterCore, V3Meter, V4Meter};
pub use frame::{QueryKind, ReadCommand, WriteCommand};
pub use observer::{IntervalObserver, MeterObserver, ObserverError, ObserverId};
pub use password::Password;
pub use protocol::{CommandProtocol, ProtocolState};
pub use schema::{FieldDescriptor, FieldKind, FieldValue, ReadBuffer, ScaleKind};
pub use serial_mock::MockTransport;
pub use settings::{
    HolidayDateReading, HolidayDates, HolidayWeekendSchedules, MonthTariffReading, ScheduleTariffReading,
    ScheduleTariffs, SeasonSchedules,
};
pub use snapshot::{render_json, MeterSnapshot};
pub use transport::{PollConfig, SerialConfig, SerialTransport, Transport};
pub use types::{
    CosTheta, CtRatio, DirectionFlag, Generation, InputStates, LcdItem, MaxDemandPeriod, MaxDemandResetInterval,
    PulseInput, PulseOutput, ReadMonths, ReadSchedules, Relay, RelayInterval, RelayState, ScaleKwh, StateOut,
};
