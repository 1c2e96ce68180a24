//! # Omnimeter Devices
//!
//! The two meter dialects share one command protocol but differ in how a
//! read is taken and what is derived from it:
//!
//! - [`V3Meter`] reads a single frame and always decodes kWh registers with
//!   a fixed precision of one decimal.
//! - [`V4Meter`] reads an A and a B frame, resolves the kWh precision once
//!   from the A frame and derives signed net power from the direction flags.
//!
//! Both implement [`Meter`], whose provided methods carry the write commands
//! and settings reads common to both generations.
//!
//! Every write follows the same sequence: validate, pre-read, password,
//! write frame, termination. The pre-read is a hard precondition; if it fails
//! nothing is written. The termination frame is sent whatever happens after
//! validation.

use crate::constants::{
    Extents, OMNI_CHECKSUM_END, OMNI_CHECKSUM_START, OMNI_CRC_FIELD, OMNI_LCD_SLOTS, OMNI_RATIO_MAX,
};
use crate::error::MeterError;
use crate::logging::{default_sink, SharedSink};
use crate::meter::checksum::{checksum_hex, verify_response};
use crate::meter::date::{iso_weekday, local_now};
use crate::meter::decoder::{decode, read_scale_code};
use crate::meter::frame::{normalize_address, put_decimal, read_query, QueryKind, ReadCommand, WriteCommand};
use crate::meter::observer::{MeterObserver, ObserverId};
use crate::meter::password::Password;
use crate::meter::protocol::CommandProtocol;
use crate::meter::schema::{
    field, holidays_layout, months_layout, schedules_layout, v3_layout, v4_a_layout, v4_b_layout, FieldValue,
    ReadBuffer,
};
use crate::meter::settings::{
    extract_holiday_date, extract_holiday_weekend_schedules, extract_month_tariff, extract_schedule_tariff,
    HolidayDateReading, HolidayDates, HolidayWeekendSchedules, MonthTariffReading, ScheduleTariffReading,
    ScheduleTariffs, SeasonSchedules,
};
use crate::meter::snapshot::{render_json, MeterSnapshot};
use crate::meter::transport::Transport;
use crate::meter::types::{
    CosTheta, CtRatio, DirectionFlag, Generation, LcdItem, MaxDemandPeriod, MaxDemandResetInterval, PulseInput,
    PulseOutput, ReadMonths, ReadSchedules, Relay, RelayInterval, RelayState, ScaleKwh,
};
use bytes::BytesMut;
use log::Level;

/// Legacy integer power factor from a `Cos_Theta` reading.
///
/// `L080` (lagging) gives 80, `C080` (leading) gives 120, anything without a
/// lead or lag marker gives 100.
pub fn power_factor(reading: &str) -> i64 {
    let mut chars = reading.chars();
    let prefix = chars.next().map(CosTheta::from_prefix).unwrap_or(CosTheta::NoLeadOrLag);
    let magnitude = chars.as_str().trim().parse::<i64>();
    match (prefix, magnitude) {
        (CosTheta::InductiveLag, Ok(n)) => n,
        (CosTheta::CapacitiveLead, Ok(n)) => 200 - n,
        _ => 100,
    }
}

/// Signed per-line watts plus their total, from a `State_Watts_Dir` code.
///
/// Unknown direction codes leave every line positive.
pub fn net_watts(direction: i64, watts: [i64; 3]) -> [i64; 4] {
    let signs = u8::try_from(direction)
        .ok()
        .and_then(|code| DirectionFlag::try_from(code).ok())
        .map(DirectionFlag::signs)
        .unwrap_or([1, 1, 1]);
    let lines = [watts[0] * signs[0], watts[1] * signs[1], watts[2] * signs[2]];
    [lines[0], lines[1], lines[2], lines.iter().sum()]
}

fn int_field(buffer: &ReadBuffer, name: &str) -> i64 {
    buffer.native(name).and_then(FieldValue::as_i64).unwrap_or(0)
}

/// Fills `Power_Factor_Ln_*` from the `Cos_Theta_Ln_*` fields of the same
/// buffer.
fn fill_power_factors(buffer: &mut ReadBuffer) {
    let pairs = [
        (field::COS_THETA_LN_1, field::POWER_FACTOR_LN_1),
        (field::COS_THETA_LN_2, field::POWER_FACTOR_LN_2),
        (field::COS_THETA_LN_3, field::POWER_FACTOR_LN_3),
    ];
    for (cos, pf) in pairs {
        let value = power_factor(buffer.formatted(cos).unwrap_or(""));
        buffer.set(pf, value.to_string(), FieldValue::Int(value));
    }
}

/// State and plumbing shared by both meter generations.
pub struct MeterCore {
    address: String,
    protocol: CommandProtocol,
    observers: Vec<(ObserverId, Box<dyn MeterObserver>)>,
    next_observer: u64,
    unified: ReadBuffer,
    schedules_1_to_4: ReadBuffer,
    schedules_5_to_8: ReadBuffer,
    holidays: ReadBuffer,
    months_fwd: ReadBuffer,
    months_rev: ReadBuffer,
    /// Precision code resolved from the first good A frame.
    kwh_precision: Option<i64>,
    /// Caller supplied precision, wins over the cached one.
    precision_override: Option<ScaleKwh>,
    raw_a: Vec<u8>,
    raw_b: Vec<u8>,
    seasons: SeasonSchedules,
    holiday_dates: HolidayDates,
    schedule_tariffs: ScheduleTariffs,
}

impl MeterCore {
    pub fn new(address: &str, sink: SharedSink) -> Self {
        MeterCore {
            address: normalize_address(address),
            protocol: CommandProtocol::new(sink),
            observers: Vec::new(),
            next_observer: 0,
            unified: ReadBuffer::new(),
            schedules_1_to_4: schedules_layout(ReadSchedules::Schedules1To4),
            schedules_5_to_8: schedules_layout(ReadSchedules::Schedules5To8),
            holidays: holidays_layout(),
            months_fwd: months_layout(),
            months_rev: months_layout(),
            kwh_precision: None,
            precision_override: None,
            raw_a: Vec::new(),
            raw_b: Vec::new(),
            seasons: SeasonSchedules::new(),
            holiday_dates: HolidayDates::new(),
            schedule_tariffs: ScheduleTariffs::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol(&self) -> &CommandProtocol {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut CommandProtocol {
        &mut self.protocol
    }

    fn log(&self, level: Level, message: &str) {
        self.protocol.log(level, message);
    }

    /// Precision used for `KwhDynamic` fields when one is known.
    pub fn kwh_precision(&self) -> Option<i64> {
        self.precision_override.map(|s| i64::from(s.code())).or(self.kwh_precision)
    }

    /// Precision for decodes that do not carry their own scale field.
    fn effective_precision(&self) -> i64 {
        self.kwh_precision().unwrap_or_else(|| {
            self.log(Level::Warn, "kWh precision not resolved yet, assuming Scale10");
            i64::from(ScaleKwh::Scale10.code())
        })
    }

    /// Records a validation failure as the command message without any I/O.
    fn reject<T>(&mut self, command: &str, checked: Result<T, MeterError>) -> Result<T, MeterError> {
        checked.map_err(|e| {
            self.protocol.set_context(command);
            self.protocol.clear_cmd_msg();
            let msg = match &e {
                MeterError::Validation(msg) => msg.clone(),
                other => other.to_string(),
            };
            self.protocol.write_cmd_msg(&msg);
            self.protocol.set_context("");
            e
        })
    }

    /// Sends a read query and decodes the answer into `buffer`.
    ///
    /// `precision` of `None` resolves the precision from the frame itself and
    /// caches it once the frame passes its checksum.
    fn read_frame(
        &mut self,
        kind: QueryKind,
        buffer: &mut ReadBuffer,
        precision: Option<i64>,
    ) -> Result<Vec<u8>, MeterError> {
        let raw = self.protocol.exchange(&read_query(&self.address, kind))?;
        let (code, resolved) = match precision {
            Some(code) => (code, false),
            None => match read_scale_code(&raw, buffer) {
                Some(code) => (code, true),
                None => {
                    self.log(Level::Warn, "kWh_Scale unreadable, treating as no scaling");
                    (i64::from(ScaleKwh::NoScale.code()), true)
                }
            },
        };
        decode(&raw, buffer, code, self.protocol.sink().as_ref(), self.protocol.context())?;
        self.check_crc(&raw, buffer)?;
        if resolved && self.kwh_precision.is_none() {
            self.log(Level::Debug, &format!("kWh precision resolved to {code}"));
            self.kwh_precision = Some(code);
        }
        Ok(raw)
    }

    fn check_crc(&self, raw: &[u8], buffer: &ReadBuffer) -> Result<(), MeterError> {
        if let Some(body) = raw.get(OMNI_CHECKSUM_START..OMNI_CHECKSUM_END) {
            let sent = buffer.formatted(OMNI_CRC_FIELD).unwrap_or("");
            self.log(Level::Debug, &format!("CRC sent = {sent} CRC calc = {}", checksum_hex(body)));
        }
        verify_response(raw).map_err(|e| {
            self.log(Level::Warn, &e.to_string());
            e
        })
    }

    /// Rebuilds the unified buffer from frame buffers, later ones winning.
    fn rebuild_unified(&mut self, frames: &[&ReadBuffer]) {
        self.unified.clear();
        for frame in frames {
            self.unified.merge_public(frame);
        }
    }

    fn notify_observers(&mut self) {
        let sink = self.protocol.sink().clone();
        for (id, observer) in self.observers.iter_mut() {
            if let Err(e) = observer.update(&self.unified) {
                sink.log(Level::Error, "updateObservers", &format!("observer {}: {e}", id.0));
            }
        }
    }

    fn settings_buffer(&self, command: ReadCommand) -> &ReadBuffer {
        match command {
            ReadCommand::ScheduleTariffs(ReadSchedules::Schedules1To4) => &self.schedules_1_to_4,
            ReadCommand::ScheduleTariffs(ReadSchedules::Schedules5To8) => &self.schedules_5_to_8,
            ReadCommand::MonthTariffs(ReadMonths::Kwh) => &self.months_fwd,
            ReadCommand::MonthTariffs(ReadMonths::KwhReverse) => &self.months_rev,
            ReadCommand::HolidayDates => &self.holidays,
        }
    }

    fn settings_buffer_mut(&mut self, command: ReadCommand) -> &mut ReadBuffer {
        match command {
            ReadCommand::ScheduleTariffs(ReadSchedules::Schedules1To4) => &mut self.schedules_1_to_4,
            ReadCommand::ScheduleTariffs(ReadSchedules::Schedules5To8) => &mut self.schedules_5_to_8,
            ReadCommand::MonthTariffs(ReadMonths::Kwh) => &mut self.months_fwd,
            ReadCommand::MonthTariffs(ReadMonths::KwhReverse) => &mut self.months_rev,
            ReadCommand::HolidayDates => &mut self.holidays,
        }
    }

    fn decode_settings(&mut self, command: ReadCommand, raw: &[u8]) -> Result<(), MeterError> {
        let code = self.effective_precision();
        let sink = self.protocol.sink().clone();
        let context = self.protocol.context().to_string();
        decode(raw, self.settings_buffer_mut(command), code, sink.as_ref(), &context)?;
        self.check_crc(raw, self.settings_buffer(command))
    }
}

impl std::fmt::Debug for MeterCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterCore")
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("observers", &self.observers.len())
            .field("kwh_precision", &self.kwh_precision)
            .finish()
    }
}

fn check_time(mm: u32, dd: u32, hh: u32, minutes: u32, ss: u32) -> Result<(), MeterError> {
    let checks = [
        ((1..=12).contains(&mm), "Month must be between 1 and 12"),
        ((1..=31).contains(&dd), "Day must be between 1 and 31"),
        (hh <= 23, "Hour must be between 0 and 23, inclusive"),
        (minutes <= 59, "Minutes must be between 0 and 59, inclusive"),
        (ss <= 59, "Seconds must be between 0 and 59, inclusive"),
    ];
    match checks.iter().find(|(ok, _)| !ok) {
        Some((_, msg)) => Err(MeterError::Validation((*msg).into())),
        None => Ok(()),
    }
}

fn decimal(value: u32, width: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(width);
    put_decimal(&mut buf, value, width);
    buf
}

/// An Omnimeter on a serial line.
pub trait Meter: Send {
    fn core(&self) -> &MeterCore;

    fn core_mut(&mut self) -> &mut MeterCore;

    fn generation(&self) -> Generation;

    /// Full read: every frame of the generation, derived fields, unified
    /// buffer and observer notification.
    ///
    /// Without `send_terminator` the meter stays in its command session,
    /// which is what writes and settings reads rely on.
    fn request(&mut self, send_terminator: bool) -> Result<(), MeterError>;

    /// Read performed before `command` is written.
    fn pre_read(&mut self, _command: WriteCommand) -> Result<(), MeterError> {
        self.request(false)
    }

    /// Raw A and B frames of the last read. B is empty on v3.
    fn raw_frames(&self) -> (&[u8], &[u8]) {
        (&self.core().raw_a, &self.core().raw_b)
    }

    fn meter_address(&self) -> &str {
        self.core().address()
    }

    /// Attaches a serial line, returning the previous one.
    fn attach_port(&mut self, transport: Box<dyn Transport>) -> Option<Box<dyn Transport>> {
        self.core_mut().protocol.attach(transport)
    }

    fn detach_port(&mut self) -> Option<Box<dyn Transport>> {
        self.core_mut().protocol.detach()
    }

    /// Adds an observer notified after every successful read, in
    /// registration order.
    fn register_observer(&mut self, observer: Box<dyn MeterObserver>) -> ObserverId {
        let core = self.core_mut();
        let id = ObserverId(core.next_observer);
        core.next_observer += 1;
        core.observers.push((id, observer));
        id
    }

    /// Removes a registered observer and hands it back. Unknown ids give `None`.
    fn unregister_observer(&mut self, id: ObserverId) -> Option<Box<dyn MeterObserver>> {
        let observers = &mut self.core_mut().observers;
        let pos = observers.iter().position(|(registered, _)| *registered == id)?;
        Some(observers.remove(pos).1)
    }

    /// Forces the kWh precision for every later decode. `None` goes back to
    /// the resolved one.
    fn set_precision_override(&mut self, precision: Option<ScaleKwh>) {
        self.core_mut().precision_override = precision;
    }

    /// Unified buffer of the last successful read.
    fn read_buffer(&self) -> &ReadBuffer {
        &self.core().unified
    }

    /// Formatted value of a unified field.
    fn get_field(&self, name: &str) -> Option<&str> {
        let value = self.core().unified.formatted(name);
        if value.is_none() {
            self.core().log(Level::Debug, &format!("Requested nonexistent field: {name}"));
        }
        value
    }

    /// Result message of the last command.
    fn command_message(&self) -> &str {
        self.core().protocol.command_message()
    }

    fn snapshot(&self) -> MeterSnapshot {
        let core = self.core();
        MeterSnapshot::new(&core.address, self.generation(), &core.unified, &core.raw_a, &core.raw_b)
    }

    fn render_json(&self) -> Result<String, MeterError> {
        render_json(&self.core().address, &self.core().unified)
    }

    /// Runs the pre-read, password and write exchanges for one setting,
    /// then terminates the session.
    fn write_setting(&mut self, command: WriteCommand, payload: &[u8], password: &Password) -> Result<(), MeterError> {
        let label = command.label();
        self.core_mut().protocol.set_context(label);
        self.core_mut().protocol.clear_cmd_msg();

        let outcome = match self.pre_read(command) {
            Err(e) => {
                self.core_mut().protocol.write_cmd_msg("Bad read CRC on setting");
                Err(e)
            }
            Ok(()) => {
                let protocol = &mut self.core_mut().protocol;
                match protocol.authenticate(password) {
                    Err(e) => {
                        protocol.write_cmd_msg("Password failure");
                        Err(e)
                    }
                    Ok(()) => match protocol.send_write(command, payload) {
                        Ok(()) => {
                            protocol.write_cmd_msg(&format!("Success({label}): 06 returned."));
                            Ok(())
                        }
                        Err(e) => {
                            protocol.write_cmd_msg(&format!("Failure({label}): no 06 returned."));
                            Err(e)
                        }
                    },
                }
            }
        };

        let protocol = &mut self.core_mut().protocol;
        protocol.post_end();
        if let Err(e) = &outcome {
            protocol.log(Level::Error, &format!("[{}] {e}", e.category()));
        }
        protocol.set_context("");
        outcome
    }

    fn set_max_demand_period(&mut self, period: MaxDemandPeriod, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::MaxDemandPeriod;
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, &decimal(period.code().into(), 1), &password)
    }

    fn set_max_demand_reset_interval(&mut self, interval: MaxDemandResetInterval, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::MaxDemandResetInterval;
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, &decimal(interval.code().into(), 1), &password)
    }

    /// Changes the meter password. Use with care: a lost password locks out
    /// every write.
    fn set_meter_password(&mut self, new_password: &str, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::Password;
        let checked = Password::new(new_password)
            .and_then(|new| Password::new(password).map(|old| (new, old)))
            .map_err(|_| MeterError::Validation("Passwords must be exactly eight digits.".into()));
        let (new, old) = self.core_mut().reject(command.label(), checked)?;
        self.write_setting(command, new.as_bytes(), &old)
    }

    fn set_max_demand_reset_now(&mut self, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::MaxDemandResetNow;
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, b"000000", &password)
    }

    /// Sets the meter clock. `yy` is the two digit year in the 2000s; the
    /// weekday is computed.
    #[allow(clippy::too_many_arguments)]
    fn set_time(&mut self, yy: u32, mm: u32, dd: u32, hh: u32, minutes: u32, ss: u32, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::Time;
        let checked = check_time(mm, dd, hh, minutes, ss).and_then(|()| {
            let password = Password::new(password)?;
            Ok((iso_weekday(yy, mm, dd)?, password))
        });
        let (weekday, password) = self.core_mut().reject(command.label(), checked)?;
        self.core().log(
            Level::Info,
            &format!("Writing Date and Time 20{:02}-{mm:02}-{dd:02} {hh:02}:{minutes:02}, weekday {weekday}", yy % 100),
        );

        let mut payload = BytesMut::with_capacity(14);
        for (value, width) in [(yy % 100, 2), (mm, 2), (dd, 2), (weekday, 2), (hh, 2), (minutes, 2), (ss, 2)] {
            put_decimal(&mut payload, value, width);
        }
        self.write_setting(command, &payload, &password)
    }

    /// Sets the meter clock from the local wall clock.
    fn set_time_now(&mut self, password: &str) -> Result<(), MeterError> {
        let (yy, mm, dd, hh, mi, ss) = local_now();
        self.set_time(yy, mm, dd, hh, mi, ss, password)
    }

    fn set_ct_ratio(&mut self, ratio: CtRatio, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::CtRatio;
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, &decimal(ratio.code().into(), 4), &password)
    }

    /// Stages one tariff period for [`Meter::set_schedule_tariffs`].
    fn assign_schedule_tariff(&mut self, schedule: usize, tariff: usize, hour: u8, minute: u8, rate: u8) -> Result<(), MeterError> {
        let core = self.core_mut();
        let checked = core.schedule_tariffs.assign(schedule, tariff, hour, minute, rate);
        core.reject("assignScheduleTariff", checked)
    }

    /// Writes `tariffs`, or the staged schedule when `None`.
    fn set_schedule_tariffs(&mut self, tariffs: Option<&ScheduleTariffs>, password: &str) -> Result<(), MeterError> {
        let tariffs = tariffs.cloned().unwrap_or_else(|| self.core().schedule_tariffs.clone());
        let command = tariffs.command();
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, &tariffs.to_payload(), &password)
    }

    /// Stages one season for [`Meter::set_season_schedules`].
    fn assign_season_schedule(&mut self, season: usize, month: u8, day: u8, schedule: usize) -> Result<(), MeterError> {
        let core = self.core_mut();
        let checked = core.seasons.assign(season, month, day, schedule);
        core.reject("assignSeasonSchedule", checked)
    }

    fn set_season_schedules(&mut self, seasons: Option<&SeasonSchedules>, password: &str) -> Result<(), MeterError> {
        let seasons = seasons.cloned().unwrap_or_else(|| self.core().seasons.clone());
        let command = WriteCommand::SeasonSchedules;
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, &seasons.to_payload(), &password)
    }

    /// Stages one holiday for [`Meter::set_holiday_dates`].
    fn assign_holiday_date(&mut self, holiday: usize, month: u8, day: u8) -> Result<(), MeterError> {
        let core = self.core_mut();
        let checked = core.holiday_dates.assign(holiday, month, day);
        core.reject("assignHolidayDate", checked)
    }

    fn set_holiday_dates(&mut self, dates: Option<&HolidayDates>, password: &str) -> Result<(), MeterError> {
        let dates = dates.cloned().unwrap_or_else(|| self.core().holiday_dates.clone());
        let command = WriteCommand::HolidayDates;
        let password = self.core_mut().reject(command.label(), Password::new(password))?;
        self.write_setting(command, &dates.to_payload(), &password)
    }

    /// Assigns the schedules (zero based) used on weekends and holidays.
    fn set_weekend_holiday_schedules(&mut self, weekend: usize, holiday: usize, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::WeekendHolidaySchedules;
        let checked = if weekend >= Extents::SCHEDULES || holiday >= Extents::SCHEDULES {
            Err(MeterError::Validation(format!(
                "Out of bounds: weekend schedule {weekend} holiday schedule {holiday}"
            )))
        } else {
            Password::new(password)
        };
        let password = self.core_mut().reject(command.label(), checked)?;
        let mut payload = decimal(weekend as u32, 2);
        put_decimal(&mut payload, holiday as u32, 2);
        self.write_setting(command, &payload, &password)
    }

    /// Runs one settings read: a non-terminated full read, the settings
    /// frame, termination, then decode and checksum.
    fn read_settings_block(&mut self, command: ReadCommand) -> Result<(), MeterError> {
        self.core_mut().protocol.set_context(command.label());
        if let Err(e) = self.request(false) {
            self.core().log(Level::Warn, &format!("Pre-read failed: {e}"));
        }
        let core = self.core_mut();
        let raw = core.protocol.settings_read(command);
        core.protocol.post_end();
        let outcome = raw.and_then(|raw| core.decode_settings(command, &raw));
        match &outcome {
            Ok(()) => core.log(Level::Info, &format!("{} CRC success", command.label())),
            Err(e) => core.log(Level::Error, &format!("[{}] {e}", e.category())),
        }
        core.protocol.set_context("");
        outcome
    }

    fn read_schedule_tariffs(&mut self, block: ReadSchedules) -> Result<(), MeterError> {
        self.read_settings_block(ReadCommand::ScheduleTariffs(block))
    }

    fn read_month_tariffs(&mut self, direction: ReadMonths) -> Result<(), MeterError> {
        self.read_settings_block(ReadCommand::MonthTariffs(direction))
    }

    fn read_holiday_dates(&mut self) -> Result<(), MeterError> {
        self.read_settings_block(ReadCommand::HolidayDates)
    }

    /// Reads every settings block, stopping at the first failure.
    fn read_settings(&mut self) -> Result<(), MeterError> {
        self.read_holiday_dates()?;
        self.read_month_tariffs(ReadMonths::Kwh)?;
        self.read_month_tariffs(ReadMonths::KwhReverse)?;
        self.read_schedule_tariffs(ReadSchedules::Schedules1To4)?;
        self.read_schedule_tariffs(ReadSchedules::Schedules5To8)
    }

    /// Zero based schedule and tariff.
    fn extract_schedule_tariff(&self, schedule: usize, tariff: usize) -> ScheduleTariffReading {
        let core = self.core();
        extract_schedule_tariff(&core.schedules_1_to_4, &core.schedules_5_to_8, schedule, tariff)
    }

    /// Zero based month, most recent first.
    fn extract_month_tariff(&self, month: usize) -> MonthTariffReading {
        extract_month_tariff(&self.core().months_fwd, &self.core().months_rev, month)
    }

    fn extract_holiday_date(&self, holiday: usize) -> HolidayDateReading {
        extract_holiday_date(&self.core().holidays, holiday)
    }

    fn extract_holiday_weekend_schedules(&self) -> HolidayWeekendSchedules {
        extract_holiday_weekend_schedules(&self.core().holidays)
    }
}

/// Single frame meter.
#[derive(Debug)]
pub struct V3Meter {
    core: MeterCore,
    block_a: ReadBuffer,
}

impl V3Meter {
    pub fn new(address: &str) -> Self {
        Self::with_sink(address, default_sink())
    }

    pub fn with_sink(address: &str, sink: SharedSink) -> Self {
        let mut core = MeterCore::new(address, sink);
        core.precision_override = Some(ScaleKwh::Scale10);
        V3Meter {
            core,
            block_a: v3_layout(),
        }
    }

    fn read(&mut self) -> Result<(), MeterError> {
        let precision = self.core.kwh_precision();
        let raw = self.core.read_frame(QueryKind::Single, &mut self.block_a, precision)?;
        self.core.raw_a = raw;
        fill_power_factors(&mut self.block_a);
        self.core.rebuild_unified(&[&self.block_a]);
        Ok(())
    }
}

impl Meter for V3Meter {
    fn core(&self) -> &MeterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MeterCore {
        &mut self.core
    }

    fn generation(&self) -> Generation {
        Generation::V3
    }

    /// v3 meters keep a fixed kWh precision; `None` is ignored.
    fn set_precision_override(&mut self, precision: Option<ScaleKwh>) {
        self.core.precision_override = Some(precision.unwrap_or(ScaleKwh::Scale10));
    }

    fn request(&mut self, send_terminator: bool) -> Result<(), MeterError> {
        let saved = self.core.protocol.context().to_string();
        self.core.protocol.set_context("request[v3A]");
        let outcome = self.read();
        if send_terminator {
            self.core.protocol.post_end();
        }
        self.core.protocol.set_context(&saved);
        outcome?;
        self.core.notify_observers();
        Ok(())
    }
}

/// Dual frame meter.
#[derive(Debug)]
pub struct V4Meter {
    core: MeterCore,
    block_a: ReadBuffer,
    block_b: ReadBuffer,
}

impl V4Meter {
    pub fn new(address: &str) -> Self {
        Self::with_sink(address, default_sink())
    }

    pub fn with_sink(address: &str, sink: SharedSink) -> Self {
        V4Meter {
            core: MeterCore::new(address, sink),
            block_a: v4_a_layout(),
            block_b: v4_b_layout(),
        }
    }

    /// Reads the A frame only. Resolves the kWh precision on first success.
    pub fn request_a(&mut self) -> Result<(), MeterError> {
        let saved = self.core.protocol.context().to_string();
        self.core.protocol.set_context("request[v4A]");
        let precision = self.core.kwh_precision();
        let outcome = self.core.read_frame(QueryKind::A, &mut self.block_a, precision);
        self.core.protocol.set_context(&saved);
        self.core.raw_a = outcome?;
        Ok(())
    }

    /// Reads the B frame with the precision resolved from A.
    pub fn request_b(&mut self) -> Result<(), MeterError> {
        let saved = self.core.protocol.context().to_string();
        self.core.protocol.set_context("request[v4B]");
        let precision = self.core.effective_precision();
        let outcome = self.core.read_frame(QueryKind::B, &mut self.block_b, Some(precision));
        self.core.protocol.set_context(&saved);
        self.core.raw_b = outcome?;
        Ok(())
    }

    /// Power factors from B, and net watts from A's direction flags applied
    /// to B's line watts.
    fn calculate_fields(&mut self) {
        fill_power_factors(&mut self.block_b);
        let direction = int_field(&self.block_a, field::STATE_WATTS_DIR);
        let watts = [
            int_field(&self.block_b, field::RMS_WATTS_LN_1),
            int_field(&self.block_b, field::RMS_WATTS_LN_2),
            int_field(&self.block_b, field::RMS_WATTS_LN_3),
        ];
        let net = net_watts(direction, watts);
        let names = [
            field::NET_CALC_WATTS_LN_1,
            field::NET_CALC_WATTS_LN_2,
            field::NET_CALC_WATTS_LN_3,
            field::NET_CALC_WATTS_TOT,
        ];
        for (name, value) in names.into_iter().zip(net) {
            self.block_b.set(name, value.to_string(), FieldValue::Int(value));
        }
    }

    /// Sets a relay. `seconds` of zero holds the state indefinitely.
    pub fn set_relay(&mut self, seconds: u16, relay: Relay, state: RelayState, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::Relay(relay);
        let checked = if seconds > RelayInterval::MAX {
            Err(MeterError::Validation("Relay duration must be between 0 and 9999.".into()))
        } else {
            Password::new(password)
        };
        let password = self.core.reject(command.label(), checked)?;
        let mut payload = decimal(state.code().into(), 1);
        put_decimal(&mut payload, seconds.into(), 4);
        self.write_setting(command, &payload, &password)
    }

    pub fn set_pulse_input_ratio(&mut self, line: PulseInput, ratio: u16, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::PulseInputRatio(line);
        let checked = if ratio > OMNI_RATIO_MAX {
            Err(MeterError::Validation(format!("Pulse input ratio must be between 0 and {OMNI_RATIO_MAX}.")))
        } else {
            Password::new(password)
        };
        let password = self.core.reject(command.label(), checked)?;
        self.write_setting(command, &decimal(ratio.into(), 4), &password)
    }

    /// Zeroes the resettable kWh registers. Not idempotent.
    pub fn set_zero_resettable_kwh(&mut self, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::ZeroResettableKwh;
        let password = self.core.reject(command.label(), Password::new(password))?;
        self.write_setting(command, b"", &password)
    }

    pub fn set_pulse_output_ratio(&mut self, ratio: PulseOutput, password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::PulseOutputRatio;
        let password = self.core.reject(command.label(), Password::new(password))?;
        self.write_setting(command, &decimal(ratio.code().into(), 4), &password)
    }

    /// Sets the LCD rotation, 1 to 40 items.
    pub fn set_lcd(&mut self, items: &[LcdItem], password: &str) -> Result<(), MeterError> {
        let command = WriteCommand::Lcd;
        let checked = if items.is_empty() || items.len() > OMNI_LCD_SLOTS {
            Err(MeterError::Validation(format!(
                "LCD item list must have between 1 and {OMNI_LCD_SLOTS} items"
            )))
        } else {
            Password::new(password)
        };
        let password = self.core.reject(command.label(), checked)?;
        let mut payload = BytesMut::with_capacity(OMNI_LCD_SLOTS * 2);
        for slot in 0..OMNI_LCD_SLOTS {
            let code = items.get(slot).map(|item| item.code()).unwrap_or(0);
            put_decimal(&mut payload, code.into(), 2);
        }
        self.write_setting(command, &payload, &password)
    }
}

impl Meter for V4Meter {
    fn core(&self) -> &MeterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MeterCore {
        &mut self.core
    }

    fn generation(&self) -> Generation {
        Generation::V4
    }

    fn request(&mut self, send_terminator: bool) -> Result<(), MeterError> {
        let outcome = self.request_a().and_then(|()| self.request_b());
        if send_terminator {
            self.core.protocol.post_end();
        }
        outcome?;
        self.calculate_fields();
        self.core.rebuild_unified(&[&self.block_a, &self.block_b]);
        self.core.notify_observers();
        Ok(())
    }

    /// Relay, pulse and kWh reset writes only need the A frame.
    fn pre_read(&mut self, command: WriteCommand) -> Result<(), MeterError> {
        match command {
            WriteCommand::Relay(_)
            | WriteCommand::PulseInputRatio(_)
            | WriteCommand::ZeroResettableKwh
            | WriteCommand::PulseOutputRatio => self.request_a(),
            _ => self.request(false),
        }
    }
}

/// Builds the meter matching `generation`.
pub fn meter_for(generation: Generation, address: &str, sink: SharedSink) -> Box<dyn Meter> {
    match generation {
        Generation::V3 => Box::new(V3Meter::with_sink(address, sink)),
        Generation::V4 => Box::new(V4Meter::with_sink(address, sink)),
    }
}
