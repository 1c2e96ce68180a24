use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use omnimeter_rs::meter::decoder::{decode, read_scale_code};
use omnimeter_rs::meter::frame::normalize_address;
use omnimeter_rs::meter::schema::{field, v3_layout, v4_a_layout, v4_b_layout};
use omnimeter_rs::meter::types::{CtRatio, MaxDemandPeriod, Relay, RelayState};
use omnimeter_rs::util::hex::decode_hex;
use omnimeter_rs::{
    default_sink, init_logger, log_debug, log_error, log_info, log_warn, meter_for, render_json, Generation, Meter,
    MeterConfig, MeterEntry, MeterError, SerialTransport, Transport, V4Meter,
};

#[derive(Parser)]
#[command(name = "omnimeter-cli")]
#[command(about = "CLI tool for EKM Omnimeter v3/v4 meters")]
struct Cli {
    /// JSON configuration file. Command line values override it.
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Meter address; defaults to the first meter in the configuration.
    #[arg(short, long)]
    address: Option<String>,

    #[arg(short, long, value_enum)]
    generation: Option<GenerationArg>,

    #[arg(long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenerationArg {
    V3,
    V4,
}

impl From<GenerationArg> for Generation {
    fn from(arg: GenerationArg) -> Self {
        match arg {
            GenerationArg::V3 => Generation::V3,
            GenerationArg::V4 => Generation::V4,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Full read, printed as JSON.
    Read {
        /// Print the snapshot with native values and raw frames instead.
        #[arg(long)]
        snapshot: bool,
    },
    /// Reads schedules, monthly totals and holidays.
    Settings,
    /// Sets the meter clock; without a value the local time is used.
    SetTime {
        /// `yy-mm-dd hh:mm:ss`
        time: Option<String>,
    },
    SetCt {
        amps: u16,
    },
    /// v4 only.
    SetRelay {
        relay: u8,
        #[arg(value_parser = ["open", "close"])]
        state: String,
        #[arg(default_value = "0")]
        seconds: u16,
    },
    SetMaxDemandPeriod {
        /// 15, 30 or 60 minutes.
        minutes: u32,
    },
    /// Decodes a captured hex frame without touching the line.
    Decode {
        hex: String,
        #[arg(long, value_enum, default_value = "v4")]
        layout: FrameLayout,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FrameLayout {
    V3,
    V4,
    V4b,
}

fn load_config(cli: &Cli) -> Result<MeterConfig> {
    let mut config = match &cli.config {
        Some(path) => MeterConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => MeterConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baudrate) = cli.baudrate {
        config.serial.baudrate = baudrate;
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    }
    if let Some(address) = &cli.address {
        let generation = cli.generation.map(Generation::from).unwrap_or(Generation::V4);
        config.meters.insert(
            0,
            MeterEntry {
                address: normalize_address(address),
                generation,
            },
        );
    }
    config.validate()?;
    log_debug(&format!("{} meter(s) configured on {}", config.meters.len(), config.port));
    Ok(config)
}

fn first_meter(config: &MeterConfig) -> Result<&MeterEntry> {
    config.meters.first().context("no meter address given")
}

fn open_port(config: &MeterConfig) -> Box<dyn Transport> {
    Box::new(SerialTransport::new(
        &config.port,
        config.serial.clone(),
        config.poll.clone(),
        default_sink(),
    ))
}

fn open_meter(config: &MeterConfig) -> Result<Box<dyn Meter>> {
    let entry = first_meter(config)?;
    let mut meter = meter_for(entry.generation, &entry.address, default_sink());
    meter.attach_port(open_port(config));
    Ok(meter)
}

/// Relay commands exist only on v4 meters, so the generation is checked
/// before any port is opened.
fn open_v4_meter(config: &MeterConfig) -> Result<V4Meter> {
    let entry = first_meter(config)?;
    if entry.generation != Generation::V4 {
        bail!("relays are only available on v4 meters");
    }
    let mut meter = V4Meter::with_sink(&entry.address, default_sink());
    meter.attach_port(open_port(config));
    Ok(meter)
}

/// Logs the command message at a level matching the outcome.
fn report(message: &str, outcome: Result<(), MeterError>) -> Result<()> {
    match outcome {
        Ok(()) => {
            log_info(message);
            Ok(())
        }
        Err(e) => {
            log_error(message);
            Err(e.into())
        }
    }
}

fn parse_time(text: &str) -> Result<(u32, u32, u32, u32, u32, u32)> {
    let parts: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .context("time must be numeric")?;
    match parts[..] {
        [yy, mm, dd, hh, mi, ss] => Ok((yy % 100, mm, dd, hh, mi, ss)),
        _ => bail!("expected yy-mm-dd hh:mm:ss"),
    }
}

fn decode_offline(hex: &str, layout: FrameLayout) -> Result<()> {
    let raw = decode_hex(hex).context("invalid hex frame")?;
    let mut buffer = match layout {
        FrameLayout::V3 => v3_layout(),
        FrameLayout::V4 => v4_a_layout(),
        FrameLayout::V4b => v4_b_layout(),
    };
    let code = match layout {
        FrameLayout::V3 => 1,
        _ => read_scale_code(&raw, &buffer).unwrap_or_else(|| {
            log_warn("kWh_Scale unreadable, treating as no scaling");
            0
        }),
    };
    let sink = default_sink();
    decode(&raw, &mut buffer, code, sink.as_ref(), "decode")?;
    let address = buffer.formatted(field::METER_ADDRESS).unwrap_or("").to_string();
    println!("{}", render_json(&address, &buffer)?);
    Ok(())
}

fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    if let Commands::Decode { hex, layout } = &cli.command {
        return decode_offline(hex, *layout);
    }

    let config = load_config(&cli)?;
    let password = config.password.clone();

    if let Commands::SetRelay { relay, state, seconds } = &cli.command {
        let mut meter = open_v4_meter(&config)?;
        let relay = Relay::try_from(*relay)?;
        let state = if state == "close" { RelayState::Close } else { RelayState::Open };
        let outcome = meter.set_relay(*seconds, relay, state, &password);
        return report(meter.command_message(), outcome);
    }

    let mut meter = open_meter(&config)?;

    match cli.command {
        Commands::Read { snapshot } => {
            meter.request(true)?;
            if snapshot {
                println!("{}", meter.snapshot().to_json()?);
            } else {
                println!("{}", meter.render_json()?);
            }
        }
        Commands::Settings => {
            meter.read_settings()?;
            let summary = serde_json::json!({
                "holidays": (0..20).map(|h| meter.extract_holiday_date(h)).collect::<Vec<_>>(),
                "weekend_holiday": meter.extract_holiday_weekend_schedules(),
                "months": (0..6).map(|m| meter.extract_month_tariff(m)).collect::<Vec<_>>(),
                "schedules": (0..8)
                    .flat_map(|s| (0..4).map(move |t| (s, t)))
                    .map(|(s, t)| meter.extract_schedule_tariff(s, t))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::SetTime { time } => {
            let outcome = match time {
                Some(text) => {
                    let (yy, mm, dd, hh, mi, ss) = parse_time(&text)?;
                    meter.set_time(yy, mm, dd, hh, mi, ss, &password)
                }
                None => {
                    log_debug("no time given, using the local clock");
                    meter.set_time_now(&password)
                }
            };
            report(meter.command_message(), outcome)?;
        }
        Commands::SetCt { amps } => {
            let outcome = CtRatio::try_from(amps).and_then(|ct| meter.set_ct_ratio(ct, &password));
            report(meter.command_message(), outcome)?;
        }
        Commands::SetMaxDemandPeriod { minutes } => {
            let period = match minutes {
                15 => MaxDemandPeriod::FifteenMinutes,
                30 => MaxDemandPeriod::ThirtyMinutes,
                60 => MaxDemandPeriod::SixtyMinutes,
                other => bail!("unsupported max demand period {other}"),
            };
            let outcome = meter.set_max_demand_period(period, &password);
            report(meter.command_message(), outcome)?;
        }
        Commands::SetRelay { .. } | Commands::Decode { .. } => {}
    }

    Ok(())
}
