//! # Configuration
//!
//! A single JSON document describes one serial line and the meters hanging
//! off it:
//!
//! ```json
//! {
//!   "port": "/dev/ttyUSB0",
//!   "serial": { "baudrate": 9600 },
//!   "meters": [ { "address": "300001463", "generation": "v4" } ],
//!   "password": "00000000"
//! }
//! ```
//!
//! Missing keys take their defaults. Short addresses are left padded with
//! zeros to twelve digits when loaded.

use crate::constants::{OMNI_ADDRESS_LEN, OMNI_DEFAULT_PASSWORD};
use crate::error::MeterError;
use crate::meter::frame::normalize_address;
use crate::meter::password::Password;
use crate::meter::transport::{PollConfig, SerialConfig};
use crate::meter::types::Generation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterEntry {
    pub address: String,
    #[serde(default = "default_generation")]
    pub generation: Generation,
}

fn default_generation() -> Generation {
    Generation::V4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub port: String,
    pub serial: SerialConfig,
    pub poll: PollConfig,
    pub meters: Vec<MeterEntry>,
    pub password: String,
}

impl Default for MeterConfig {
    fn default() -> Self {
        MeterConfig {
            port: "/dev/ttyUSB0".to_string(),
            serial: SerialConfig::default(),
            poll: PollConfig::default(),
            meters: Vec::new(),
            password: OMNI_DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl MeterConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeterError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parses and validates a configuration document.
    pub fn from_json(text: &str) -> Result<Self, MeterError> {
        let mut config: MeterConfig = serde_json::from_str(text)?;
        for meter in &mut config.meters {
            meter.address = normalize_address(&meter.address);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MeterError> {
        if self.port.trim().is_empty() {
            return Err(MeterError::Config("port must not be empty".into()));
        }
        if self.serial.baudrate == 0 {
            return Err(MeterError::Config("baudrate must be positive".into()));
        }
        for meter in &self.meters {
            if meter.address.len() != OMNI_ADDRESS_LEN || !meter.address.bytes().all(|b| b.is_ascii_digit()) {
                return Err(MeterError::Config(format!(
                    "meter address {:?} must be {OMNI_ADDRESS_LEN} digits",
                    meter.address
                )));
            }
        }
        Password::new(&self.password).map_err(|e| MeterError::Config(format!("password: {e}")))?;
        Ok(())
    }

    pub fn password(&self) -> Result<Password, MeterError> {
        Password::new(&self.password)
    }
}
