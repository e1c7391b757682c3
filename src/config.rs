use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    BASE_LATITUDE, BASE_LONGITUDE, DEFAULT_LOG_FILTER, DEFAULT_SERVER_ADDRESS, JITTER_DEGREES,
    LOG_STDOUT, NUM_DEVICES, RECONNECT_DELAY_MS, REPORT_INTERVAL_MS, REPORT_JITTER_MS,
};
use crate::gps_simulator::codec::{CodecError, DeviceIdentity, ReportEncoder};
use crate::gps_simulator::device::SessionSettings;
use crate::traffic_models::ReportSchedule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid identity at index {index}: {source}")]
    Identity { index: usize, source: CodecError },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Simulator settings. Every field is optional in the JSON file and falls
/// back to the values in [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub server_address: String,
    pub devices: usize,
    /// Fixed identities for the first devices; the rest are generated.
    pub identities: Vec<String>,
    pub report_interval_ms: u64,
    pub report_jitter_ms: u64,
    pub reconnect_delay_ms: u64,
    pub io_timeout_ms: Option<u64>,
    pub seed: Option<u64>,
    pub base_latitude: f64,
    pub base_longitude: f64,
    pub jitter_degrees: f64,
    pub log_file: Option<PathBuf>,
    pub log_stdout: bool,
    pub log_filter: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            devices: NUM_DEVICES,
            identities: Vec::new(),
            report_interval_ms: REPORT_INTERVAL_MS,
            report_jitter_ms: REPORT_JITTER_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            io_timeout_ms: None,
            seed: None,
            base_latitude: BASE_LATITUDE,
            base_longitude: BASE_LONGITUDE,
            jitter_degrees: JITTER_DEGREES,
            log_file: None,
            log_stdout: LOG_STDOUT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_file<T>(path: T) -> Result<Self, ConfigError>
    where
        T: AsRef<Path>,
    {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices == 0 {
            return Err(ConfigError::Invalid("at least one device is required".into()));
        }
        match self.server_address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "server address must be host:port, got {:?}",
                    self.server_address
                )))
            }
        }
        if self.identities.len() > self.devices {
            return Err(ConfigError::Invalid(format!(
                "{} identities given for {} devices",
                self.identities.len(),
                self.devices
            )));
        }
        self.parsed_identities()?;
        if self.io_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("io timeout must be positive".into()));
        }
        if !(-90.0..=90.0).contains(&self.base_latitude) {
            return Err(ConfigError::Invalid(format!("latitude {} out of range", self.base_latitude)));
        }
        if !(-180.0..=180.0).contains(&self.base_longitude) {
            return Err(ConfigError::Invalid(format!("longitude {} out of range", self.base_longitude)));
        }
        if !(0.0..1.0).contains(&self.jitter_degrees) {
            return Err(ConfigError::Invalid(format!(
                "jitter must be in [0, 1) degrees, got {}",
                self.jitter_degrees
            )));
        }
        Ok(())
    }

    pub fn parsed_identities(&self) -> Result<Vec<DeviceIdentity>, ConfigError> {
        self.identities
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                DeviceIdentity::new(raw.as_str()).map_err(|source| ConfigError::Identity { index, source })
            })
            .collect()
    }

    pub fn report_schedule(&self) -> ReportSchedule {
        ReportSchedule::new(
            Duration::from_millis(self.report_interval_ms),
            Duration::from_millis(self.report_jitter_ms),
        )
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            server_address: self.server_address.clone(),
            schedule: self.report_schedule(),
            io_timeout: self.io_timeout(),
            encoder: ReportEncoder::default(),
        }
    }
}
