//! # Configuration
//!
//! Runtime settings for the registry, loaded from JSON and optionally
//! overridden from the environment. Missing fields take their defaults.
//!
//! ```rust
//! use modem_rs::ModemConfig;
//!
//! let config: ModemConfig = serde_json::from_str(r#"{ "ports": ["/dev/ttyUSB2"] }"#).unwrap();
//! assert_eq!(config.baud_rate, 115_200);
//! config.validate().unwrap();
//! ```

use crate::error::ModemError;
use crate::modem::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Comma-separated candidate ports, replacing the configured list.
pub const ENV_PORT: &str = "MODEM_PORT";
pub const ENV_BAUD: &str = "MODEM_BAUD";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Device paths or single-`*` patterns such as `/dev/ttyUSB*`.
    pub ports: Vec<String>,
    pub baud_rate: u32,
    pub probe_timeout_ms: u64,
    pub command_timeout_ms: u64,
    /// Wait for the final result after a PDU payload; covers network delivery.
    pub send_timeout_ms: u64,
    /// How long the read loop holds the line per idle read.
    pub idle_read_ms: u64,
    pub select_ucs2_charset: bool,
    pub event_buffer: usize,
    /// 0 disables the periodic health check.
    pub health_check_interval_secs: u64,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            ports: vec!["/dev/ttyUSB*".to_string(), "/dev/ttyACM*".to_string()],
            baud_rate: 115_200,
            probe_timeout_ms: 1000,
            command_timeout_ms: 5000,
            send_timeout_ms: 60_000,
            idle_read_ms: 100,
            select_ucs2_charset: false,
            event_buffer: 100,
            health_check_interval_secs: 30,
        }
    }
}

impl ModemConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModemError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModemError::ConfigError(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ModemError::ConfigError(format!("{}: {e}", path.display())))
    }

    /// Applies `MODEM_PORT` and `MODEM_BAUD` when set.
    pub fn apply_env(&mut self) -> Result<(), ModemError> {
        let ports = std::env::var(ENV_PORT).ok();
        let baud = std::env::var(ENV_BAUD).ok();
        self.apply_overrides(ports.as_deref(), baud.as_deref())
    }

    /// Applies environment-style overrides: a comma-separated port list and
    /// a decimal baud rate. Blank values are ignored.
    pub fn apply_overrides(
        &mut self,
        ports: Option<&str>,
        baud: Option<&str>,
    ) -> Result<(), ModemError> {
        if let Some(ports) = ports.filter(|p| !p.trim().is_empty()) {
            self.ports = ports
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(baud) = baud.map(str::trim).filter(|b| !b.is_empty()) {
            self.baud_rate = baud
                .parse()
                .map_err(|_| {
                    ModemError::ConfigError(format!("{ENV_BAUD}: invalid baud rate {baud:?}"))
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModemError> {
        if self.baud_rate == 0 {
            return Err(ModemError::ConfigError("baud_rate must be non-zero".into()));
        }
        let timeouts = [
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
            ("idle_read_ms", self.idle_read_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(ModemError::ConfigError(format!("{name} must be non-zero")));
        }
        if self.event_buffer == 0 {
            return Err(ModemError::ConfigError("event_buffer must be non-zero".into()));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn idle_read(&self) -> Duration {
        Duration::from_millis(self.idle_read_ms)
    }

    /// `None` when periodic health checks are disabled.
    pub fn health_check_interval(&self) -> Option<Duration> {
        let secs = self.health_check_interval_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baudrate: self.baud_rate,
            timeout: self.command_timeout(),
        }
    }
}
