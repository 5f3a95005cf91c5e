//! Byte-stream transport beneath a modem connection.
//!
//! Anything that is `AsyncRead + AsyncWrite` can carry AT traffic: a real
//! serial port, the in-memory [`MockModem`](crate::modem::mock::MockModem),
//! or a scripted `tokio_test::io::Mock`. Ports are opened through a
//! [`PortOpener`] so the registry can scan without hardware in tests.

use crate::error::ModemError;
use async_trait::async_trait;
use log::warn;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;

/// A duplex byte stream a modem speaks over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: 115_200,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Opens a transport for a device path.
#[async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(
        &self,
        path: &str,
        config: &SerialConfig,
    ) -> Result<Box<dyn Transport>, ModemError>;
}

/// Opens real serial devices, 8N1 without flow control.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

#[async_trait]
impl PortOpener for SerialOpener {
    async fn open(
        &self,
        path: &str,
        config: &SerialConfig,
    ) -> Result<Box<dyn Transport>, ModemError> {
        let port = tokio_serial::new(path, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| ModemError::TransportError(format!("{path}: {e}")))?;
        Ok(Box::new(port))
    }
}

/// Registry key for a device path: its final component (`/dev/ttyUSB0` -> `ttyUSB0`).
pub fn port_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Expands configured candidates into concrete device paths.
///
/// Entries without `*` are taken as-is. Entries like `/dev/ttyUSB*` are
/// matched against the ports the system enumerates.
pub fn expand_candidates(patterns: &[String]) -> Vec<String> {
    let available = if patterns.iter().any(|p| p.contains('*')) {
        match tokio_serial::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("Failed to enumerate serial ports: {e}");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    match_candidates(patterns, &available)
}

/// Matches candidate patterns against a list of known port paths. A `*`
/// stands for any run of characters. The result is sorted and free of
/// duplicates.
pub fn match_candidates(patterns: &[String], available: &[String]) -> Vec<String> {
    let mut paths = Vec::new();
    for pattern in patterns {
        match pattern.split_once('*') {
            None => paths.push(pattern.clone()),
            Some((prefix, suffix)) => paths.extend(
                available
                    .iter()
                    .filter(|port| {
                        port.len() >= prefix.len() + suffix.len()
                            && port.starts_with(prefix)
                            && port.ends_with(suffix)
                    })
                    .cloned(),
            ),
        }
    }
    paths.sort();
    paths.dedup();
    paths
}
