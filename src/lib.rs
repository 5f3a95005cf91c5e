//! # modem-rs - Cellular Modems over AT Commands
//!
//! The modem-rs crate drives GSM/LTE modems attached as serial ports and
//! exchanges SMS with them in PDU mode.
//!
//! ## Features
//!
//! - Scan candidate serial ports and probe them with `AT`
//! - Serialize AT command transactions per port, run ports in parallel
//! - Encode outgoing SMS as SMS-SUBMIT PDUs, split into concatenated parts when needed
//! - Decode listed PDUs and reassemble concatenated messages
//! - Fan unsolicited modem output out to any number of subscribers
//! - Hand newly received messages to a registered callback
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! modem-rs = "0.1.0"
//! ```
//!
//! ```rust,no_run
//! use modem_rs::{init_logger, ModemConfig, ModemRegistry};
//!
//! # async fn demo() -> Result<(), modem_rs::ModemError> {
//! init_logger();
//! let registry = ModemRegistry::new(ModemConfig::default());
//! let ports = registry.scan().await;
//! if let Some(port) = ports.first() {
//!     let report = registry.send_message(port, "+8613800138000", "hello").await?;
//!     println!("sent in {} part(s)", report.parts);
//! }
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod modem;
pub mod pdu;
pub mod util;

pub use crate::config::ModemConfig;
pub use crate::error::ModemError;
pub use crate::event_bus::{CancelHandle, EventBus};
pub use crate::logging::{init_logger, log_info};

pub use modem::{
    DeviceInfo, IncomingMessageHandler, MessageStatus, ModemConnection, ModemRegistry, PortEvent,
    PortState, PortStatus, SendReport, SignalQuality, StoredMessage,
};
pub use pdu::{decode_pdu, encode_submit, Charset, DecodedMessage, ReassemblyBuffer, SubmitPdu};
