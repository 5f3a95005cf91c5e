//! # Modem Layer
//!
//! Everything between a byte stream and the SMS-level operations:
//!
//! - [`transport`]: opening ports and the [`Transport`] abstraction
//! - [`connection`]: one attached modem and its line guard
//! - [`transaction`]: the AT command/response engine
//! - [`response`]: parsers for AT responses and unsolicited codes
//! - [`sms`]: identity, signal, listing, send and delete on one connection
//! - [`registry`]: the multi-port [`ModemRegistry`]
//! - [`mock`]: an in-memory modem for tests and demos

pub mod connection;
pub mod mock;
pub mod registry;
pub mod response;
pub mod sms;
pub mod transaction;
pub mod transport;

pub use connection::{DeviceInfo, ModemConnection};
pub use registry::{IncomingMessageHandler, ModemRegistry, PortEvent, PortState, PortStatus};
pub use response::{MessageStatus, SignalQuality, Urc};
pub use sms::{SendReport, StoredMessage};
pub use transaction::{execute, PendingCommand, Transaction};
pub use transport::{PortOpener, SerialConfig, SerialOpener, Transport};
