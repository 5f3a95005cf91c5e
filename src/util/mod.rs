//! # Utility Modules
//!
//! Hex helpers and logging patterns shared by the codec and the modem
//! layer.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex_upper, HexError};
pub use logging::{log_pdu_hex, LogThrottle};
