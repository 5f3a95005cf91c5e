//! # Hex Helpers
//!
//! PDUs travel between host and modem as hex text. Decoding accepts the
//! loose forms modems and users produce (mixed case, embedded whitespace).
//!
//! ```rust
//! use modem_rs::util::hex::{decode_hex, encode_hex_upper};
//!
//! let octets = decode_hex("07 91 68").unwrap();
//! assert_eq!(octets, [0x07, 0x91, 0x68]);
//! assert_eq!(encode_hex_upper(&octets), "079168");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Invalid hex character: {0}")]
    InvalidCharacter(char),

    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,
}

/// Upper-case hex, the form modems expect in `AT+CMGS` payloads.
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if let Some(bad) = cleaned.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(HexError::InvalidCharacter(bad));
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }
    hex::decode(&cleaned).map_err(|_| HexError::OddLength(cleaned.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_whitespace_and_case() {
        assert_eq!(decode_hex("4f 60\r\n59 7d").unwrap(), vec![0x4F, 0x60, 0x59, 0x7D]);
    }

    #[test]
    fn test_encode_upper() {
        assert_eq!(encode_hex_upper(&[0xAB, 0x0C]), "AB0C");
    }

    #[test]
    fn test_errors() {
        assert_eq!(decode_hex(""), Err(HexError::EmptyString));
        assert_eq!(decode_hex("  "), Err(HexError::EmptyString));
        assert_eq!(decode_hex("123"), Err(HexError::OddLength(3)));
        assert_eq!(decode_hex("0G"), Err(HexError::InvalidCharacter('G')));
    }
}
