//! Semi-octet phone number encoding.
//!
//! Phone numbers are carried as swapped nibble pairs: `"12345"` becomes
//! `"2143F5"`, with an `F` filler nibble padding odd digit counts.

use crate::constants::{ADDRESS_TYPE_INTERNATIONAL, ADDRESS_TYPE_NATIONAL};
use crate::error::ModemError;
use crate::util::hex::encode_hex_upper;

/// Longest address the TP-DA field can carry, in digits.
const MAX_ADDRESS_DIGITS: usize = 20;

/// Type-of-number bits of an address type octet.
const TYPE_OF_NUMBER_MASK: u8 = 0x70;
/// International number.
const TON_INTERNATIONAL: u8 = 0x10;
/// Alphanumeric address (GSM 7-bit packed).
const TON_ALPHANUMERIC: u8 = 0x50;

/// Encodes a phone number into its semi-octet digit string.
///
/// A leading `+` is dropped, an odd digit count gets an `F` filler appended,
/// and every adjacent pair is swapped.
pub fn encode_phone_number(number: &str) -> String {
    let mut digits: Vec<char> = number.strip_prefix('+').unwrap_or(number).chars().collect();
    if digits.len() % 2 != 0 {
        digits.push('F');
    }

    let mut out = String::with_capacity(digits.len());
    for pair in digits.chunks(2) {
        out.push(pair[1]);
        out.push(pair[0]);
    }
    out
}

/// Decodes a semi-octet digit string, the inverse of [`encode_phone_number`].
///
/// Pairs are swapped back and a trailing `F` filler is stripped. A dangling
/// nibble in an odd-length input is ignored. The result never carries a `+`.
pub fn decode_phone_number(semi_octets: &str) -> String {
    let chars: Vec<char> = semi_octets.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for pair in chars.chunks_exact(2) {
        out.push(pair[1]);
        out.push(pair[0]);
    }
    if out.ends_with(|c: char| c == 'F' || c == 'f') {
        out.pop();
    }
    out
}

/// Destination address field of an outbound PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressField {
    /// Number of digits, not octets.
    pub digit_count: u8,
    pub address_type: u8,
    pub semi_octets: Vec<u8>,
}

impl AddressField {
    /// Validates `number` and packs it for the TP-DA field.
    pub fn for_destination(number: &str) -> Result<Self, ModemError> {
        let trimmed = number.trim();
        let international = trimmed.starts_with('+');
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(ModemError::codec("destination_address", "empty number"));
        }
        if digits.len() > MAX_ADDRESS_DIGITS {
            return Err(ModemError::codec(
                "destination_address",
                format!("{} digits exceeds {MAX_ADDRESS_DIGITS}", digits.len()),
            ));
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_digit()) {
            return Err(ModemError::codec(
                "destination_address",
                format!("invalid character {bad:?}"),
            ));
        }

        let semi_octets = hex::decode(encode_phone_number(digits))
            .map_err(|e| ModemError::codec("destination_address", e.to_string()))?;

        Ok(AddressField {
            digit_count: digits.len() as u8,
            address_type: if international {
                ADDRESS_TYPE_INTERNATIONAL
            } else {
                ADDRESS_TYPE_NATIONAL
            },
            semi_octets,
        })
    }
}

/// Renders a received address field.
///
/// `raw` holds the `(digit_count + 1) / 2` address octets. Alphanumeric
/// senders are returned as upper-case hex since 7-bit unpacking is not done.
pub(crate) fn render_address(digit_count: u8, address_type: u8, raw: &[u8]) -> String {
    let hex = encode_hex_upper(raw);
    match address_type & TYPE_OF_NUMBER_MASK {
        TON_ALPHANUMERIC => hex,
        ton => {
            let mut digits = decode_phone_number(&hex);
            digits.truncate(digit_count as usize);
            if ton == TON_INTERNATIONAL {
                format!("+{digits}")
            } else {
                digits
            }
        }
    }
}
