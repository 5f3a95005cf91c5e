//! Character set detection and UCS-2 text encoding.

use crate::constants::{DCS_GSM7, DCS_UCS2};
use crate::error::ModemError;
use crate::util::hex::decode_hex;
use serde::Serialize;

/// GSM 03.38 default alphabet, basic character set (escape excluded).
const GSM7_DEFAULT_ALPHABET: &str = concat!(
    "@£$¥èéùìòÇ\nØø\rÅå",
    "Δ_ΦΓΛΩΠΨΣΘΞÆæßÉ",
    " !\"#¤%&'()*+,-./",
    "0123456789:;<=>?",
    "¡ABCDEFGHIJKLMNO",
    "PQRSTUVWXYZÄÖÑÜ§",
    "¿abcdefghijklmno",
    "pqrstuvwxyzäöñüà",
);

/// Text character set selected by a data coding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Charset {
    Gsm7,
    EightBit,
    Ucs2,
}

impl Charset {
    /// Alphabet announced by a TP-DCS octet.
    pub fn from_dcs(dcs: u8) -> Self {
        match dcs & 0xF0 {
            // General data coding (incl. automatic deletion group),
            // bits 3..2 select the alphabet.
            0x00..=0x70 => match (dcs >> 2) & 0x03 {
                0x01 => Charset::EightBit,
                0x02 => Charset::Ucs2,
                _ => Charset::Gsm7,
            },
            // Message waiting, UCS-2 store group.
            0xE0 => Charset::Ucs2,
            // Data coding / message class group, bit 2 selects 8-bit.
            0xF0 if dcs & 0x04 != 0 => Charset::EightBit,
            _ => Charset::Gsm7,
        }
    }

    /// TP-DCS octet for an outbound message in this charset.
    pub fn dcs(self) -> u8 {
        match self {
            Charset::Gsm7 => DCS_GSM7,
            Charset::EightBit => 0x04,
            Charset::Ucs2 => DCS_UCS2,
        }
    }
}

/// True when every character of `text` is in the GSM default alphabet.
pub fn is_gsm7_encodable(text: &str) -> bool {
    text.chars().all(|c| GSM7_DEFAULT_ALPHABET.contains(c))
}

/// GSM 7-bit for texts entirely in the default alphabet, UCS-2 otherwise.
pub fn select_charset(text: &str) -> Charset {
    if is_gsm7_encodable(text) {
        Charset::Gsm7
    } else {
        Charset::Ucs2
    }
}

/// Encodes `text` as UTF-16BE upper-case hex.
pub fn ucs2_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4);
    for unit in text.encode_utf16() {
        out.push_str(&format!("{unit:04X}"));
    }
    out
}

/// Decodes UTF-16BE hex back into text. Spaces are ignored.
pub fn ucs2_decode(hex_text: &str) -> Result<String, ModemError> {
    if hex_text.trim().is_empty() {
        return Ok(String::new());
    }
    let bytes = decode_hex(hex_text).map_err(|e| ModemError::codec("user_data", e.to_string()))?;
    ucs2_decode_bytes(&bytes)
}

/// Decodes raw UTF-16BE octets. Unpaired surrogates become U+FFFD.
pub(crate) fn ucs2_decode_bytes(bytes: &[u8]) -> Result<String, ModemError> {
    if bytes.len() % 2 != 0 {
        return Err(ModemError::codec(
            "user_data",
            format!("odd UCS-2 octet count {}", bytes.len()),
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Decodes a phone number the modem reported as UCS-2 hex (e.g. `+CNUM`
/// under `AT+CSCS="UCS2"`). Returns the input unchanged unless it decodes to
/// dial characters only.
pub fn decode_ucs2_number(value: &str) -> String {
    let trimmed = value.trim();
    let is_ucs2_hex = !trimmed.is_empty()
        && trimmed.len() % 4 == 0
        && trimmed.chars().all(|c| c.is_ascii_hexdigit());
    if !is_ucs2_hex {
        return value.to_string();
    }
    match ucs2_decode(trimmed) {
        Ok(text) if text.chars().all(|c| c.is_ascii_digit() || "+*#".contains(c)) => text,
        _ => value.to_string(),
    }
}
