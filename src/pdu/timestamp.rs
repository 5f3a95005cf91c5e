//! Service-centre timestamp (TP-SCTS) decoding.

use crate::error::ModemError;
use chrono::NaiveDate;

/// Octets in a TP-SCTS field: YY MM DD hh mm ss TZ, each as swapped nibbles.
pub const TIMESTAMP_LEN: usize = 7;

/// Decodes the 14 semi-octet timestamp into `YYYY-MM-DD HH:MM:SS`.
///
/// The time zone octet is read but not applied; the result is the
/// service-centre local time. Years are taken as 20YY.
pub fn decode_timestamp(octets: &[u8]) -> Result<String, ModemError> {
    if octets.len() < TIMESTAMP_LEN {
        return Err(ModemError::codec(
            "timestamp",
            format!("{} octets, expected {TIMESTAMP_LEN}", octets.len()),
        ));
    }

    let mut fields = [0u32; 6];
    for (slot, &octet) in fields.iter_mut().zip(octets) {
        *slot = swapped_bcd(octet)?;
    }
    let [year, month, day, hour, minute, second] = fields;

    let stamp = NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            ModemError::codec(
                "timestamp",
                format!("invalid date 20{year:02}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"),
            )
        })?;

    Ok(stamp.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// One swapped-nibble BCD octet: `0x52` is 25.
fn swapped_bcd(octet: u8) -> Result<u32, ModemError> {
    let low = octet & 0x0F;
    let high = octet >> 4;
    if low > 9 || high > 9 {
        return Err(ModemError::codec(
            "timestamp",
            format!("non-decimal semi-octet {octet:02X}"),
        ));
    }
    Ok(u32::from(low) * 10 + u32::from(high))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_timestamp() {
        let octets = [0x52, 0x01, 0x12, 0x21, 0x45, 0x00, 0x23];
        assert_eq!(decode_timestamp(&octets).unwrap(), "2025-10-21 12:54:00");
    }

    #[test]
    fn test_decode_timestamp_short() {
        let err = decode_timestamp(&[0x52, 0x01]).unwrap_err();
        assert!(matches!(err, ModemError::CodecError { field: "timestamp", .. }));
    }

    #[test]
    fn test_decode_timestamp_rejects_hex_nibbles() {
        assert!(decode_timestamp(&[0x5A, 0x01, 0x12, 0x21, 0x45, 0x00, 0x23]).is_err());
    }

    #[test]
    fn test_decode_timestamp_rejects_impossible_date() {
        // 2025-13-21
        assert!(decode_timestamp(&[0x52, 0x31, 0x12, 0x21, 0x45, 0x00, 0x23]).is_err());
    }
}
