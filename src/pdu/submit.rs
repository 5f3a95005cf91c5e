//! Outbound SMS-SUBMIT assembly.
//!
//! Text is carried as UCS-2. A message of up to 70 UTF-16 units fits one
//! PDU; anything longer is split into parts of at most 67 units, each
//! prefixed with a 6-octet concatenation header.

use crate::constants::{
    CONCAT_UDH_LEN, PDU_MESSAGE_REFERENCE, PDU_PROTOCOL_ID, PDU_TYPE_SUBMIT, PDU_TYPE_SUBMIT_UDH,
    UCS2_MULTI_PART_CHARS, UCS2_SINGLE_PART_CHARS, VALIDITY_PERIOD_DEFAULT,
};
use crate::error::ModemError;
use crate::pdu::address::AddressField;
use crate::pdu::charset::Charset;
use crate::pdu::udh::{encode_concat_header, ConcatInfo};
use crate::pdu::FirstOctet;
use crate::util::hex::encode_hex_upper;

/// One encoded SMS-SUBMIT, ready for `AT+CMGS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitPdu {
    /// Upper-case hex, including the leading `00` SMSC length octet.
    pub hex: String,
    /// TPDU length in octets, SMSC field excluded. This is the `AT+CMGS` argument.
    pub tpdu_length: usize,
    pub concat: Option<ConcatInfo>,
}

/// Encodes `text` to `number` as one or more SMS-SUBMIT PDUs.
///
/// `reference` tags every part of a concatenated message and is ignored for
/// single-part messages. Text that would fit the GSM default alphabet is
/// still sent as UCS-2 because septet packing is not implemented.
pub fn encode_submit(
    number: &str,
    text: &str,
    reference: u8,
) -> Result<Vec<SubmitPdu>, ModemError> {
    let destination = AddressField::for_destination(number)?;
    let parts = split_ucs2(text);

    if parts.len() > usize::from(u8::MAX) {
        return Err(ModemError::codec(
            "user_data",
            format!("message needs {} parts, at most 255 allowed", parts.len()),
        ));
    }

    let total = parts.len() as u8;
    let pdus = parts
        .iter()
        .enumerate()
        .map(|(i, units)| {
            let payload: Vec<u8> = units.iter().flat_map(|u| u.to_be_bytes()).collect();
            let concat = (total > 1).then(|| ConcatInfo {
                reference: u16::from(reference),
                total,
                sequence: i as u8 + 1,
            });
            build_submit(&destination, Charset::Ucs2, &payload, concat)
        })
        .collect();

    Ok(pdus)
}

/// Splits text into UTF-16 parts under the single/multi-part capacity rule.
///
/// A surrogate pair is never separated; a part that would end on a high
/// surrogate ends one unit earlier instead.
pub fn split_ucs2(text: &str) -> Vec<Vec<u16>> {
    let units: Vec<u16> = text.encode_utf16().collect();
    if units.len() <= UCS2_SINGLE_PART_CHARS {
        return vec![units];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    while start < units.len() {
        let mut end = (start + UCS2_MULTI_PART_CHARS).min(units.len());
        if end < units.len() && is_high_surrogate(units[end - 1]) {
            end -= 1;
        }
        parts.push(units[start..end].to_vec());
        start = end;
    }
    parts
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

/// Assembles one SMS-SUBMIT.
///
/// Order: SMSC length (0, modem default), first octet, message reference,
/// destination address, PID, DCS, validity period, UDL, UDH, user data.
/// The validity period octet is present only when the first octet declares
/// the relative format (0x11); 0x41 declares none and the SMSC default
/// applies.
fn build_submit(
    destination: &AddressField,
    charset: Charset,
    payload: &[u8],
    concat: Option<ConcatInfo>,
) -> SubmitPdu {
    let first_octet = FirstOctet::from_bits_retain(if concat.is_some() {
        PDU_TYPE_SUBMIT_UDH
    } else {
        PDU_TYPE_SUBMIT
    });

    let capacity = 16 + destination.semi_octets.len() + payload.len() + CONCAT_UDH_LEN;
    let mut pdu = Vec::with_capacity(capacity);
    pdu.push(0x00);
    pdu.push(first_octet.bits());
    pdu.push(PDU_MESSAGE_REFERENCE);
    pdu.push(destination.digit_count);
    pdu.push(destination.address_type);
    pdu.extend_from_slice(&destination.semi_octets);
    pdu.push(PDU_PROTOCOL_ID);
    pdu.push(charset.dcs());
    if first_octet.validity_period_len() == 1 {
        pdu.push(VALIDITY_PERIOD_DEFAULT);
    }

    match concat {
        Some(info) => {
            pdu.push((payload.len() + CONCAT_UDH_LEN) as u8);
            let header = encode_concat_header(info.reference as u8, info.total, info.sequence);
            pdu.extend_from_slice(&header);
        }
        None => pdu.push(payload.len() as u8),
    }
    pdu.extend_from_slice(payload);

    SubmitPdu {
        tpdu_length: pdu.len() - 1,
        hex: encode_hex_upper(&pdu),
        concat,
    }
}
