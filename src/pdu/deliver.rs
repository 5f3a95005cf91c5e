//! Inbound PDU parsing.
//!
//! Handles SMS-DELIVER (received) and SMS-SUBMIT (stored sent/unsent) TPDUs
//! as listed by `AT+CMGL`. Parsing is done over the decoded octets with
//! `nom`'s complete parsers, so a field that runs past the end of the buffer
//! becomes a [`ModemError::CodecError`] naming that field rather than a
//! slicing fault.

use crate::error::ModemError;
use crate::pdu::address::render_address;
use crate::pdu::charset::{ucs2_decode_bytes, Charset};
use crate::pdu::timestamp::{decode_timestamp, TIMESTAMP_LEN};
use crate::pdu::udh::parse_concat_info;
use crate::pdu::{DecodedMessage, FirstOctet, MessageKind};
use crate::util::hex::{decode_hex, encode_hex_upper};
use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

/// Maps a short read on `field` into a codec error.
fn field<'a, T>(
    name: &'static str,
    result: IResult<&'a [u8], T>,
) -> Result<(&'a [u8], T), ModemError> {
    result.map_err(|_| ModemError::codec(name, "PDU ends before this field"))
}

/// Decodes one hex PDU as exchanged with the modem.
pub fn decode_pdu(pdu_hex: &str) -> Result<DecodedMessage, ModemError> {
    let octets = decode_hex(pdu_hex).map_err(|e| ModemError::codec("hex", e.to_string()))?;
    decode_octets(&octets)
}

/// Decodes one PDU from raw octets (SMSC field included).
pub fn decode_octets(input: &[u8]) -> Result<DecodedMessage, ModemError> {
    let (input, smsc_len) = field("smsc_length", be_u8(input))?;
    let (input, _smsc) = field("smsc", take(smsc_len)(input))?;

    let (input, first) = field("pdu_type", be_u8(input))?;
    let first_octet = FirstOctet::from_bits_retain(first);
    let kind = match first_octet.mti() {
        0x00 => MessageKind::Deliver,
        0x01 => MessageKind::Submit,
        mti => {
            return Err(ModemError::codec(
                "pdu_type",
                format!("unsupported message type indicator {mti} in {first:02X}"),
            ))
        }
    };

    let input = match kind {
        MessageKind::Submit => field("message_reference", be_u8(input))?.0,
        MessageKind::Deliver => input,
    };

    let (input, digit_count) = field("address_length", be_u8(input))?;
    let (input, address_type) = field("address_type", be_u8(input))?;
    let (input, raw_address) = field("address", take((usize::from(digit_count) + 1) / 2)(input))?;
    let sender = render_address(digit_count, address_type, raw_address);

    let (input, _pid) = field("protocol_id", be_u8(input))?;
    let (input, dcs) = field("data_coding_scheme", be_u8(input))?;
    let charset = Charset::from_dcs(dcs);

    let (input, timestamp) = match kind {
        MessageKind::Deliver => {
            let (input, raw) = field("timestamp", take(TIMESTAMP_LEN)(input))?;
            (input, Some(decode_timestamp(raw)?))
        }
        MessageKind::Submit => {
            let vp_len = first_octet.validity_period_len();
            let (input, _vp) = field("validity_period", take(vp_len)(input))?;
            (input, None)
        }
    };

    let (input, udl) = field("user_data_length", be_u8(input))?;
    let ud_octets = match charset {
        Charset::Gsm7 => (usize::from(udl) * 7 + 7) / 8,
        Charset::EightBit | Charset::Ucs2 => usize::from(udl),
    };
    let (_, user_data) = field("user_data", take(ud_octets)(input))?;

    let (body, concat) = if first_octet.contains(FirstOctet::UDHI) {
        let (rest, udhl) = field("user_data_header", be_u8(user_data))?;
        let (rest, header) = field("user_data_header", take(udhl)(rest))?;
        (rest, parse_concat_info(header)?)
    } else {
        (user_data, None)
    };

    let text = match charset {
        Charset::Ucs2 => ucs2_decode_bytes(body)?,
        // 7-bit unpacking is not implemented; 8-bit data has no text form.
        Charset::Gsm7 | Charset::EightBit => encode_hex_upper(body),
    };

    Ok(DecodedMessage {
        kind,
        sender,
        timestamp,
        text,
        charset,
        concat,
    })
}
