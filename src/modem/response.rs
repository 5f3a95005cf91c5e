//! Parsers for the AT responses and unsolicited result codes this crate
//! consumes. Not a general AT grammar: each parser knows one reply shape.

use crate::constants::{RESULT_ERROR, RESULT_OK, URC_NEW_MESSAGE};
use crate::error::ModemError;
use crate::pdu::charset::decode_ucs2_number;
use log::warn;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::{char, space0, u32 as dec_u32, u8 as dec_u8};
use nom::sequence::delimited;
use nom::IResult;
use serde::{Serialize, Serializer};
use std::fmt;

/// Received signal strength as reported by `AT+CSQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalQuality {
    /// 0..=31, or 99 when unknown.
    pub rssi: u8,
    /// Bit error rate class, 99 when unknown.
    pub ber: u8,
    /// `-113 + 2 * rssi`, only for rssi 0..=31.
    pub dbm: Option<i32>,
}

impl SignalQuality {
    pub fn new(rssi: u8, ber: u8) -> Self {
        let dbm = (rssi <= 31).then(|| -113 + 2 * i32::from(rssi));
        SignalQuality { rssi, ber, dbm }
    }
}

/// Storage status of a listed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    ReceivedUnread,
    ReceivedRead,
    StoredUnsent,
    StoredSent,
    Unknown(u8),
}

impl From<u8> for MessageStatus {
    fn from(stat: u8) -> Self {
        match stat {
            0 => MessageStatus::ReceivedUnread,
            1 => MessageStatus::ReceivedRead,
            2 => MessageStatus::StoredUnsent,
            3 => MessageStatus::StoredSent,
            other => MessageStatus::Unknown(other),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::ReceivedUnread => f.write_str("REC UNREAD"),
            MessageStatus::ReceivedRead => f.write_str("REC READ"),
            MessageStatus::StoredUnsent => f.write_str("STO UNSENT"),
            MessageStatus::StoredSent => f.write_str("STO SENT"),
            MessageStatus::Unknown(stat) => write!(f, "UNKNOWN ({stat})"),
        }
    }
}

impl Serialize for MessageStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One `+CMGL` entry: storage index, status and the raw PDU hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedPdu {
    pub index: u32,
    pub status: MessageStatus,
    pub pdu: String,
}

/// Unsolicited result codes acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urc {
    /// `+CMTI: "<mem>",<index>`: a message was stored.
    NewMessage { storage: String, index: u32 },
}

fn lines(response: &str) -> impl Iterator<Item = &str> {
    response.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Fails with [`ModemError::ProtocolError`] when the response carries a
/// final error result (`ERROR`, `+CME ERROR: n`, `+CMS ERROR: n`).
pub fn check_result(response: &str) -> Result<(), ModemError> {
    let failed = lines(response).any(|line| {
        line == RESULT_ERROR || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
    });
    if failed {
        Err(ModemError::ProtocolError(response.trim().to_string()))
    } else {
        Ok(())
    }
}

/// First meaningful line of an identity query (`AT+CGMI` and friends).
///
/// Echoed commands, blank lines and `OK` are skipped; a `+CGMI:` style prefix
/// and surrounding quotes are removed.
pub fn extract_value(response: &str) -> String {
    let first = lines(response).find(|line| *line != RESULT_OK && !line.starts_with("AT"));
    let Some(line) = first else {
        return String::new();
    };
    let value = match line.split_once(':') {
        Some((prefix, rest)) if prefix.starts_with('+') => rest.trim(),
        _ => line,
    };
    value.trim_matches('"').to_string()
}

fn csq_line(input: &str) -> IResult<&str, (u8, u8)> {
    let (input, _) = tag("+CSQ:")(input)?;
    let (input, _) = space0(input)?;
    let (input, rssi) = dec_u8(input)?;
    let (input, _) = char(',')(input)?;
    let (input, _) = space0(input)?;
    let (input, ber) = dec_u8(input)?;
    Ok((input, (rssi, ber)))
}

/// Parses `+CSQ: <rssi>,<ber>`.
pub fn parse_signal_quality(response: &str) -> Result<SignalQuality, ModemError> {
    lines(response)
        .find_map(|line| csq_line(line).ok())
        .map(|(_, (rssi, ber))| SignalQuality::new(rssi, ber))
        .ok_or_else(|| {
            ModemError::ProtocolError(format!("unexpected +CSQ response: {}", response.trim()))
        })
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_until("\""), char('"'))(input)
}

/// Operator name from `+COPS: 0,0,"<name>",7`.
pub fn parse_operator(response: &str) -> Option<String> {
    let line = lines(response).find(|line| line.starts_with("+COPS:"))?;
    let start = line.find('"')?;
    quoted(&line[start..]).ok().map(|(_, name)| name.to_string())
}

/// Subscriber number from `+CNUM: "<alpha>","<number>",<type>`.
///
/// Numbers reported in UCS-2 hex (after `AT+CSCS="UCS2"`) are decoded.
pub fn parse_subscriber_number(response: &str) -> Option<String> {
    let line = lines(response).find(|line| line.starts_with("+CNUM:"))?;
    let fields: Vec<&str> = line["+CNUM:".len()..].split(',').map(str::trim).collect();
    let number = fields.get(1)?.trim_matches('"');
    if number.is_empty() {
        return None;
    }
    Some(decode_ucs2_number(number))
}

fn cmgl_header(input: &str) -> IResult<&str, (u32, u8)> {
    let (input, _) = tag("+CMGL:")(input)?;
    let (input, _) = space0(input)?;
    let (input, index) = dec_u32(input)?;
    let (input, _) = char(',')(input)?;
    let (input, _) = space0(input)?;
    let (input, stat) = dec_u8(input)?;
    Ok((input, (index, stat)))
}

/// Splits an `AT+CMGL=4` (PDU mode) listing into entries.
///
/// Each `+CMGL: <index>,<stat>,[<alpha>],<length>` header is followed by
/// one PDU line. Malformed headers and headers without a PDU are skipped.
pub fn parse_message_list(response: &str) -> Vec<ListedPdu> {
    let mut entries = Vec::new();
    let mut iter = lines(response).peekable();

    while let Some(line) = iter.next() {
        if !line.starts_with("+CMGL:") {
            continue;
        }
        let Ok((_, (index, stat))) = cmgl_header(line) else {
            warn!("Skipping malformed listing header {line:?}");
            continue;
        };
        let pdu = match iter.peek() {
            Some(next) if !next.starts_with('+') && *next != RESULT_OK => Some(next.to_string()),
            _ => None,
        };
        match pdu {
            Some(pdu) => {
                iter.next();
                entries.push(ListedPdu {
                    index,
                    status: MessageStatus::from(stat),
                    pdu,
                });
            }
            None => warn!("Listing entry {index} has no PDU line"),
        }
    }
    entries
}

fn cmti(input: &str) -> IResult<&str, (&str, u32)> {
    let (input, _) = tag(URC_NEW_MESSAGE)(input)?;
    let (input, _) = space0(input)?;
    let (input, storage) = quoted(input)?;
    let (input, _) = char(',')(input)?;
    let (input, _) = space0(input)?;
    let (input, index) = dec_u32(input)?;
    Ok((input, (storage, index)))
}

/// Recognizes one unsolicited line.
pub fn parse_urc(line: &str) -> Option<Urc> {
    cmti(line.trim()).ok().map(|(_, (storage, index))| Urc::NewMessage {
        storage: storage.to_string(),
        index,
    })
}

/// Every recognized unsolicited code in a block of text.
pub fn find_urcs(text: &str) -> Vec<Urc> {
    lines(text).filter_map(parse_urc).collect()
}
