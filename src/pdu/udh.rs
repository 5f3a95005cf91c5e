//! User data header (UDH) handling for concatenated messages.

use crate::constants::{IEI_CONCAT_16BIT, IEI_CONCAT_8BIT};
use crate::error::ModemError;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use serde::Serialize;

/// Concatenation metadata carried by one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConcatInfo {
    pub reference: u16,
    pub total: u8,
    /// 1-based position of this fragment.
    pub sequence: u8,
}

/// Builds the 6-octet header `05 00 03 <reference> <total> <sequence>`.
pub fn encode_concat_header(reference: u8, total: u8, sequence: u8) -> [u8; 6] {
    [0x05, IEI_CONCAT_8BIT, 0x03, reference, total, sequence]
}

/// Walks the information elements of a header body (UDHL octet excluded)
/// and returns the concatenation element, if any. Unknown elements are
/// skipped by their declared length.
pub fn parse_concat_info(body: &[u8]) -> Result<Option<ConcatInfo>, ModemError> {
    let mut input = body;
    let mut found = None;

    while !input.is_empty() {
        let (rest, (iei, data)) = information_element(input).map_err(|_| {
            ModemError::codec("user_data_header", "information element overruns header")
        })?;
        input = rest;

        let parsed = match iei {
            IEI_CONCAT_8BIT => concat_8bit(data).ok().map(|(_, info)| info),
            IEI_CONCAT_16BIT => concat_16bit(data).ok().map(|(_, info)| info),
            _ => continue,
        };
        match parsed {
            Some(info) => found = Some(info),
            None => {
                return Err(ModemError::codec(
                    "user_data_header",
                    format!("concatenation element {iei:02X} too short"),
                ))
            }
        }
    }

    Ok(found)
}

fn information_element(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, iei) = be_u8(input)?;
    let (input, len) = be_u8(input)?;
    let (input, data) = take(len)(input)?;
    Ok((input, (iei, data)))
}

fn concat_8bit(input: &[u8]) -> IResult<&[u8], ConcatInfo> {
    let (input, reference) = be_u8(input)?;
    let (input, total) = be_u8(input)?;
    let (input, sequence) = be_u8(input)?;
    Ok((
        input,
        ConcatInfo {
            reference: u16::from(reference),
            total,
            sequence,
        },
    ))
}

fn concat_16bit(input: &[u8]) -> IResult<&[u8], ConcatInfo> {
    let (input, reference) = be_u16(input)?;
    let (input, total) = be_u8(input)?;
    let (input, sequence) = be_u8(input)?;
    Ok((
        input,
        ConcatInfo {
            reference,
            total,
            sequence,
        },
    ))
}
