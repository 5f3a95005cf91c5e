//! SMS and identity operations on one connection.

use crate::constants::{
    AT_DELETE_MESSAGE, AT_IMEI, AT_IMSI, AT_LIST_ALL_MESSAGES, AT_MANUFACTURER, AT_MODEL,
    AT_OPERATOR, AT_SEND_MESSAGE, AT_SIGNAL_QUALITY, AT_SUBSCRIBER_NUMBER, FINAL_TERMINATORS,
    PROMPT_TERMINATORS, RESULT_PROMPT,
};
use crate::error::ModemError;
use crate::modem::connection::{DeviceInfo, ModemConnection};
use crate::modem::response::{
    check_result, extract_value, parse_message_list, parse_operator, parse_signal_quality,
    parse_subscriber_number, ListedPdu, MessageStatus, SignalQuality,
};
use crate::modem::transaction::{execute, PendingCommand};
use crate::pdu::{decode_pdu, encode_submit, DecodedMessage, ReassemblyBuffer};
use crate::util::logging::log_pdu_hex;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;

/// A message as stored in the modem, fragments already merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    /// Storage indices of every fragment, in sequence order.
    pub indices: Vec<u32>,
    /// Status of the first fragment.
    pub status: MessageStatus,
    pub message: DecodedMessage,
    /// False when some fragments of a concatenated message are missing.
    pub complete: bool,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub parts: usize,
    /// Concatenation reference, for multi-part messages.
    pub reference: Option<u8>,
}

/// Runs one command and fails on an error result.
async fn query(
    conn: &ModemConnection,
    command: &str,
    timeout: Duration,
) -> Result<String, ModemError> {
    let response = execute(conn, &PendingCommand::new(command, timeout)).await?;
    check_result(&response)?;
    Ok(response)
}

/// Best-effort query: error results leave the field empty, transport
/// failures still propagate.
async fn query_optional(
    conn: &ModemConnection,
    command: &str,
    timeout: Duration,
) -> Result<Option<String>, ModemError> {
    match query(conn, command, timeout).await {
        Ok(response) => Ok(Some(response)),
        Err(ModemError::ProtocolError(response)) => {
            debug!("{}: {command} unsupported ({response})", conn.name());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Reads manufacturer, model, IMEI, IMSI, operator and own number, and
/// caches them on the connection.
pub async fn device_info(
    conn: &ModemConnection,
    timeout: Duration,
) -> Result<DeviceInfo, ModemError> {
    let mut info = DeviceInfo::default();
    for (field, command) in [
        (&mut info.manufacturer, AT_MANUFACTURER),
        (&mut info.model, AT_MODEL),
        (&mut info.imei, AT_IMEI),
        (&mut info.imsi, AT_IMSI),
    ] {
        if let Some(response) = query_optional(conn, command, timeout).await? {
            *field = extract_value(&response);
        }
    }
    if let Some(response) = query_optional(conn, AT_OPERATOR, timeout).await? {
        info.operator = parse_operator(&response).unwrap_or_default();
    }
    if let Some(response) = query_optional(conn, AT_SUBSCRIBER_NUMBER, timeout).await? {
        info.phone_number = parse_subscriber_number(&response).unwrap_or_default();
    }

    conn.set_identity(info.clone());
    Ok(info)
}

pub async fn signal_quality(
    conn: &ModemConnection,
    timeout: Duration,
) -> Result<SignalQuality, ModemError> {
    let response = query(conn, AT_SIGNAL_QUALITY, timeout).await?;
    parse_signal_quality(&response)
}

/// Lists every stored message (`AT+CMGL=4`) and merges concatenated ones.
pub async fn list_messages(
    conn: &ModemConnection,
    timeout: Duration,
) -> Result<Vec<StoredMessage>, ModemError> {
    let command =
        PendingCommand::new(AT_LIST_ALL_MESSAGES, timeout).with_terminators(FINAL_TERMINATORS);
    let response = execute(conn, &command).await?;
    check_result(&response)?;
    Ok(assemble_listing(&parse_message_list(&response)))
}

/// Decodes listed PDUs and merges fragments.
///
/// Undecodable entries are logged and skipped. Groups still missing
/// fragments at the end of the listing are returned as partial messages.
pub fn assemble_listing(entries: &[ListedPdu]) -> Vec<StoredMessage> {
    let mut buffer: ReassemblyBuffer<(u32, MessageStatus)> = ReassemblyBuffer::new();
    let mut messages = Vec::new();

    type Tagged = (DecodedMessage, Vec<(u32, MessageStatus)>);
    let finish = |(message, tags): Tagged, complete: bool| StoredMessage {
        status: tags.first().map_or(MessageStatus::Unknown(0), |(_, status)| *status),
        indices: tags.into_iter().map(|(index, _)| index).collect(),
        message,
        complete,
    };

    for entry in entries {
        match decode_pdu(&entry.pdu) {
            Ok(message) => {
                if let Some(merged) = buffer.ingest_with(message, (entry.index, entry.status)) {
                    messages.push(finish(merged, true));
                }
            }
            Err(e) => {
                warn!("Skipping stored message {}: {e}", entry.index);
                log_pdu_hex("Undecodable PDU", &entry.pdu);
            }
        }
    }
    for partial in buffer.drain_incomplete() {
        messages.push(finish(partial, false));
    }

    messages.sort_by_key(|m| m.indices.first().copied().unwrap_or(u32::MAX));
    messages
}

/// Sends `text` to `number`, one prompt/payload transaction per part.
///
/// The port is held across both steps of a part. The first failing part
/// aborts the send; parts already sent are not retried.
pub async fn send_message(
    conn: &ModemConnection,
    number: &str,
    text: &str,
    reference: u8,
    command_timeout: Duration,
    send_timeout: Duration,
) -> Result<SendReport, ModemError> {
    let parts = encode_submit(number, text, reference)?;
    let total = parts.len();

    for (i, part) in parts.iter().enumerate() {
        let mut transaction = conn.transaction().await?;

        let command = format!("{AT_SEND_MESSAGE}{}", part.tpdu_length);
        let prompt =
            PendingCommand::new(command, command_timeout).with_terminators(PROMPT_TERMINATORS);
        let response = transaction.exchange(&prompt).await?;
        if !response.contains(RESULT_PROMPT) {
            return Err(ModemError::ProtocolError(format!(
                "part {}/{total}: no prompt ({response})",
                i + 1
            )));
        }

        let payload = PendingCommand::payload(part.hex.as_str(), send_timeout);
        let response = transaction.exchange(&payload).await?;
        check_result(&response).map_err(|e| match e {
            ModemError::ProtocolError(detail) => {
                ModemError::ProtocolError(format!("part {}/{total}: {detail}", i + 1))
            }
            other => other,
        })?;
        debug!("{}: part {}/{total} accepted", conn.name(), i + 1);
    }

    info!("{}: sent {total}-part message to {number}", conn.name());
    Ok(SendReport {
        parts: total,
        reference: (total > 1).then_some(reference),
    })
}

pub async fn delete_message(
    conn: &ModemConnection,
    index: u32,
    timeout: Duration,
) -> Result<(), ModemError> {
    query(conn, &format!("{AT_DELETE_MESSAGE}{index}"), timeout).await?;
    Ok(())
}
