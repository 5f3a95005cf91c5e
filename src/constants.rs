//! AT Command and PDU Constants
//!
//! This module defines the AT command strings exchanged with the modem and the
//! fixed field values used when assembling and parsing SMS PDUs (3GPP TS 23.040).

/// Attention / liveness probe.
pub const AT_PROBE: &str = "AT";

/// Disable command echo.
pub const AT_ECHO_OFF: &str = "ATE0";

/// Select PDU mode for SMS.
pub const AT_PDU_MODE: &str = "AT+CMGF=0";

/// Select the UCS-2 TE character set.
pub const AT_CHARSET_UCS2: &str = "AT+CSCS=\"UCS2\"";

/// Manufacturer identification.
pub const AT_MANUFACTURER: &str = "AT+CGMI";

/// Model identification.
pub const AT_MODEL: &str = "AT+CGMM";

/// Serial number (IMEI).
pub const AT_IMEI: &str = "AT+CGSN";

/// Subscriber identity (IMSI).
pub const AT_IMSI: &str = "AT+CIMI";

/// Current operator.
pub const AT_OPERATOR: &str = "AT+COPS?";

/// Subscriber number.
pub const AT_SUBSCRIBER_NUMBER: &str = "AT+CNUM";

/// Signal quality.
pub const AT_SIGNAL_QUALITY: &str = "AT+CSQ";

/// List all stored messages (PDU mode status 4 = ALL).
pub const AT_LIST_ALL_MESSAGES: &str = "AT+CMGL=4";

/// Send a PDU; followed by the TPDU length.
pub const AT_SEND_MESSAGE: &str = "AT+CMGS=";

/// Delete a stored message; followed by its index.
pub const AT_DELETE_MESSAGE: &str = "AT+CMGD=";

/// Line terminator appended to every command.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Ctrl-Z, ends a PDU payload after the `>` prompt.
pub const CTRL_Z: u8 = 0x1A;

/// Success result code.
pub const RESULT_OK: &str = "OK";

/// Failure result code (also matches `+CME ERROR` / `+CMS ERROR`).
pub const RESULT_ERROR: &str = "ERROR";

/// Payload prompt issued after `AT+CMGS=<len>`.
pub const RESULT_PROMPT: &str = ">";

/// Default terminator set for a command transaction.
pub const DEFAULT_TERMINATORS: &[&str] = &[RESULT_OK, RESULT_ERROR, RESULT_PROMPT];

/// Terminators for the first step of a send: prompt or failure.
pub const PROMPT_TERMINATORS: &[&str] = &[RESULT_PROMPT, RESULT_ERROR];

/// Terminators for a payload step: the final result only.
pub const FINAL_TERMINATORS: &[&str] = &[RESULT_OK, RESULT_ERROR];

/// Unsolicited "new message stored" indication.
pub const URC_NEW_MESSAGE: &str = "+CMTI:";

/// SMS-SUBMIT first octet without a user data header (VPF relative).
pub const PDU_TYPE_SUBMIT: u8 = 0x11;

/// SMS-SUBMIT first octet with a user data header.
pub const PDU_TYPE_SUBMIT_UDH: u8 = 0x41;

/// Message reference; 0 lets the modem assign one.
pub const PDU_MESSAGE_REFERENCE: u8 = 0x00;

/// Type of address: international number.
pub const ADDRESS_TYPE_INTERNATIONAL: u8 = 0x91;

/// Type of address: national/unknown number.
pub const ADDRESS_TYPE_NATIONAL: u8 = 0x81;

/// Protocol identifier: plain SMS.
pub const PDU_PROTOCOL_ID: u8 = 0x00;

/// Data coding scheme: GSM 7-bit default alphabet.
pub const DCS_GSM7: u8 = 0x00;

/// Data coding scheme: UCS-2.
pub const DCS_UCS2: u8 = 0x08;

/// Relative validity period, 4 days.
pub const VALIDITY_PERIOD_DEFAULT: u8 = 0xAA;

/// Maximum UCS-2 characters in a single-part message.
pub const UCS2_SINGLE_PART_CHARS: usize = 70;

/// Maximum UCS-2 characters per part of a concatenated message.
pub const UCS2_MULTI_PART_CHARS: usize = 67;

/// Information element: concatenated SMS, 8-bit reference.
pub const IEI_CONCAT_8BIT: u8 = 0x00;

/// Information element: concatenated SMS, 16-bit reference.
pub const IEI_CONCAT_16BIT: u8 = 0x08;

/// Octets a concatenation UDH adds to the user data length (`05 00 03 rr tt ss`).
pub const CONCAT_UDH_LEN: usize = 6;
