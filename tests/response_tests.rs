//! Integration tests for AT response parsing.

use modem_rs::modem::response::{
    check_result, extract_value, find_urcs, parse_message_list, parse_operator,
    parse_signal_quality, parse_subscriber_number,
};
use modem_rs::modem::{MessageStatus, Urc};
use modem_rs::ModemError;

/// Tests the `AT+CSQ` example: rssi 15 is -83 dBm.
#[test]
fn test_signal_quality_example() {
    let quality = parse_signal_quality("+CSQ: 15,99\r\nOK\r\n").unwrap();
    assert_eq!(quality.rssi, 15);
    assert_eq!(quality.ber, 99);
    assert_eq!(quality.dbm, Some(-83));
}

/// Tests that rssi 99 means unknown strength.
#[test]
fn test_signal_quality_unknown() {
    assert_eq!(parse_signal_quality("+CSQ: 99,99\r\nOK").unwrap().dbm, None);
    assert!(matches!(
        parse_signal_quality("OK"),
        Err(ModemError::ProtocolError(_))
    ));
}

/// Tests error result detection.
#[test]
fn test_check_result() {
    assert!(check_result("+CGMI: x\r\nOK").is_ok());
    for reply in ["ERROR", "+CME ERROR: 10", "\r\n+CMS ERROR: 500\r\n"] {
        assert!(matches!(check_result(reply), Err(ModemError::ProtocolError(_))), "{reply}");
    }
}

/// Tests identity value extraction with echo and prefixes.
#[test]
fn test_identity_values() {
    assert_eq!(extract_value("AT+CGMI\r\nQuectel\r\n\r\nOK"), "Quectel");
    assert_eq!(extract_value("+CGSN: \"867123456789012\"\r\nOK"), "867123456789012");
    assert_eq!(extract_value("OK"), "");
    assert_eq!(
        parse_operator("+COPS: 0,0,\"CHINA MOBILE\",7\r\n\r\nOK").as_deref(),
        Some("CHINA MOBILE")
    );
    assert_eq!(
        parse_subscriber_number("+CNUM: \"\",\"+8613800138000\",145\r\nOK").as_deref(),
        Some("+8613800138000")
    );
}

/// Tests splitting a PDU-mode listing into entries.
#[test]
fn test_message_listing() {
    let listing =
        "+CMGL: 1,0,,24\r\n0891683108200005F0040D91\r\n+CMGL: 7,3,,18\r\n0011000D91\r\n\r\nOK";
    let entries = parse_message_list(listing);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].index, 1);
    assert_eq!(entries[0].status, MessageStatus::ReceivedUnread);
    assert_eq!(entries[0].pdu, "0891683108200005F0040D91");
    assert_eq!(entries[1].index, 7);
    assert_eq!(entries[1].status.to_string(), "STO SENT");
}

/// Tests recognizing new-message notifications among other lines.
#[test]
fn test_new_message_notification() {
    assert_eq!(
        find_urcs("\r\nRING\r\n+CMTI: \"ME\",12\r\n"),
        vec![Urc::NewMessage {
            storage: "ME".to_string(),
            index: 12
        }]
    );
}
