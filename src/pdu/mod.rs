//! # SMS PDU Codec
//!
//! Pure encode/decode functions for SMS messages exchanged with a modem in PDU
//! mode (`AT+CMGF=0`), following 3GPP TS 23.040:
//!
//! - semi-octet phone number encoding ([`address`])
//! - character set detection and UCS-2 text ([`charset`])
//! - service-centre timestamps ([`timestamp`])
//! - concatenation user data headers ([`udh`])
//! - outbound SMS-SUBMIT assembly with long-message splitting ([`submit`])
//! - inbound SMS-DELIVER / stored SMS-SUBMIT parsing ([`deliver`])
//! - fragment reassembly ([`reassembly`])
//!
//! Every field read checks the remaining length first; a short or malformed
//! PDU fails with [`ModemError::CodecError`](crate::ModemError::CodecError)
//! naming the offending field.
//!
//! ## Usage
//!
//! ```rust
//! use modem_rs::pdu::{decode_pdu, encode_submit};
//!
//! let parts = encode_submit("+8613800138000", "你好", 0).unwrap();
//! assert_eq!(parts.len(), 1);
//! assert!(parts[0].hex.starts_with("0011000D91"));
//!
//! let msg = decode_pdu("0891683108200005F0040D91683117013254F6000852011221450023044F60597D").unwrap();
//! assert_eq!(msg.sender, "+8613711023456");
//! assert_eq!(msg.text, "你好");
//! assert_eq!(msg.timestamp.as_deref(), Some("2025-10-21 12:54:00"));
//! ```

pub mod address;
pub mod charset;
pub mod deliver;
pub mod reassembly;
pub mod submit;
pub mod timestamp;
pub mod udh;

pub use address::{decode_phone_number, encode_phone_number};
pub use charset::{is_gsm7_encodable, select_charset, ucs2_decode, ucs2_encode, Charset};
pub use deliver::decode_pdu;
pub use reassembly::ReassemblyBuffer;
pub use submit::{encode_submit, split_ucs2, SubmitPdu};
pub use timestamp::decode_timestamp;
pub use udh::{encode_concat_header, ConcatInfo};

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// First octet of an SMS TPDU (TP-MTI, TP-VPF, TP-UDHI and friends).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FirstOctet: u8 {
        /// TP-MTI low bit; set for SMS-SUBMIT.
        const MTI_SUBMIT = 0x01;
        /// TP-MTI high bit; SMS-COMMAND / reserved.
        const MTI_HIGH = 0x02;
        /// TP-RD (submit) / TP-MMS (deliver).
        const MORE_OR_REJECT = 0x04;
        /// TP-VPF low bit.
        const VPF_LOW = 0x08;
        /// TP-VPF high bit; alone it selects the relative format.
        const VPF_HIGH = 0x10;
        /// TP-SRR (submit) / TP-SRI (deliver).
        const STATUS_REPORT = 0x20;
        /// TP-UDHI: user data starts with a header.
        const UDHI = 0x40;
        /// TP-RP.
        const REPLY_PATH = 0x80;
    }
}

impl FirstOctet {
    /// Message type indicator (bits 1..0).
    pub fn mti(self) -> u8 {
        self.bits() & 0x03
    }

    /// Length in octets of the validity period field of an SMS-SUBMIT.
    pub fn validity_period_len(self) -> usize {
        match (self.contains(Self::VPF_HIGH), self.contains(Self::VPF_LOW)) {
            (false, false) => 0,
            (true, false) => 1,
            _ => 7,
        }
    }
}

/// Direction of a decoded TPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    /// SMS-DELIVER, received from the network.
    Deliver,
    /// SMS-SUBMIT, stored in the modem as sent or unsent.
    Submit,
}

/// A single decoded PDU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedMessage {
    pub kind: MessageKind,
    /// Originating address for a delivered message, destination address for a
    /// stored submit. International numbers carry a leading `+`.
    pub sender: String,
    /// Service-centre timestamp, `YYYY-MM-DD HH:MM:SS`. Absent on submits.
    pub timestamp: Option<String>,
    pub text: String,
    pub charset: Charset,
    pub concat: Option<ConcatInfo>,
}

impl DecodedMessage {
    /// True when this message is one fragment of a concatenated message.
    pub fn is_fragment(&self) -> bool {
        self.concat.map_or(false, |c| c.total > 1)
    }
}
