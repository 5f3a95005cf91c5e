#![no_main]

use libfuzzer_sys::fuzz_target;
use modem_rs::pdu::deliver::decode_octets;
use modem_rs::pdu::decode_pdu;

fuzz_target!(|data: &[u8]| {
    // Raw octets, then the same octets as the hex text a modem would list.
    let _ = decode_octets(data);
    let _ = decode_pdu(&hex::encode_upper(data));

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = decode_pdu(text);
    }
});
