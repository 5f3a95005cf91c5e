#![no_main]

use libfuzzer_sys::fuzz_target;
use modem_rs::modem::response::{find_urcs, parse_message_list};
use modem_rs::modem::sms::assemble_listing;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let entries = parse_message_list(&text);
    let _ = assemble_listing(&entries);
    let _ = find_urcs(&text);
});
