#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls::tls::handshake::ClientHello;

fuzz_target!(|data: &[u8]| {
    let _ = ClientHello::decode(data);
});
