#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls::tls::handshake::ServerHello;

fuzz_target!(|data: &[u8]| {
    let _ = ServerHello::decode(data);
});
