#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls::tls::handshake::CertificateMessage;

fuzz_target!(|data: &[u8]| {
    let _ = CertificateMessage::decode(data);
});
