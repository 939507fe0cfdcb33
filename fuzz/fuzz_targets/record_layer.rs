#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls::tls::RecordLayer;

fuzz_target!(|data: &[u8]| {
    let mut layer = RecordLayer::new();
    layer.feed(data);
    while let Ok(Some(_record)) = layer.next_record() {}
});
