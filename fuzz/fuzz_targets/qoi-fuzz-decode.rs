#![no_main]
use libfuzzer_sys::fuzz_target;
use qoi_test::qoi::qoi_decode;
use std::io::Cursor;

// Arbitrary byte streams must never panic the decoder, only return an Error.
fuzz_target!(|data: &[u8]| {
    let _ = qoi_decode(Cursor::new(data), None);
});
