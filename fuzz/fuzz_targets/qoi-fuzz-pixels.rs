#![no_main]
use libfuzzer_sys::fuzz_target;
use qoi_test::qoi::{qoi_decode, qoi_encode, ChannelMode, Colorspace, QoiDescriptor};
use std::io::Cursor;

fuzz_target!(|pixels: &[u8]| {
    if pixels.len() % 3 != 0 || pixels.len() < 3 {
        return;
    }
    let desc = QoiDescriptor {
        width: pixels.len() / 3,
        height: 1,
        channels: ChannelMode::Rgb,
        colorspace: Colorspace::Linear,
    };
    let Ok(bytes) = qoi_encode(pixels, &desc) else {
        return;
    };
    let (pixels_, _desc) = qoi_decode(Cursor::new(bytes), None).unwrap();
    assert_eq!(pixels_, pixels);
});
