#![no_main]
use libfuzzer_sys::fuzz_target;
use racer_hardware::block_stream::BlockDecoder;

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic on arbitrary bytes, must never emit an
    // empty frame, and must decode the same frames regardless of how the
    // byte stream is chunked.
    let mut whole = BlockDecoder::new();
    whole.push(data);

    let mut split = BlockDecoder::new();
    for b in data {
        split.push(std::slice::from_ref(b));
    }

    while let Some(frame) = whole.next_frame() {
        assert!(!frame.is_empty());
        assert_eq!(split.next_frame().as_deref(), Some(frame.as_slice()));
    }
    assert!(split.next_frame().is_none());
    assert_eq!(whole.dropped_blocks(), split.dropped_blocks());
});
