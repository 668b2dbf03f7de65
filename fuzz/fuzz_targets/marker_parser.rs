#![no_main]

use earstudy::segmentation::{parse_marker, time_to_index};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Accepted markers are never negative and always index an RR series
        if let Ok(ms) = parse_marker(input) {
            assert!(ms >= 0);
            let _ = time_to_index(&[800.0, 810.0, 790.0], input);
        }
    }
});
