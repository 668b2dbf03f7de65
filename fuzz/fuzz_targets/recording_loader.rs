#![no_main]

use earstudy::config::InputConfig;
use earstudy::loader::parse_recording;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = InputConfig {
        temperature_channels: vec!["Concha".to_string()],
        imu_channels: vec!["ACC_X".to_string()],
        ..InputConfig::default()
    };
    // Malformed CSV must be rejected with an error, never a panic
    if let Ok(recording) = parse_recording("fuzz", data, &input) {
        assert_eq!(recording.timestamps_ms().len(), recording.phase_ids().len());
    }
});
