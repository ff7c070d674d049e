#![no_main]

use libfuzzer_sys::fuzz_target;
use unlsim::StudyConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = s.parse::<StudyConfig>() {
        assert!(config.rate().is_ok());
        assert!(config.quiet() < config.sim_duration());
    }
});
