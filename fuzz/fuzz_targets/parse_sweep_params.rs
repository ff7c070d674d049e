#![no_main]

use libfuzzer_sys::fuzz_target;
use unlsim::config::{MAX_COMBINATIONS, SweepParams};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(params) = s.parse::<SweepParams>() {
        let combinations = params.combinations();
        assert!(combinations.len() <= MAX_COMBINATIONS);
        assert_eq!(combinations.len(), params.num_combinations());
    }
});
