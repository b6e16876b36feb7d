//! Fuzz target for run configuration parsing.
//!
//! Tests that TOML and JSON run configuration parsing handles arbitrary
//! input without panicking.

#![no_main]

use calib_common::RunConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = RunConfig::from_toml_str(text) {
        let _ = config.validate();
    }
    if let Ok(config) = RunConfig::from_json_str(text) {
        let _ = config.validate();
    }
});
