//! Fuzz target for reference table loading.
//!
//! Tables are validated row by row while deserializing; malformed rows
//! must surface as errors.

#![no_main]

use calib_core::{ReferenceDataset, SiteReferences};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = ReferenceDataset::from_json_str(text);
    let _ = SiteReferences::from_json_str(text);
});
