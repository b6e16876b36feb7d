//! Fuzz target for summary report channel flattening.
//!
//! Arbitrary JSON is read as a summary report; every channel under the
//! known groupings is flattened and must fail cleanly on bad shapes.

#![no_main]

use calib_core::summary::summary_channel;
use libfuzzer_sys::fuzz_target;

const GROUPINGS: [&str; 3] = [
    "DataByTime",
    "DataByTimeAndAgeBins",
    "DataByTimeAndPfPRBinsAndAgeBins",
];

fuzz_target!(|data: &[u8]| {
    let Ok(report) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    for grouping in GROUPINGS {
        let Some(channels) = report.get(grouping).and_then(|g| g.as_object()) else {
            continue;
        };
        for channel in channels.keys() {
            let _ = summary_channel(&report, channel);
        }
    }
});
