//! Fuzz target for binary spatial report decoding.
//!
//! Headers may claim any node and timestep count; decoding must return an
//! error rather than panic or over-allocate.

#![no_main]

use calib_core::SpatialReport;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(report) = SpatialReport::decode(data) {
        let _ = report.sum_nodes(&[]);
        if let Ok(bytes) = report.encode() {
            assert_eq!(bytes.as_slice(), data);
        }
    }
});
