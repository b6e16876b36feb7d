//! Extraction of binned channels from summary reports.
//!
//! A summary report groups its channels by binning:
//!
//! ```json
//! {
//!   "Metadata": {"Age Bins": [5, 15, 1000], "Parasitemia Bins": [0, 50, 500]},
//!   "DataByTime": {"Time Of Report": [365, 730], "PfPR_2to10": [0.4, 0.3]},
//!   "DataByTimeAndAgeBins": {"Annual Clinical Incidence by Age Bin": [[..], [..]]},
//!   "DataByTimeAndPfPRBinsAndAgeBins": {"PfPR by Parasitemia and Age Bin": [[[..]]]}
//! }
//! ```
//!
//! Nested arrays are laid out outermost-first in the order of the grouping's
//! dimensions.

use calib_common::{Error, Result};
use serde_json::Value;

use crate::binning::{AGE_DIM, TIME_DIM};
use crate::table::{BinValue, Table};

pub const PFPR_DIM: &str = "PfPR Bin";

const METADATA: &str = "Metadata";
const BY_TIME: &str = "DataByTime";
const BY_TIME_AND_AGE: &str = "DataByTimeAndAgeBins";
const BY_TIME_PFPR_AND_AGE: &str = "DataByTimeAndPfPRBinsAndAgeBins";
const TIME_OF_REPORT: &str = "Time Of Report";
const AGE_BINS: &str = "Age Bins";
const PARASITEMIA_BINS: &str = "Parasitemia Bins";

/// Find the grouping object that carries `channel`.
pub fn grouping_for_channel<'a>(report: &'a Value, channel: &str) -> Result<&'a str> {
    let groups = report.as_object().ok_or_else(|| Error::MissingChannel {
        channel: channel.to_string(),
        reason: "summary report is not a JSON object".to_string(),
    })?;
    groups
        .iter()
        .find(|(_, data)| data.get(channel).is_some())
        .map(|(name, _)| name.as_str())
        .ok_or_else(|| Error::MissingChannel {
            channel: channel.to_string(),
            reason: format!(
                "not found in groupings {:?}",
                groups.keys().collect::<Vec<_>>()
            ),
        })
}

/// Dimension names and bin levels of a grouping, outermost first.
pub fn bins_for_grouping(report: &Value, grouping: &str) -> Result<Vec<(String, Vec<BinValue>)>> {
    let time = bin_levels(report, &[BY_TIME, TIME_OF_REPORT])?;
    match grouping {
        BY_TIME => Ok(vec![(TIME_DIM.to_string(), time)]),
        BY_TIME_AND_AGE => Ok(vec![
            (TIME_DIM.to_string(), time),
            (AGE_DIM.to_string(), bin_levels(report, &[METADATA, AGE_BINS])?),
        ]),
        BY_TIME_PFPR_AND_AGE => Ok(vec![
            (TIME_DIM.to_string(), time),
            (
                PFPR_DIM.to_string(),
                bin_levels(report, &[METADATA, PARASITEMIA_BINS])?,
            ),
            (AGE_DIM.to_string(), bin_levels(report, &[METADATA, AGE_BINS])?),
        ]),
        other => Err(Error::MissingChannel {
            channel: other.to_string(),
            reason: "unknown summary grouping".to_string(),
        }),
    }
}

/// Extract one channel as a table with a single column named after it.
pub fn summary_channel(report: &Value, channel: &str) -> Result<Table> {
    let grouping = grouping_for_channel(report, channel)?;
    let bins = bins_for_grouping(report, grouping)?;

    let shape: Vec<usize> = bins.iter().map(|(_, levels)| levels.len()).collect();
    let mut values = Vec::with_capacity(shape.iter().product());
    flatten_into(&report[grouping][channel], &shape, &mut values).map_err(|reason| {
        Error::Decode(format!(
            "channel '{}' does not match bins {:?}: {}",
            channel,
            bins.iter().map(|(d, l)| (d.as_str(), l.len())).collect::<Vec<_>>(),
            reason
        ))
    })?;

    let mut table = Table::new(bins.iter().map(|(d, _)| d.clone()), [channel]);
    let mut cursor = vec![0usize; bins.len()];
    for value in values {
        let key = cursor
            .iter()
            .zip(&bins)
            .map(|(&i, (_, levels))| levels[i].clone())
            .collect();
        table.push_row(key, vec![value])?;

        // Odometer over the bins, innermost dimension fastest.
        for d in (0..cursor.len()).rev() {
            cursor[d] += 1;
            if cursor[d] < bins[d].1.len() {
                break;
            }
            cursor[d] = 0;
        }
    }
    Ok(table)
}

fn bin_levels(report: &Value, path: &[&str]) -> Result<Vec<BinValue>> {
    let node = path.iter().fold(Some(report), |node, key| node?.get(key));
    let array = node
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MissingChannel {
            channel: path.join("/"),
            reason: "bin levels missing from summary report".to_string(),
        })?;
    array
        .iter()
        .map(|v| match v {
            Value::Number(n) => n
                .as_f64()
                .map(BinValue::Number)
                .ok_or_else(|| Error::Decode(format!("bad bin level {}", n))),
            Value::String(s) => Ok(BinValue::Label(s.clone())),
            other => Err(Error::Decode(format!(
                "bin level in {} must be a number or string, got {}",
                path.join("/"),
                other
            ))),
        })
        .collect()
}

/// Flatten `value` row-major, requiring `shape[d]` entries at depth `d`.
fn flatten_into(value: &Value, shape: &[usize], out: &mut Vec<f64>) -> std::result::Result<(), String> {
    match (value, shape.split_first()) {
        (Value::Array(items), Some((&len, inner))) => {
            if items.len() != len {
                return Err(format!(
                    "expected {} entries at value {}, got {}",
                    len,
                    out.len(),
                    items.len()
                ));
            }
            for item in items {
                flatten_into(item, inner, out)?;
            }
            Ok(())
        }
        (Value::Array(_), None) => Err("array nested deeper than its bins".to_string()),
        (Value::Number(n), None) => {
            out.push(n.as_f64().unwrap_or(f64::NAN));
            Ok(())
        }
        // Reports write NaN as null.
        (Value::Null, None) => {
            out.push(f64::NAN);
            Ok(())
        }
        (Value::Number(_) | Value::Null, Some(_)) => {
            Err(format!("scalar where {} nested levels were expected", shape.len()))
        }
        (other, _) => Err(format!("unexpected value {}", other)),
    }
}
