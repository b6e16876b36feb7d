//! Monthly case counts from a spatial (per-node) daily channel.
//!
//! The daily series is summed over the selected nodes, the burn-in period is
//! dropped and the remainder is split into `months` contiguous chunks whose
//! sums are compared with the reference counts by Euclidean distance.

use calib_common::{AnalyzerId, Error, Result};
use calib_math::DistanceModel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_member, score_distance, Comparison};
use crate::record::{RawContent, SimulationRecord};
use crate::table::{BinValue, Table};

pub const REFERENCE_TYPE: &str = "cc_by_month";
pub const CHANNEL_DIM: &str = "Channel";
pub const MONTH_DIM: &str = "month";
pub const COUNTS: &str = "Counts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonthlySpatialConfig {
    /// A binary spatial report, or an inset-chart style JSON report.
    #[serde(default = "default_report_file")]
    pub report_file: String,
    /// Level of the `Channel` dimension the counts are reported under.
    #[serde(default = "default_channel_label")]
    pub channel_label: String,
    /// Channel read when the report is JSON.
    #[serde(default = "default_json_channel")]
    pub json_channel: String,
    /// Leading daily steps to discard.
    #[serde(default = "default_burn_in_days")]
    pub burn_in_days: usize,
    #[serde(default = "default_months")]
    pub months: usize,
    /// Node ids to sum; empty means every node.
    #[serde(default)]
    pub nodes: Vec<u32>,
}

fn default_report_file() -> String {
    "output/SpatialReport_New_Clinical_Cases.bin".to_string()
}

fn default_channel_label() -> String {
    "Clinical_Cases".to_string()
}

fn default_json_channel() -> String {
    "New Clinical Cases".to_string()
}

fn default_burn_in_days() -> usize {
    10 * 365
}

fn default_months() -> usize {
    24
}

impl Default for MonthlySpatialConfig {
    fn default() -> Self {
        MonthlySpatialConfig {
            report_file: default_report_file(),
            channel_label: default_channel_label(),
            json_channel: default_json_channel(),
            burn_in_days: default_burn_in_days(),
            months: default_months(),
            nodes: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct MonthlySpatial {
    config: MonthlySpatialConfig,
    reference: Table,
}

impl MonthlySpatial {
    pub(crate) fn bind(id: &AnalyzerId, config: MonthlySpatialConfig, reference: Table) -> Result<Self> {
        if config.months == 0 {
            return Err(Error::configuration(&id.site, &id.analyzer, "months must be at least 1"));
        }
        let dims_ok = reference.dims().len() == 2
            && reference.dim_index(CHANNEL_DIM).is_some()
            && reference.dim_index(MONTH_DIM).is_some();
        let columns_ok = reference.columns().len() == 1 && reference.columns()[0] == COUNTS;
        if !dims_ok || !columns_ok {
            return Err(Error::data_shape(
                &id.site,
                &id.analyzer,
                format!(
                    "expected dims [{}, {}] and column {}, got {:?} / {:?}",
                    CHANNEL_DIM,
                    MONTH_DIM,
                    COUNTS,
                    reference.dims(),
                    reference.columns()
                ),
            ));
        }
        Ok(MonthlySpatial { config, reference })
    }

    fn daily_series(&self, record: &SimulationRecord) -> Result<Vec<f64>> {
        let filename = &self.config.report_file;
        match record.file(filename)? {
            RawContent::Json(report) => {
                let path = format!("Channels/{}/Data", self.config.json_channel);
                let data = json_member(report, "Channels", &path)
                    .and_then(|c| json_member(c, &self.config.json_channel, &path))
                    .and_then(|c| json_member(c, "Data", &path))?;
                data.as_array()
                    .ok_or_else(|| Error::Decode(format!("{} is not an array", path)))?
                    .iter()
                    .map(|v| match v {
                        Value::Number(n) => Ok(n.as_f64().unwrap_or(f64::NAN)),
                        Value::Null => Ok(f64::NAN),
                        other => Err(Error::Decode(format!("{} holds {}", path, other))),
                    })
                    .collect()
            }
            _ => record.spatial(filename)?.sum_nodes(&self.config.nodes),
        }
    }
}

/// Sum `values` over `parts` contiguous chunks; the first `len % parts`
/// chunks are one element longer.
pub fn split_sums(values: &[f64], parts: usize) -> Vec<f64> {
    if parts == 0 {
        return Vec::new();
    }
    let base = values.len() / parts;
    let extra = values.len() % parts;
    let mut sums = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        sums.push(values[start..start + len].iter().sum());
        start += len;
    }
    sums
}

impl Comparison for MonthlySpatial {
    fn extract(&self, record: &SimulationRecord) -> Result<Table> {
        let daily = self.daily_series(record)?;
        let after_burn_in = daily.get(self.config.burn_in_days..).unwrap_or(&[]);

        let mut table = Table::new([CHANNEL_DIM, MONTH_DIM], [COUNTS]);
        for (month, total) in split_sums(after_burn_in, self.config.months).into_iter().enumerate() {
            table.push_row(
                vec![
                    BinValue::Label(self.config.channel_label.clone()),
                    BinValue::Number(month as f64),
                ],
                vec![total],
            )?;
        }
        Ok(table)
    }

    fn compare(&self, sample: &Table) -> Result<f64> {
        let joined = sample.inner_join(&self.reference)?;
        score_distance(DistanceModel::Euclidean, &joined.right(COUNTS)?, &joined.left(COUNTS)?)
    }

    fn reference(&self) -> &Table {
        &self.reference
    }

    fn axis_names(&self) -> [String; 2] {
        [MONTH_DIM.to_string(), COUNTS.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SimMetadata;
    use crate::spatial::SpatialReport;
    use serde_json::json;

    fn id() -> AnalyzerId {
        AnalyzerId::new("Munyumbwe", "cases")
    }

    fn config() -> MonthlySpatialConfig {
        MonthlySpatialConfig {
            burn_in_days: 2,
            months: 3,
            ..MonthlySpatialConfig::default()
        }
    }

    fn reference() -> Table {
        let mut t = Table::new([CHANNEL_DIM, MONTH_DIM], [COUNTS]);
        for (m, v) in [5.0, 4.0, 2.0].iter().enumerate() {
            t.push_row(
                vec![BinValue::Label("Clinical_Cases".into()), BinValue::Number(m as f64)],
                vec![*v],
            )
            .unwrap();
        }
        t
    }

    #[test]
    fn split_sums_matches_array_split() {
        // 7 values into 3 parts: lengths 3, 2, 2
        let v = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert_eq!(split_sums(&v, 3), vec![6.0, 9.0, 13.0]);
        // more parts than values: trailing empty chunks sum to zero
        assert_eq!(split_sums(&[1.0, 2.0], 3), vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn extract_from_spatial_bytes() {
        let a = MonthlySpatial::bind(&id(), config(), reference()).unwrap();
        // two nodes, nine days; the first two days are burn-in
        let rows: Vec<Vec<f32>> = (0..9).map(|d| vec![d as f32, 1.0]).collect();
        let report = SpatialReport::new(vec![11, 12], rows).unwrap();
        let record = SimulationRecord::new(SimMetadata::new("sim-1", 0, "Munyumbwe")).with_file(
            "output/SpatialReport_New_Clinical_Cases.bin",
            RawContent::Bytes(report.encode().unwrap()),
        );
        let t = a.extract(&record).unwrap();
        // days 2..9 summed over nodes: 3,4,5,6,7,8,9 -> [3+4+5, 6+7, 8+9]
        assert_eq!(t.column(COUNTS).unwrap(), vec![12.0, 13.0, 17.0]);
    }

    #[test]
    fn extract_from_json_channel() {
        let a = MonthlySpatial::bind(&id(), config(), reference()).unwrap();
        let record = SimulationRecord::new(SimMetadata::new("sim-1", 0, "Munyumbwe")).with_file(
            "output/SpatialReport_New_Clinical_Cases.bin",
            RawContent::Json(json!({"Channels": {"New Clinical Cases": {"Data": [9, 9, 1, 2, 3]}}})),
        );
        let t = a.extract(&record).unwrap();
        assert_eq!(t.column(COUNTS).unwrap(), vec![1.0, 2.0, 3.0]);
        let score = a.compare(&t).unwrap();
        let expected = -((16.0f64 + 4.0 + 1.0).sqrt());
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn bad_reference_shape() {
        let t = Table::new([CHANNEL_DIM], [COUNTS]);
        assert!(matches!(
            MonthlySpatial::bind(&id(), config(), t),
            Err(Error::DataShape { .. })
        ));
    }
}
