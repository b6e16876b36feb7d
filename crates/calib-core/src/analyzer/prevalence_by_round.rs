//! Diagnostic prevalence at survey rounds, optionally per sub-region.
//!
//! Survey days (`testdays`) come from the site's analyzer setup. Region
//! `all` reads `output/ReportMalariaFiltered.json`; any other region reads
//! `output/ReportMalariaFiltered<region>.json`. The score is the sum over
//! regions of the Euclidean distance across rounds.

use std::collections::BTreeMap;

use calib_common::{AnalyzerId, Error, Result};
use calib_math::DistanceModel;
use serde::{Deserialize, Serialize};

use super::{json_member, score_distance, Comparison};
use crate::record::SimulationRecord;
use crate::table::{BinValue, Table};

pub const REFERENCE_TYPE: &str = "prevalence_by_round";
pub const REGION_DIM: &str = "region";
pub const ROUND_DIM: &str = "round";
pub const ALL_REGIONS: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrevalenceByRoundConfig {
    /// Simulation day of each survey round.
    #[serde(default)]
    pub testdays: Vec<usize>,
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_regions() -> Vec<String> {
    vec![ALL_REGIONS.to_string()]
}

fn default_channel() -> String {
    "New Diagnostic Prevalence".to_string()
}

impl Default for PrevalenceByRoundConfig {
    fn default() -> Self {
        PrevalenceByRoundConfig {
            testdays: Vec::new(),
            regions: default_regions(),
            channel: default_channel(),
        }
    }
}

/// Report file for one region.
pub fn region_file(region: &str) -> String {
    if region == ALL_REGIONS {
        "output/ReportMalariaFiltered.json".to_string()
    } else {
        format!("output/ReportMalariaFiltered{}.json", region)
    }
}

#[derive(Debug)]
pub struct PrevalenceByRound {
    config: PrevalenceByRoundConfig,
    reference: Table,
}

impl PrevalenceByRound {
    pub(crate) fn bind(
        id: &AnalyzerId,
        mut config: PrevalenceByRoundConfig,
        reference: Table,
    ) -> Result<Self> {
        if config.testdays.is_empty() {
            return Err(Error::configuration(
                &id.site,
                &id.analyzer,
                "requires 'testdays' in the site's analyzer setup",
            ));
        }
        if config.regions.is_empty() {
            config.regions = default_regions();
        }
        // `all` is always reported first.
        if let Some(pos) = config.regions.iter().position(|r| r == ALL_REGIONS) {
            let all = config.regions.remove(pos);
            config.regions.insert(0, all);
        }

        let dims_ok = reference.dims().len() == 2
            && reference.dim_index(REGION_DIM).is_some()
            && reference.dim_index(ROUND_DIM).is_some();
        if !dims_ok || reference.columns().len() != 1 {
            return Err(Error::data_shape(
                &id.site,
                &id.analyzer,
                format!(
                    "expected dims [{}, {}] and one column, got {:?} / {:?}",
                    REGION_DIM,
                    ROUND_DIM,
                    reference.dims(),
                    reference.columns()
                ),
            ));
        }
        Ok(PrevalenceByRound { config, reference })
    }

    pub fn regions(&self) -> &[String] {
        &self.config.regions
    }

    fn value_column(&self) -> &str {
        &self.reference.columns()[0]
    }
}

impl Comparison for PrevalenceByRound {
    fn extract(&self, record: &SimulationRecord) -> Result<Table> {
        let mut table = Table::new([REGION_DIM, ROUND_DIM], [self.value_column()]);
        let path = format!("Channels/{}/Data", self.config.channel);

        for region in &self.config.regions {
            let report = record.json(&region_file(region))?;
            let data = json_member(report, "Channels", &path)
                .and_then(|c| json_member(c, &self.config.channel, &path))
                .and_then(|c| json_member(c, "Data", &path))?;
            for (round, &day) in self.config.testdays.iter().enumerate() {
                let value = data.get(day).and_then(|v| v.as_f64()).ok_or_else(|| {
                    Error::MissingChannel {
                        channel: path.clone(),
                        reason: format!("no numeric value for day {} in region {}", day, region),
                    }
                })?;
                table.push_row(
                    vec![
                        BinValue::Label(region.clone()),
                        BinValue::Number((round + 1) as f64),
                    ],
                    vec![value],
                )?;
            }
        }
        Ok(table)
    }

    fn compare(&self, sample: &Table) -> Result<f64> {
        let joined = sample.inner_join(&self.reference)?;
        let column = self.value_column();
        let regions = joined.dim(REGION_DIM)?;
        let reference = joined.right(column)?;
        let sim = joined.left(column)?;

        let mut by_region: BTreeMap<&BinValue, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for ((region, r), s) in regions.iter().zip(reference).zip(sim) {
            let entry = by_region.entry(region).or_default();
            entry.0.push(r);
            entry.1.push(s);
        }

        let mut total = 0.0;
        for (reference, sim) in by_region.values() {
            total += score_distance(DistanceModel::Euclidean, reference, sim)?;
        }
        Ok(total)
    }

    fn reference(&self) -> &Table {
        &self.reference
    }

    fn axis_names(&self) -> [String; 2] {
        [REGION_DIM.to_string(), self.config.channel.clone()]
    }
}
