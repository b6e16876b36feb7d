//! Vectors per human by month and species, from the vector statistics CSV.
//!
//! Rows after the burn-in are reduced to `VectorPopulation / Population`,
//! averaged per day of year and species, then per calendar month and
//! species. Each species is re-aggregated onto its slice of the
//! `entomology_by_season` reference and scored by Euclidean distance.
//!
//! The reference may be given wide (dims `[Month]`, one column per species)
//! or long (dims `[Channel, Month]`, a single `Counts` column); it is kept
//! in the long form.

use calib_common::{AnalyzerId, Error, Result};
use calib_math::DistanceModel;
use serde::{Deserialize, Serialize};

use super::{score_distance, Comparison};
use crate::binning::{aggregate_on_index, month_of_day, rebin_guard, TargetIndex};
use crate::record::SimulationRecord;
use crate::table::{BinValue, Table};

pub const REFERENCE_TYPE: &str = "entomology_by_season";
pub const CHANNEL_DIM: &str = "Channel";
pub const MONTH_DIM: &str = "Month";
pub const COUNTS: &str = "Counts";

const DAY_DIM: &str = "Day";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorSeasonConfig {
    #[serde(default = "default_report_file")]
    pub report_file: String,
    /// Rows with `Time` below this are discarded.
    #[serde(default = "default_burn_in_days")]
    pub burn_in_days: usize,
    /// Species to compare; empty means every species in the reference.
    #[serde(default)]
    pub species: Vec<String>,
}

fn default_report_file() -> String {
    "output/ReportVectorStats.csv".to_string()
}

fn default_burn_in_days() -> usize {
    365
}

impl Default for VectorSeasonConfig {
    fn default() -> Self {
        VectorSeasonConfig {
            report_file: default_report_file(),
            burn_in_days: default_burn_in_days(),
            species: Vec::new(),
        }
    }
}

/// The columns read from one row of the vector statistics report.
#[derive(Debug, Deserialize)]
struct VectorStatsRow {
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "Species")]
    species: String,
    #[serde(rename = "Population")]
    population: f64,
    #[serde(rename = "VectorPopulation")]
    vector_population: f64,
}

#[derive(Debug)]
pub struct VectorSeason {
    config: VectorSeasonConfig,
    reference: Table,
    species: Vec<(String, TargetIndex)>,
}

impl VectorSeason {
    pub(crate) fn bind(id: &AnalyzerId, mut config: VectorSeasonConfig, reference: Table) -> Result<Self> {
        let reference = long_reference(id, reference)?;

        let available: Vec<String> = reference
            .levels(CHANNEL_DIM)
            .into_iter()
            .filter_map(|level| match level {
                BinValue::Label(name) => Some(name),
                BinValue::Number(_) => None,
            })
            .collect();
        if config.species.is_empty() {
            config.species = available.clone();
        }

        let mut species = Vec::with_capacity(config.species.len());
        for name in &config.species {
            if !available.contains(name) {
                return Err(Error::configuration(
                    &id.site,
                    &id.analyzer,
                    format!("species '{}' has no reference data (have {:?})", name, available),
                ));
            }
            let slice = reference.slice(CHANNEL_DIM, &BinValue::Label(name.clone()))?;
            species.push((name.clone(), TargetIndex::from_table(&slice)));
        }

        Ok(VectorSeason {
            config,
            reference,
            species,
        })
    }

    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.species.iter().map(|(name, _)| name.as_str())
    }

    /// Mean vectors per human by (day of year, species) after the burn-in.
    fn daily_means(&self, record: &SimulationRecord) -> Result<Table> {
        let text = record.text(&self.config.report_file)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut daily = Table::new([DAY_DIM, CHANNEL_DIM], [COUNTS]);
        for row in reader.deserialize::<VectorStatsRow>() {
            let row = row.map_err(|e| {
                Error::Decode(format!("{} of {}: {}", self.config.report_file, record.sim_id(), e))
            })?;
            if row.time < self.config.burn_in_days as f64 {
                continue;
            }
            let day = (row.time + 1.0).rem_euclid(365.0).floor();
            daily.push_row(
                vec![BinValue::Number(day), BinValue::Label(row.species)],
                vec![row.vector_population / row.population],
            )?;
        }
        daily.group_mean(&[DAY_DIM, CHANNEL_DIM])
    }
}

/// Reshape a wide reference to `[Channel, Month] x Counts`.
fn long_reference(id: &AnalyzerId, reference: Table) -> Result<Table> {
    let long_ok = reference.dims().len() == 2
        && reference.dim_index(CHANNEL_DIM).is_some()
        && reference.dim_index(MONTH_DIM).is_some()
        && reference.columns().len() == 1
        && reference.columns()[0] == COUNTS;
    if long_ok {
        return reference.reorder_dims(&[CHANNEL_DIM.to_string(), MONTH_DIM.to_string()]);
    }

    let wide_ok = reference.dims().len() == 1
        && reference.dim_index(MONTH_DIM).is_some()
        && !reference.columns().is_empty();
    if !wide_ok {
        return Err(Error::data_shape(
            &id.site,
            &id.analyzer,
            format!(
                "expected dims [{}] with one column per species, or [{}, {}] with column {}; got {:?} / {:?}",
                MONTH_DIM,
                CHANNEL_DIM,
                MONTH_DIM,
                COUNTS,
                reference.dims(),
                reference.columns()
            ),
        ));
    }

    let mut long = Table::new([CHANNEL_DIM, MONTH_DIM], [COUNTS]);
    for (c, species) in reference.columns().iter().enumerate() {
        for row in reference.rows() {
            long.push_row(
                vec![BinValue::Label(species.clone()), row.key[0].clone()],
                vec![row.values[c]],
            )?;
        }
    }
    long.reorder_dims(&[CHANNEL_DIM.to_string(), MONTH_DIM.to_string()])
}

impl Comparison for VectorSeason {
    fn extract(&self, record: &SimulationRecord) -> Result<Table> {
        let daily = self.daily_means(record)?;

        let mut monthly = Table::new([MONTH_DIM, CHANNEL_DIM], [COUNTS]);
        for row in daily.rows() {
            let Some(month) = row.key[0].as_f64().and_then(month_of_day) else {
                continue;
            };
            monthly.push_row(
                vec![BinValue::Number(f64::from(month)), row.key[1].clone()],
                row.values.clone(),
            )?;
        }
        let monthly = monthly.group_mean(&[MONTH_DIM, CHANNEL_DIM])?;

        let mut per_species = Vec::with_capacity(self.species.len());
        for (name, target) in &self.species {
            let slice = monthly.slice(CHANNEL_DIM, &BinValue::Label(name.clone()))?;
            let rebinned = {
                let _guard = rebin_guard();
                aggregate_on_index(&slice, target, &[COUNTS])?
            };
            per_species.push(rebinned.prepend_dim(CHANNEL_DIM, BinValue::Label(name.clone())));
        }

        match Table::concat(&per_species)? {
            Some(table) => Ok(table),
            None => Ok(Table::new([CHANNEL_DIM, MONTH_DIM], [COUNTS])),
        }
    }

    fn compare(&self, sample: &Table) -> Result<f64> {
        let joined = sample.inner_join(&self.reference)?;
        score_distance(DistanceModel::Euclidean, &joined.right(COUNTS)?, &joined.left(COUNTS)?)
    }

    fn reference(&self) -> &Table {
        &self.reference
    }

    fn axis_names(&self) -> [String; 2] {
        [MONTH_DIM.to_string(), "Vectors per Human".to_string()]
    }
}
