//! Parasite-density distributions by season and age.
//!
//! The reference holds observed counts per `Channel` (e.g. `PfPR by
//! Parasitemia and Age Bin`), season, age and density bin, in a single
//! `Counts` column. Each channel of the monthly summary report is turned
//! into counts, binned by season and age and re-aggregated onto that
//! channel's slice of the reference. The last reference dimension holds
//! the categories of a Dirichlet-multinomial comparison.

use calib_common::{AnalyzerId, Error, Result};
use calib_math::dirichlet_multinomial_flat;
use serde::{Deserialize, Serialize};

use super::Comparison;
use crate::binning::{
    age_from_birth_cohort, aggregate_on_index, convert_to_counts, rebin_guard, season_from_time,
    SeasonMap, TargetIndex, AGE_DIM,
};
use crate::record::SimulationRecord;
use crate::summary::summary_channel;
use crate::table::{BinKey, BinValue, Table};

pub const REFERENCE_TYPE: &str = "density_by_age_and_season";
pub const CHANNEL_DIM: &str = "Channel";
pub const COUNTS: &str = "Counts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeasonAgeDensityConfig {
    /// Month to season assignment; months without a season are ignored.
    pub seasons: SeasonMap,
    #[serde(default = "default_population_channel")]
    pub population_channel: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

fn default_population_channel() -> String {
    "Average Population by Age Bin".to_string()
}

fn default_report_file() -> String {
    "output/MalariaSummaryReport_Monthly_Report.json".to_string()
}

impl SeasonAgeDensityConfig {
    pub fn new(seasons: SeasonMap) -> Self {
        SeasonAgeDensityConfig {
            seasons,
            population_channel: default_population_channel(),
            report_file: default_report_file(),
        }
    }
}

#[derive(Debug)]
pub struct SeasonAgeDensity {
    config: SeasonAgeDensityConfig,
    reference: Table,
    /// One target index per channel, from that channel's reference slice.
    channels: Vec<(String, TargetIndex)>,
}

impl SeasonAgeDensity {
    pub(crate) fn bind(
        id: &AnalyzerId,
        config: SeasonAgeDensityConfig,
        reference: Table,
    ) -> Result<Self> {
        if config.seasons.is_empty() {
            return Err(Error::configuration(
                &id.site,
                &id.analyzer,
                "no seasons configured",
            ));
        }
        if reference.columns().len() != 1 || reference.columns()[0] != COUNTS {
            return Err(Error::data_shape(
                &id.site,
                &id.analyzer,
                format!(
                    "expected a single '{}' column, got {:?}",
                    COUNTS,
                    reference.columns()
                ),
            ));
        }
        if reference.dim_index(CHANNEL_DIM).is_none() || reference.dims().len() < 2 {
            return Err(Error::data_shape(
                &id.site,
                &id.analyzer,
                format!(
                    "expected a '{}' dimension and at least one bin dimension, got {:?}",
                    CHANNEL_DIM,
                    reference.dims()
                ),
            ));
        }

        let mut channels = Vec::new();
        for level in reference.levels(CHANNEL_DIM) {
            let BinValue::Label(name) = &level else {
                return Err(Error::data_shape(
                    &id.site,
                    &id.analyzer,
                    format!("channel names must be labels, got {}", level),
                ));
            };
            let slice = reference.slice(CHANNEL_DIM, &level)?;
            channels.push((name.clone(), TargetIndex::from_table(&slice)));
        }

        Ok(SeasonAgeDensity {
            config,
            reference,
            channels,
        })
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(name, _)| name.as_str())
    }
}

impl Comparison for SeasonAgeDensity {
    fn extract(&self, record: &SimulationRecord) -> Result<Table> {
        let report = record.json(&self.config.report_file)?;
        let population = summary_channel(report, &self.config.population_channel)?;

        let mut per_channel = Vec::with_capacity(self.channels.len());
        for (channel, target) in &self.channels {
            let prevalence = summary_channel(report, channel)?;

            let mut rebinned = {
                let _guard = rebin_guard();
                let counts = convert_to_counts(&prevalence, &population)?;
                let aged = age_from_birth_cohort(&counts)?;
                let seasonal = season_from_time(&aged, &self.config.seasons)?;
                aggregate_on_index(&seasonal, target, &[channel.as_str()])?
            };
            rebinned.rename_column(channel, COUNTS)?;
            per_channel.push(rebinned.prepend_dim(CHANNEL_DIM, BinValue::Label(channel.clone())));
        }

        match Table::concat(&per_channel)? {
            Some(table) => table.reorder_dims(self.reference.dims()),
            None => Ok(Table::new(self.reference.dims().iter().cloned(), [COUNTS])),
        }
    }

    fn compare(&self, sample: &Table) -> Result<f64> {
        let joined = sample.inner_join(&self.reference)?;
        let last = joined.dims.len() - 1;
        let groups: Vec<BinKey> = joined.rows.iter().map(|r| r.key[..last].to_vec()).collect();
        let categories: Vec<&BinValue> = joined.rows.iter().map(|r| &r.key[last]).collect();
        let reference = joined.right(COUNTS)?;
        let sim = joined.left(COUNTS)?;
        Ok(dirichlet_multinomial_flat(&groups, &categories, &reference, &sim))
    }

    fn reference(&self) -> &Table {
        &self.reference
    }

    fn axis_names(&self) -> [String; 2] {
        [AGE_DIM.to_string(), COUNTS.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::SEASON_DIM;
    use crate::record::{RawContent, SimMetadata};
    use crate::summary::PFPR_DIM;
    use serde_json::json;

    const CHANNEL: &str = "PfPR by Parasitemia and Age Bin";

    fn id() -> AnalyzerId {
        AnalyzerId::new("Laye", "density")
    }

    fn seasons() -> SeasonMap {
        SeasonMap::from_month_map([("January", "DC2"), ("February", "DH2")]).unwrap()
    }

    fn n(v: f64) -> BinValue {
        BinValue::Number(v)
    }

    fn l(v: &str) -> BinValue {
        BinValue::Label(v.to_string())
    }

    fn reference() -> Table {
        let mut t = Table::new([CHANNEL_DIM, SEASON_DIM, AGE_DIM, PFPR_DIM], [COUNTS]);
        for season in ["DC2", "DH2"] {
            t.push_row(vec![l(CHANNEL), l(season), n(5.0), n(50.0)], vec![3.0]).unwrap();
            t.push_row(vec![l(CHANNEL), l(season), n(5.0), n(500.0)], vec![1.0]).unwrap();
        }
        t
    }

    fn report() -> serde_json::Value {
        // Two monthly reports (mid January, mid February), one age bin,
        // two density bins.
        json!({
            "Metadata": {"Age Bins": [100], "Parasitemia Bins": [50, 500]},
            "DataByTime": {"Time Of Report": [15, 45]},
            "DataByTimeAndAgeBins": {
                "Average Population by Age Bin": [[100.0], [200.0]]
            },
            "DataByTimeAndPfPRBinsAndAgeBins": {
                CHANNEL: [[[0.3], [0.1]], [[0.2], [0.05]]]
            }
        })
    }

    fn record() -> SimulationRecord {
        SimulationRecord::new(SimMetadata::new("sim-1", 0, "Laye")).with_file(
            "output/MalariaSummaryReport_Monthly_Report.json",
            RawContent::Json(report()),
        )
    }

    #[test]
    fn bind_reads_channels_from_reference() {
        let a = SeasonAgeDensity::bind(&id(), SeasonAgeDensityConfig::new(seasons()), reference()).unwrap();
        assert_eq!(a.channels().collect::<Vec<_>>(), vec![CHANNEL]);
    }

    #[test]
    fn bind_rejects_bad_shapes() {
        let mut two_cols = Table::new([CHANNEL_DIM, AGE_DIM], [COUNTS, "Extra"]);
        two_cols.push_row(vec![l(CHANNEL), n(5.0)], vec![1.0, 1.0]).unwrap();
        let err = SeasonAgeDensity::bind(&id(), SeasonAgeDensityConfig::new(seasons()), two_cols)
            .unwrap_err();
        assert!(matches!(err, Error::DataShape { .. }));

        let err = SeasonAgeDensity::bind(
            &id(),
            SeasonAgeDensityConfig::new(SeasonMap::default()),
            reference(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn extract_bins_by_channel_season_age_and_density() {
        let a = SeasonAgeDensity::bind(&id(), SeasonAgeDensityConfig::new(seasons()), reference()).unwrap();
        let t = a.extract(&record()).unwrap();
        assert_eq!(t.dims(), reference().dims());
        assert_eq!(t.len(), 4);
        // January: 0.3 * 100 and 0.1 * 100; February: 0.2 * 200 and 0.05 * 200.
        let jan = t.slice(SEASON_DIM, &l("DC2")).unwrap();
        assert_eq!(jan.column(COUNTS).unwrap(), vec![30.0, 10.0]);
        let feb = t.slice(SEASON_DIM, &l("DH2")).unwrap();
        assert_eq!(feb.column(COUNTS).unwrap(), vec![40.0, 10.0]);
    }

    #[test]
    fn compare_matches_dense_kernel() {
        let a = SeasonAgeDensity::bind(&id(), SeasonAgeDensityConfig::new(seasons()), reference()).unwrap();
        let sim = a.extract(&record()).unwrap();
        let score = a.compare(&sim).unwrap();
        let dense = calib_math::dirichlet_multinomial(
            &[vec![3.0, 1.0], vec![3.0, 1.0]],
            &[vec![30.0, 10.0], vec![40.0, 10.0]],
        );
        assert!((score - dense).abs() < 1e-9);
    }
}
