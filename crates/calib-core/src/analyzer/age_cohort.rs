//! Birth-cohort channels binned by age: clinical incidence or prevalence.
//!
//! The reference carries the channel and the population channel per age
//! bin. It is reshaped once into `Incidents` (population x channel) and
//! `Person Years` (population); simulations are brought onto the same bins
//! and scored with a count model.

use calib_common::{AnalyzerId, Error, Result};
use calib_math::CountModel;
use serde::{Deserialize, Serialize};

use super::{score_counts, Comparison};
use crate::binning::{
    age_from_birth_cohort, aggregate_on_index, convert_annualized, convert_to_counts, rebin_guard,
    TargetIndex, AGE_DIM,
};
use crate::record::SimulationRecord;
use crate::summary::summary_channel;
use crate::table::Table;

pub const INCIDENTS: &str = "Incidents";
pub const PERSON_YEARS: &str = "Person Years";

pub const INCIDENCE_REFERENCE: &str = "annual_clinical_incidence_by_age";
pub const PREVALENCE_REFERENCE: &str = "prevalence_by_age_cohort";

/// What the cohort channel measures, which fixes the reference type and model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortKind {
    Incidence,
    Prevalence,
}

impl CohortKind {
    pub fn reference_type(self) -> &'static str {
        match self {
            CohortKind::Incidence => INCIDENCE_REFERENCE,
            CohortKind::Prevalence => PREVALENCE_REFERENCE,
        }
    }

    pub fn model(self) -> CountModel {
        match self {
            CohortKind::Incidence => CountModel::GammaPoisson,
            CohortKind::Prevalence => CountModel::BetaBinomial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgeCohortConfig {
    pub kind: CohortKind,
    #[serde(default = "default_population_channel")]
    pub population_channel: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
    /// Day the first reporting interval starts.
    #[serde(default)]
    pub start_day: f64,
    /// Fixed reporting interval in days; when unset, the spacing of the
    /// report times is used.
    #[serde(default)]
    pub reporting_interval: Option<f64>,
}

fn default_population_channel() -> String {
    "Average Population by Age Bin".to_string()
}

fn default_report_file() -> String {
    "output/MalariaSummaryReport_Annual_Report.json".to_string()
}

impl AgeCohortConfig {
    pub fn new(kind: CohortKind) -> Self {
        AgeCohortConfig {
            kind,
            population_channel: default_population_channel(),
            report_file: default_report_file(),
            start_day: 0.0,
            reporting_interval: None,
        }
    }
}

#[derive(Debug)]
pub struct AgeCohort {
    config: AgeCohortConfig,
    channel: String,
    reference: Table,
    target: TargetIndex,
}

impl AgeCohort {
    pub(crate) fn bind(id: &AnalyzerId, config: AgeCohortConfig, reference: Table) -> Result<Self> {
        let columns = reference.columns();
        if columns.len() != 2 {
            return Err(Error::data_shape(
                &id.site,
                &id.analyzer,
                format!("expected two reference channels, got {:?}", columns),
            ));
        }
        let Some(channel) = columns
            .iter()
            .find(|c| **c != config.population_channel)
            .cloned()
            .filter(|_| columns.contains(&config.population_channel))
        else {
            return Err(Error::data_shape(
                &id.site,
                &id.analyzer,
                format!(
                    "population channel '{}' missing from reference channels {:?}",
                    config.population_channel, columns
                ),
            ));
        };

        let mut reshaped = Table::new(reference.dims().iter().cloned(), [INCIDENTS, PERSON_YEARS]);
        let rate = reference.column_index(&channel);
        let population = reference.column_index(&config.population_channel);
        if let (Some(rate), Some(population)) = (rate, population) {
            for row in reference.rows() {
                let pop = row.values[population];
                reshaped.push_row(row.key.clone(), vec![pop * row.values[rate], pop])?;
            }
        }

        let target = TargetIndex::from_table(&reshaped);
        Ok(AgeCohort {
            config,
            channel,
            reference: reshaped,
            target,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Comparison for AgeCohort {
    fn extract(&self, record: &SimulationRecord) -> Result<Table> {
        let report = record.json(&self.config.report_file)?;
        let rates = summary_channel(report, &self.channel)?;
        let population = summary_channel(report, &self.config.population_channel)?;

        let _guard = rebin_guard();
        let mut person_years =
            convert_annualized(&population, self.config.start_day, self.config.reporting_interval)?;
        person_years.rename_column(&self.config.population_channel, PERSON_YEARS)?;
        let mut counts = convert_to_counts(&rates, &person_years)?;
        counts.rename_column(&self.channel, INCIDENTS)?;
        let aged = age_from_birth_cohort(&counts)?;
        aggregate_on_index(&aged, &self.target, &[INCIDENTS, PERSON_YEARS])
    }

    fn compare(&self, sample: &Table) -> Result<f64> {
        let joined = sample.inner_join(&self.reference)?;
        score_counts(self.config.kind.model(), &joined, PERSON_YEARS, INCIDENTS)
    }

    fn reference(&self) -> &Table {
        &self.reference
    }

    fn axis_names(&self) -> [String; 2] {
        [AGE_DIM.to_string(), self.channel.clone()]
    }
}
