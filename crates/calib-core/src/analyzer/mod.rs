//! Analyzers: the unit of comparison between simulations and reference data.
//!
//! An [`AnalyzerSpec`] is the unbound form: a name, a weight and one variant
//! configuration. A [`CalibSite`](crate::site::CalibSite) clones each spec,
//! applies any per-analyzer setup and binds it to the site's reference data,
//! producing an [`Analyzer`] that runs the lifecycle
//!
//! ```text
//! filter -> apply (per simulation) -> combine (barrier) -> finalize -> cache
//! ```
//!
//! Every variant implements [`Comparison`]; the lifecycle around it
//! (tagging, replicate averaging, per-sample scoring) is shared.

pub mod age_cohort;
pub mod monthly_spatial;
pub mod prevalence_by_round;
pub mod season_density;
pub mod vector_season;

use std::collections::BTreeMap;

use calib_common::{AnalyzerId, Error, Result, SampleIndex, SimId};
use calib_math::{CountModel, DistanceModel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::record::{SimMetadata, SimulationRecord};
use crate::table::{BinValue, JoinedTable, Table};

pub use age_cohort::{AgeCohort, AgeCohortConfig, CohortKind};
pub use monthly_spatial::{MonthlySpatial, MonthlySpatialConfig};
pub use prevalence_by_round::{PrevalenceByRound, PrevalenceByRoundConfig};
pub use season_density::{SeasonAgeDensity, SeasonAgeDensityConfig};
pub use vector_season::{VectorSeason, VectorSeasonConfig};

/// Dimension added by `combine` to hold the sample index.
pub const SAMPLE_DIM: &str = "sample";
/// Dimension holding the replicate id while replicates are collapsed.
pub const SIM_ID_DIM: &str = "sim_id";

/// Per-analyzer setup keys supplied with the site (e.g. `testdays`).
pub type AnalyzerSetup = serde_json::Map<String, Value>;

/// Variant configuration, one per analyzer kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyzerVariant {
    AgeCohort(AgeCohortConfig),
    SeasonAgeDensity(SeasonAgeDensityConfig),
    MonthlySpatial(MonthlySpatialConfig),
    PrevalenceByRound(PrevalenceByRoundConfig),
    VectorSeason(VectorSeasonConfig),
}

impl AnalyzerVariant {
    pub fn required_reference_types(&self) -> Vec<&'static str> {
        match self {
            AnalyzerVariant::AgeCohort(c) => vec![c.kind.reference_type()],
            AnalyzerVariant::SeasonAgeDensity(_) => vec![season_density::REFERENCE_TYPE],
            AnalyzerVariant::MonthlySpatial(_) => vec![monthly_spatial::REFERENCE_TYPE],
            AnalyzerVariant::PrevalenceByRound(_) => vec![prevalence_by_round::REFERENCE_TYPE],
            AnalyzerVariant::VectorSeason(_) => vec![vector_season::REFERENCE_TYPE],
        }
    }
}

/// An analyzer before it is bound to a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSpec {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub variant: AnalyzerVariant,
}

fn default_weight() -> f64 {
    1.0
}

impl AnalyzerSpec {
    pub fn new(name: impl Into<String>, weight: f64, variant: AnalyzerVariant) -> Self {
        AnalyzerSpec {
            name: name.into(),
            weight,
            variant,
        }
    }

    pub fn required_reference_types(&self) -> Vec<&'static str> {
        self.variant.required_reference_types()
    }

    /// Overlay setup keys onto the variant configuration.
    ///
    /// Keys must name fields of the variant's configuration; the variant
    /// itself cannot be changed.
    pub fn apply_setup(&mut self, site: &str, setup: &AnalyzerSetup) -> Result<()> {
        let mut value = serde_json::to_value(&self.variant)?;
        let Some(fields) = value.as_object_mut() else {
            return Err(Error::configuration(site, &self.name, "variant is not a map"));
        };
        for (key, v) in setup {
            if key == "type" {
                return Err(Error::configuration(
                    site,
                    &self.name,
                    "setup cannot change the analyzer type",
                ));
            }
            fields.insert(key.clone(), v.clone());
        }
        self.variant = serde_json::from_value(value)
            .map_err(|e| Error::configuration(site, &self.name, format!("bad setup: {}", e)))?;
        Ok(())
    }
}

/// The capability each analyzer variant provides to the shared lifecycle.
pub trait Comparison: Send + Sync {
    /// Extract and rebin one simulation onto the reference's dimensions.
    fn extract(&self, record: &SimulationRecord) -> Result<Table>;

    /// Score one sample's averaged table against the reference.
    fn compare(&self, sample: &Table) -> Result<f64>;

    /// The reference table in the shape `compare` joins against.
    fn reference(&self) -> &Table;

    /// `[x_label, y_label]` for plotting.
    fn axis_names(&self) -> [String; 2];
}

/// A bound analyzer variant.
#[derive(Debug)]
enum Bound {
    AgeCohort(AgeCohort),
    SeasonAgeDensity(SeasonAgeDensity),
    MonthlySpatial(MonthlySpatial),
    PrevalenceByRound(PrevalenceByRound),
    VectorSeason(VectorSeason),
}

impl Bound {
    fn comparison(&self) -> &dyn Comparison {
        match self {
            Bound::AgeCohort(a) => a,
            Bound::SeasonAgeDensity(a) => a,
            Bound::MonthlySpatial(a) => a,
            Bound::PrevalenceByRound(a) => a,
            Bound::VectorSeason(a) => a,
        }
    }
}

/// Table produced by one `apply()` call, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedObservation {
    pub analyzer: AnalyzerId,
    pub sample: SampleIndex,
    pub sim_id: SimId,
    pub table: Table,
}

/// Per-sample simulation data in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleCache {
    pub sample: SampleIndex,
    pub table: Table,
}

/// Minimal payload for redrawing a sim-vs-reference plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationCache {
    pub sims: Vec<SampleCache>,
    pub reference: Table,
    pub axis_names: [String; 2],
}

/// An analyzer bound to one site.
#[derive(Debug)]
pub struct Analyzer {
    id: AnalyzerId,
    weight: f64,
    bound: Bound,
    combined: Option<Table>,
    result: BTreeMap<SampleIndex, f64>,
}

impl Analyzer {
    /// Bind a spec to a site's reference tables.
    ///
    /// `reference` returns the table for a required reference type; the
    /// variant reshapes it once and keeps its own copy.
    pub(crate) fn bind<F>(site: &str, spec: AnalyzerSpec, reference: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Table>,
    {
        if !spec.weight.is_finite() || spec.weight < 0.0 {
            return Err(Error::configuration(
                site,
                &spec.name,
                format!("weight must be finite and non-negative, got {}", spec.weight),
            ));
        }
        let id = AnalyzerId::new(site, &spec.name);
        let bound = match spec.variant {
            AnalyzerVariant::AgeCohort(config) => {
                let table = reference(config.kind.reference_type())?;
                Bound::AgeCohort(AgeCohort::bind(&id, config, table)?)
            }
            AnalyzerVariant::SeasonAgeDensity(config) => {
                let table = reference(season_density::REFERENCE_TYPE)?;
                Bound::SeasonAgeDensity(SeasonAgeDensity::bind(&id, config, table)?)
            }
            AnalyzerVariant::MonthlySpatial(config) => {
                let table = reference(monthly_spatial::REFERENCE_TYPE)?;
                Bound::MonthlySpatial(MonthlySpatial::bind(&id, config, table)?)
            }
            AnalyzerVariant::PrevalenceByRound(config) => {
                let table = reference(prevalence_by_round::REFERENCE_TYPE)?;
                Bound::PrevalenceByRound(PrevalenceByRound::bind(&id, config, table)?)
            }
            AnalyzerVariant::VectorSeason(config) => {
                let table = reference(vector_season::REFERENCE_TYPE)?;
                Bound::VectorSeason(VectorSeason::bind(&id, config, table)?)
            }
        };
        Ok(Analyzer {
            id,
            weight: spec.weight,
            bound,
            combined: None,
            result: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &AnalyzerId {
        &self.id
    }

    /// `<site>_<analyzer>`.
    pub fn uid(&self) -> String {
        self.id.uid()
    }

    pub fn name(&self) -> &str {
        &self.id.analyzer
    }

    pub fn site(&self) -> &str {
        &self.id.site
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn reference(&self) -> &Table {
        self.bound.comparison().reference()
    }

    /// Whether a simulation belongs to this analyzer's site.
    pub fn filter(&self, metadata: &SimMetadata) -> bool {
        metadata.site_tag == self.id.site
    }

    /// Extract one simulation. Does not touch the analyzer's working state.
    pub fn apply(&self, record: &SimulationRecord) -> Result<ExtractedObservation> {
        let table = self.bound.comparison().extract(record)?;
        Ok(ExtractedObservation {
            analyzer: self.id.clone(),
            sample: record.sample(),
            sim_id: record.sim_id().clone(),
            table,
        })
    }

    /// Average all collected replicates per sample.
    ///
    /// Observations owned by other analyzers are ignored. Replicates that
    /// never arrived are simply absent from the mean.
    pub fn combine(&mut self, observations: &[ExtractedObservation]) -> Result<()> {
        self.result.clear();
        let tagged: Vec<Table> = observations
            .iter()
            .filter(|o| o.analyzer == self.id)
            .map(|o| {
                o.table
                    .prepend_dim(SIM_ID_DIM, BinValue::Label(o.sim_id.to_string()))
                    .prepend_dim(SAMPLE_DIM, BinValue::Number(f64::from(o.sample.0)))
            })
            .collect();

        let Some(stacked) = Table::concat(&tagged)? else {
            debug!(analyzer = %self.id, "no observations to combine");
            self.combined = None;
            return Ok(());
        };

        let bins: Vec<&str> = stacked.dims()[2..].iter().map(String::as_str).collect();
        let mut per_replicate: Vec<&str> = vec![SAMPLE_DIM, SIM_ID_DIM];
        per_replicate.extend(&bins);
        let mut per_sample: Vec<&str> = vec![SAMPLE_DIM];
        per_sample.extend(&bins);

        let combined = stacked.group_sum(&per_replicate)?.group_mean(&per_sample)?;
        debug!(
            analyzer = %self.id,
            replicates = tagged.len(),
            rows = combined.len(),
            "combined replicates"
        );
        self.combined = Some(combined);
        Ok(())
    }

    /// The combined table (dims `sample` + bins), once `combine` has run.
    pub fn combined(&self) -> Option<&Table> {
        self.combined.as_ref()
    }

    pub fn samples(&self) -> Vec<SampleIndex> {
        let Some(combined) = &self.combined else {
            return Vec::new();
        };
        combined
            .levels(SAMPLE_DIM)
            .iter()
            .filter_map(BinValue::as_f64)
            .map(|s| SampleIndex(s as u32))
            .collect()
    }

    fn sample_table(&self, sample: SampleIndex) -> Result<Table> {
        let combined = self.combined.as_ref().ok_or_else(|| {
            Error::Numeric(format!("{}: compare called before combine", self.id))
        })?;
        combined.slice(SAMPLE_DIM, &BinValue::Number(f64::from(sample.0)))
    }

    /// Score one sample against the reference.
    pub fn compare(&self, sample: SampleIndex) -> Result<f64> {
        let table = self.sample_table(sample)?;
        self.bound.comparison().compare(&table)
    }

    /// Score every sample.
    pub fn finalize(&mut self) -> Result<&BTreeMap<SampleIndex, f64>> {
        let mut result = BTreeMap::new();
        for sample in self.samples() {
            result.insert(sample, self.compare(sample)?);
        }
        self.result = result;
        Ok(&self.result)
    }

    pub fn result(&self) -> &BTreeMap<SampleIndex, f64> {
        &self.result
    }

    /// Plot payload: each sample's rows on reference keys, plus the reference.
    pub fn cache(&self) -> Result<VisualizationCache> {
        let comparison = self.bound.comparison();
        let reference = comparison.reference();
        let keys: std::collections::BTreeSet<_> = reference.keys().collect();

        let mut sims = Vec::new();
        for sample in self.samples() {
            let table = self.sample_table(sample)?.reorder_dims(reference.dims())?;
            sims.push(SampleCache {
                sample,
                table: table.filter_rows(|row| keys.contains(&row.key)),
            });
        }
        Ok(VisualizationCache {
            sims,
            reference: reference.clone(),
            axis_names: comparison.axis_names(),
        })
    }
}

/// Count-model score over joined `(trials, counts)` columns.
///
/// Column names are the same on both sides of the join.
pub fn score_counts(model: CountModel, joined: &JoinedTable, trials: &str, counts: &str) -> Result<f64> {
    let ref_trials = joined.right(trials)?;
    let sim_trials = joined.left(trials)?;
    let ref_counts = joined.right(counts)?;
    let sim_counts = joined.left(counts)?;
    check_lengths(
        model,
        &[
            ref_trials.as_slice(),
            sim_trials.as_slice(),
            ref_counts.as_slice(),
            sim_counts.as_slice(),
        ],
    )?;
    Ok(model.score(&ref_trials, &sim_trials, &ref_counts, &sim_counts))
}

/// Distance-model score of paired value series.
pub fn score_distance(model: DistanceModel, reference: &[f64], sim: &[f64]) -> Result<f64> {
    check_lengths(model, &[reference, sim])?;
    Ok(model.score(reference, sim))
}

fn check_lengths(model: impl std::fmt::Display, series: &[&[f64]]) -> Result<()> {
    let first = series.first().map_or(0, |s| s.len());
    if series.iter().any(|s| s.len() != first) {
        return Err(Error::Numeric(format!(
            "{} needs equal-length inputs, got lengths {:?}",
            model,
            series.iter().map(|s| s.len()).collect::<Vec<_>>()
        )));
    }
    Ok(())
}

/// Fetch an object member, reporting the channel path on failure.
pub(crate) fn json_member<'a>(value: &'a Value, key: &str, path: &str) -> Result<&'a Value> {
    value.get(key).ok_or_else(|| Error::MissingChannel {
        channel: path.to_string(),
        reason: format!("'{}' not present", key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_lengths_are_checked() {
        let err = score_distance(DistanceModel::Euclidean, &[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, Error::Numeric(_)));
        assert_eq!(
            score_distance(DistanceModel::Euclidean, &[3.0, 0.0], &[0.0, 4.0]).unwrap(),
            -5.0
        );
    }

    #[test]
    fn setup_overlays_config_fields() {
        let mut spec = AnalyzerSpec::new(
            "prevalence",
            1.0,
            AnalyzerVariant::PrevalenceByRound(PrevalenceByRoundConfig::default()),
        );
        let setup: AnalyzerSetup = serde_json::from_str(r#"{"testdays": [10, 20]}"#).unwrap();
        spec.apply_setup("Matsari", &setup).unwrap();
        match &spec.variant {
            AnalyzerVariant::PrevalenceByRound(c) => assert_eq!(c.testdays, vec![10, 20]),
            other => panic!("variant changed: {:?}", other),
        }
    }

    #[test]
    fn setup_rejects_unknown_keys_and_type_changes() {
        let mut spec = AnalyzerSpec::new(
            "prevalence",
            1.0,
            AnalyzerVariant::PrevalenceByRound(PrevalenceByRoundConfig::default()),
        );
        let unknown: AnalyzerSetup = serde_json::from_str(r#"{"testday": [10]}"#).unwrap();
        assert!(matches!(
            spec.apply_setup("Matsari", &unknown),
            Err(Error::Configuration { .. })
        ));
        let retype: AnalyzerSetup = serde_json::from_str(r#"{"type": "age_cohort"}"#).unwrap();
        assert!(spec.apply_setup("Matsari", &retype).is_err());
    }

    #[test]
    fn spec_from_json() {
        let spec: AnalyzerSpec = serde_json::from_str(
            r#"{"name": "incidence", "variant": {"type": "age_cohort", "kind": "incidence"}}"#,
        )
        .unwrap();
        assert_eq!(spec.weight, 1.0);
        assert_eq!(
            spec.required_reference_types(),
            vec!["annual_clinical_incidence_by_age"]
        );
    }
}
