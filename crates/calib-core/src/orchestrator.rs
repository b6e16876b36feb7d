//! One calibration iteration across all sites.
//!
//! Simulations are routed to every analyzer whose site they belong to,
//! extracted in parallel, then combined and scored per analyzer once every
//! extraction has finished. Results are keyed by [`AnalyzerId`] and
//! [`SampleIndex`], never by object identity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use calib_common::{
    AnalyzerId, BatchResult, Config, ConfigSnapshot, Error, Result, RunConfig, SampleIndex, SimId,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::analyzer::{ExtractedObservation, VisualizationCache};
use crate::logging::{event_names, generate_run_id, LogContext, LogEvent, Stage};
use crate::record::SimulationRecord;
use crate::site::CalibSite;

pub const DEFAULT_MAX_THREADS: usize = 16;

/// One successful `apply()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedSimulation {
    pub analyzer: AnalyzerId,
    pub sim_id: SimId,
    pub sample: SampleIndex,
}

/// A score that came out NaN or infinite. It stays in the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegenerateScore {
    pub analyzer: AnalyzerId,
    pub sample: SampleIndex,
    pub score: f64,
}

/// Everything needed to redraw the iteration's plots, keyed by analyzer uid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationCache {
    pub run_id: String,
    pub iteration: u32,
    pub analyzers: BTreeMap<String, VisualizationCache>,
    pub results: BTreeMap<String, BTreeMap<SampleIndex, f64>>,
    pub totals: BTreeMap<SampleIndex, f64>,
    /// Provenance of the run configuration, when one was loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct IterationReport {
    pub results: BTreeMap<AnalyzerId, BTreeMap<SampleIndex, f64>>,
    /// Weighted sum over the analyzers that scored each sample.
    pub totals: BTreeMap<SampleIndex, f64>,
    pub failures: BatchResult<AppliedSimulation>,
    pub degenerate: Vec<DegenerateScore>,
    pub cache: IterationCache,
    /// Lifecycle events of the iteration, in order.
    pub events: Vec<LogEvent>,
}

impl IterationReport {
    /// Sample with the highest total. NaN totals never win.
    pub fn best(&self) -> Option<(SampleIndex, f64)> {
        self.totals
            .iter()
            .filter(|(_, total)| !total.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(sample, total)| (*sample, *total))
    }

    /// Write the visualization cache as pretty JSON.
    pub fn write_cache(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.cache)?;
        std::fs::write(path, json)?;
        info!(
            target: event_names::CACHE_WRITTEN,
            path = %path.display(),
            analyzers = self.cache.analyzers.len(),
            "cache written"
        );
        Ok(())
    }

    /// Lifecycle events as JSON lines.
    pub fn events_jsonl(&self) -> String {
        self.events
            .iter()
            .map(LogEvent::to_jsonl)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Weighted sum of per-site totals.
///
/// A sample missing from one report contributes nothing for that report.
pub fn combine_sites(
    reports: &[IterationReport],
    weights: &[f64],
) -> Result<BTreeMap<SampleIndex, f64>> {
    if reports.len() != weights.len() {
        return Err(Error::Numeric(format!(
            "{} reports but {} site weights",
            reports.len(),
            weights.len()
        )));
    }
    let mut totals = BTreeMap::new();
    for (report, weight) in reports.iter().zip(weights) {
        for (sample, total) in &report.totals {
            *totals.entry(*sample).or_insert(0.0) += weight * total;
        }
    }
    Ok(totals)
}

/// Drives analyzers over the simulations of one iteration.
#[derive(Debug)]
pub struct Orchestrator {
    sites: Vec<CalibSite>,
    max_threads: usize,
    cache_enabled: bool,
    cache_path: Option<PathBuf>,
    context: LogContext,
    iteration: u32,
    snapshot: Option<ConfigSnapshot>,
}

impl Orchestrator {
    pub fn new(sites: Vec<CalibSite>) -> Self {
        Orchestrator {
            sites,
            max_threads: DEFAULT_MAX_THREADS,
            cache_enabled: true,
            cache_path: None,
            context: LogContext::new(generate_run_id()).with_iteration(0),
            iteration: 0,
            snapshot: None,
        }
    }

    /// Take worker count and cache settings from the run configuration.
    pub fn from_config(sites: Vec<CalibSite>, config: &RunConfig) -> Self {
        let mut orchestrator = Orchestrator::new(sites).with_max_threads(config.max_threads);
        orchestrator.cache_enabled = config.cache.enabled;
        orchestrator.cache_path = config.cache.path.clone();
        orchestrator
    }

    /// Like [`Orchestrator::from_config`], recording where the config came from.
    pub fn from_loaded(sites: Vec<CalibSite>, config: &Config) -> Self {
        let mut orchestrator = Orchestrator::from_config(sites, &config.run);
        orchestrator.snapshot = Some(config.snapshot.clone());
        orchestrator
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.context = LogContext::new(run_id).with_iteration(self.iteration);
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self.context = self.context.with_iteration(iteration);
        self
    }

    pub fn with_cache(mut self, enabled: bool, path: Option<PathBuf>) -> Self {
        self.cache_enabled = enabled;
        self.cache_path = path;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.context.run_id
    }

    pub fn sites(&self) -> &[CalibSite] {
        &self.sites
    }

    /// Score every analyzer on the given simulations.
    ///
    /// Recoverable extraction failures are recorded in the report and the
    /// simulation is left out of the mean. Any other failure aborts the
    /// iteration.
    pub fn analyze(&mut self, simulations: &[SimulationRecord]) -> Result<IterationReport> {
        if self.max_threads == 0 {
            return Err(Error::InvalidConfig("max_threads must be at least 1".to_string()));
        }
        let run_span = info_span!(
            "iteration",
            run_id = %self.context.run_id,
            iteration = self.iteration
        );
        let _enter = run_span.enter();
        let mut events = Vec::new();

        // route
        let mut jobs: Vec<(usize, usize, &SimulationRecord)> = Vec::new();
        for record in simulations {
            for (s, site) in self.sites.iter().enumerate() {
                if !site.filter(&record.metadata) {
                    continue;
                }
                for (a, analyzer) in site.analyzers().iter().enumerate() {
                    if analyzer.filter(&record.metadata) {
                        jobs.push((s, a, record));
                    }
                }
            }
        }
        info!(
            target: event_names::RUN_STARTED,
            sites = self.sites.len(),
            simulations = simulations.len(),
            jobs = jobs.len(),
            "starting iteration"
        );
        events.push(
            self.context
                .info(event_names::RUN_STARTED, Stage::Apply, "starting iteration")
                .with_field("simulations", simulations.len())
                .with_field("jobs", jobs.len()),
        );

        // fan out
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_threads)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {}", e)))?;
        let sites = &self.sites;
        let outcomes: Vec<(usize, usize, &SimulationRecord, Result<ExtractedObservation>)> =
            pool.install(|| {
                jobs.par_iter()
                    .map(|&(s, a, record)| {
                        let analyzer = &sites[s].analyzers()[a];
                        let span = info_span!(
                            parent: &run_span,
                            "apply",
                            stage = %Stage::Apply,
                            site = %analyzer.site(),
                            analyzer = %analyzer.name(),
                            sim_id = %record.sim_id()
                        );
                        let _enter = span.enter();
                        (s, a, record, analyzer.apply(record))
                    })
                    .collect()
            });

        // barrier: everything below runs after all extractions returned
        let mut collected: BTreeMap<(usize, usize), Vec<ExtractedObservation>> = BTreeMap::new();
        let mut failures = BatchResult::default();
        for (s, a, record, outcome) in outcomes {
            let id = sites[s].analyzers()[a].id().clone();
            match outcome {
                Ok(observation) => {
                    failures.add_success(AppliedSimulation {
                        analyzer: id,
                        sim_id: record.sim_id().clone(),
                        sample: record.sample(),
                    });
                    collected.entry((s, a)).or_default().push(observation);
                }
                Err(err) if err.is_recoverable() => {
                    let item_id = format!("{}:{}", id.uid(), record.sim_id());
                    warn!(
                        target: event_names::APPLY_FAILED,
                        site = %id.site,
                        analyzer = %id.analyzer,
                        sim_id = %record.sim_id(),
                        error = %err,
                        "extraction failed; simulation left out"
                    );
                    events.push(
                        self.context
                            .warn(event_names::APPLY_FAILED, Stage::Apply, err.to_string())
                            .with_analyzer(&id)
                            .with_field("sim_id", record.sim_id()),
                    );
                    failures.add_failure(item_id, &err);
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            target: event_names::APPLY_FINISHED,
            succeeded = failures.summary.succeeded,
            failed = failures.summary.failed,
            "extraction finished"
        );

        let mut results = BTreeMap::new();
        let mut degenerate = Vec::new();
        let mut cache = IterationCache {
            run_id: self.context.run_id.clone(),
            iteration: self.iteration,
            config: self.snapshot.as_ref().map(ConfigSnapshot::to_json),
            ..IterationCache::default()
        };

        for (s, site) in self.sites.iter_mut().enumerate() {
            for (a, analyzer) in site.analyzers_mut().iter_mut().enumerate() {
                let id = analyzer.id().clone();
                let span = info_span!(
                    "analyzer",
                    site = %id.site,
                    analyzer = %id.analyzer
                );
                let _enter = span.enter();

                let observations = collected.remove(&(s, a)).unwrap_or_default();
                analyzer.combine(&observations)?;
                info!(
                    target: event_names::COMBINE_FINISHED,
                    stage = %Stage::Combine,
                    observations = observations.len(),
                    samples = analyzer.samples().len(),
                    "replicates combined"
                );

                let scores = analyzer.finalize()?.clone();
                for (sample, score) in &scores {
                    if !score.is_finite() {
                        warn!(
                            target: event_names::FINALIZE_DEGENERATE,
                            stage = %Stage::Finalize,
                            sample = sample.0,
                            score = *score,
                            "non-finite score"
                        );
                        events.push(
                            self.context
                                .warn(
                                    event_names::FINALIZE_DEGENERATE,
                                    Stage::Finalize,
                                    "non-finite score",
                                )
                                .with_analyzer(&id)
                                .with_field("sample", sample.0),
                        );
                        degenerate.push(DegenerateScore {
                            analyzer: id.clone(),
                            sample: *sample,
                            score: *score,
                        });
                    }
                }
                debug!(
                    target: event_names::FINALIZE_FINISHED,
                    stage = %Stage::Finalize,
                    samples = scores.len(),
                    "analyzer scored"
                );

                if self.cache_enabled {
                    cache.analyzers.insert(id.uid(), analyzer.cache()?);
                }
                cache.results.insert(id.uid(), scores.clone());
                results.insert(id, scores);
            }
        }

        let totals = weighted_totals(&self.sites, &results);
        cache.totals = totals.clone();

        info!(
            target: event_names::RUN_FINISHED,
            analyzers = results.len(),
            samples = totals.len(),
            failed = failures.summary.failed,
            degenerate = degenerate.len(),
            "iteration finished"
        );
        events.push(
            self.context
                .info(event_names::RUN_FINISHED, Stage::Finalize, "iteration finished")
                .with_field("samples", totals.len())
                .with_field("failed", failures.summary.failed),
        );

        let report = IterationReport {
            results,
            totals,
            failures,
            degenerate,
            cache,
            events,
        };
        if self.cache_enabled {
            if let Some(path) = &self.cache_path {
                report.write_cache(path)?;
            }
        }
        Ok(report)
    }
}

fn weighted_totals(
    sites: &[CalibSite],
    results: &BTreeMap<AnalyzerId, BTreeMap<SampleIndex, f64>>,
) -> BTreeMap<SampleIndex, f64> {
    let mut totals = BTreeMap::new();
    for analyzer in sites.iter().flat_map(|s| s.analyzers()) {
        let Some(scores) = results.get(analyzer.id()) else {
            continue;
        };
        for (sample, score) in scores {
            *totals.entry(*sample).or_insert(0.0) += analyzer.weight() * score;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerSetup, AnalyzerSpec, AnalyzerVariant, PrevalenceByRoundConfig};
    use crate::record::{RawContent, SimMetadata};
    use crate::reference::ReferenceDataset;
    use crate::table::{BinValue, Table};
    use serde_json::json;

    fn site(name: &str, weight: f64) -> CalibSite {
        let mut t = Table::new(["region", "round"], ["prevalence"]);
        t.push_row(vec![BinValue::Label("all".into()), BinValue::Number(1.0)], vec![0.5])
            .unwrap();
        let reference = ReferenceDataset::new().with_table("prevalence_by_round", t);
        let spec = AnalyzerSpec::new(
            "prev",
            weight,
            AnalyzerVariant::PrevalenceByRound(PrevalenceByRoundConfig::default()),
        );
        let setup: AnalyzerSetup = serde_json::from_str(r#"{"testdays": [1]}"#).unwrap();
        let setups = BTreeMap::from([("prev".to_string(), setup)]);
        CalibSite::new(name, &reference, &[spec], &setups).unwrap()
    }

    fn sim(id: &str, sample: u32, site: &str, value: f64) -> SimulationRecord {
        SimulationRecord::new(SimMetadata::new(id, sample, site)).with_file(
            "output/ReportMalariaFiltered.json",
            RawContent::Json(json!({"Channels": {"New Diagnostic Prevalence": {"Data": [0.0, value]}}})),
        )
    }

    #[test]
    fn replicates_are_averaged_before_scoring() {
        let mut o = Orchestrator::new(vec![site("Matsari", 1.0)]).with_max_threads(2);
        let report = o
            .analyze(&[
                sim("a", 0, "Matsari", 0.4),
                sim("b", 0, "Matsari", 0.6),
                sim("c", 1, "Matsari", 0.2),
            ])
            .unwrap();
        let id = AnalyzerId::new("Matsari", "prev");
        let scores = &report.results[&id];
        assert!(scores[&SampleIndex(0)].abs() < 1e-12);
        assert!((scores[&SampleIndex(1)] + 0.3).abs() < 1e-12);
        assert_eq!(report.best().unwrap().0, SampleIndex(0));
        assert_eq!(report.failures.summary.succeeded, 3);
    }

    #[test]
    fn simulations_only_reach_their_site() {
        let mut o = Orchestrator::new(vec![site("Matsari", 1.0), site("Rafin", 2.0)]);
        let report = o
            .analyze(&[sim("a", 0, "Matsari", 0.5), sim("b", 0, "Rafin", 0.4)])
            .unwrap();
        assert_eq!(report.results[&AnalyzerId::new("Matsari", "prev")].len(), 1);
        // 1.0 * 0 + 2.0 * -0.1
        assert!((report.totals[&SampleIndex(0)] + 0.2).abs() < 1e-12);
        assert!(report.cache.analyzers.contains_key("Rafin_prev"));
    }

    #[test]
    fn missing_file_is_recorded_not_fatal() {
        let mut o = Orchestrator::new(vec![site("Matsari", 1.0)]);
        let broken = SimulationRecord::new(SimMetadata::new("x", 0, "Matsari"));
        let report = o.analyze(&[broken, sim("a", 0, "Matsari", 0.5)]).unwrap();
        assert_eq!(report.failures.summary.failed, 1);
        assert_eq!(report.failures.failed[0].item_id, "Matsari_prev:x");
        assert_eq!(report.results[&AnalyzerId::new("Matsari", "prev")].len(), 1);
        assert!(report.events_jsonl().contains("apply.failed"));
    }

    #[test]
    fn loaded_config_is_recorded_in_the_cache() {
        let config = Config::load_defaults().unwrap();
        let mut o = Orchestrator::from_loaded(vec![site("Matsari", 1.0)], &config);
        let report = o.analyze(&[sim("a", 0, "Matsari", 0.5)]).unwrap();
        let recorded = report.cache.config.as_ref().unwrap();
        assert_eq!(recorded["source"]["resolution"], "default");
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut o = Orchestrator::new(vec![site("Matsari", 1.0)]).with_max_threads(0);
        assert!(matches!(o.analyze(&[]), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn no_simulations_gives_empty_results() {
        let mut o = Orchestrator::new(vec![site("Matsari", 1.0)]);
        let report = o.analyze(&[]).unwrap();
        assert!(report.totals.is_empty());
        assert!(report.best().is_none());
    }

    #[test]
    fn combine_sites_requires_matching_weights() {
        let mut o = Orchestrator::new(vec![site("Matsari", 1.0)]);
        let report = o.analyze(&[sim("a", 0, "Matsari", 0.3)]).unwrap();
        assert!(combine_sites(std::slice::from_ref(&report), &[]).is_err());
        let combined = combine_sites(&[report.clone(), report], &[1.0, 0.5]).unwrap();
        assert!((combined[&SampleIndex(0)] + 0.3).abs() < 1e-12);
    }
}
