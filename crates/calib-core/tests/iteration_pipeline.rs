//! End-to-end iteration over two sites with on-disk cache export.

use std::collections::BTreeMap;

use calib_common::{AnalyzerId, CacheSettings, RunConfig, SampleIndex};
use calib_core::analyzer::{AnalyzerSetup, AnalyzerSpec};
use calib_core::{
    BinValue, CalibSite, IterationCache, Orchestrator, RawContent, ReferenceDataset, SimMetadata,
    SimulationRecord, SpatialReport, Table,
};
use serde_json::json;

const ANNUAL_REPORT: &str = "output/MalariaSummaryReport_Annual_Report.json";
const SPATIAL_REPORT: &str = "output/SpatialReport_New_Clinical_Cases.bin";

fn dielmo() -> CalibSite {
    let mut t = Table::new(
        ["Age Bin"],
        ["Annual Clinical Incidence by Age Bin", "Average Population by Age Bin"],
    );
    t.push_row(vec![BinValue::Number(1.0)], vec![2.0, 10.0]).unwrap();
    t.push_row(vec![BinValue::Number(3.0)], vec![1.0, 20.0]).unwrap();
    let reference = ReferenceDataset::new().with_table("annual_clinical_incidence_by_age", t);

    let specs: Vec<AnalyzerSpec> = serde_json::from_str(
        r#"[{"name": "incidence", "weight": 0.5, "variant": {"type": "age_cohort", "kind": "incidence"}}]"#,
    )
    .unwrap();
    let setups: BTreeMap<String, AnalyzerSetup> =
        serde_json::from_str(r#"{"incidence": {"start_day": 0.0}}"#).unwrap();
    CalibSite::new("Dielmo", &reference, &specs, &setups).unwrap()
}

fn munyumbwe() -> CalibSite {
    let mut t = Table::new(["Channel", "month"], ["Counts"]);
    for (m, v) in [5.0, 4.0, 2.0].iter().enumerate() {
        t.push_row(
            vec![BinValue::Label("Clinical_Cases".into()), BinValue::Number(m as f64)],
            vec![*v],
        )
        .unwrap();
    }
    let reference = ReferenceDataset::new().with_table("cc_by_month", t);
    let specs: Vec<AnalyzerSpec> = serde_json::from_str(
        r#"[{"name": "cases", "variant": {"type": "monthly_spatial"}}]"#,
    )
    .unwrap();
    let setups: BTreeMap<String, AnalyzerSetup> =
        serde_json::from_str(r#"{"cases": {"burn_in_days": 2, "months": 3}}"#).unwrap();
    CalibSite::new("Munyumbwe", &reference, &specs, &setups).unwrap()
}

fn cohort_sim(site: &str, id: &str, sample: u32) -> SimulationRecord {
    SimulationRecord::new(SimMetadata::new(id, sample, site)).with_file(
        ANNUAL_REPORT,
        RawContent::Json(json!({
            "Metadata": {"Age Bins": [100]},
            "DataByTime": {"Time Of Report": [365, 730, 1095]},
            "DataByTimeAndAgeBins": {
                "Annual Clinical Incidence by Age Bin": [[2.0], [1.0], [0.5]],
                "Average Population by Age Bin": [[10.0], [10.0], [10.0]]
            }
        })),
    )
}

fn spatial_sim(id: &str, sample: u32, per_day: f32) -> SimulationRecord {
    let rows: Vec<Vec<f32>> = (0..9).map(|d| vec![d as f32, per_day]).collect();
    let report = SpatialReport::new(vec![1, 2], rows).unwrap();
    SimulationRecord::new(SimMetadata::new(id, sample, "Munyumbwe"))
        .with_file(SPATIAL_REPORT, RawContent::Bytes(report.encode().unwrap()))
}

#[test]
fn iteration_scores_weights_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("iter0").join("cache.json");
    let config = RunConfig {
        max_threads: 4,
        cache: CacheSettings {
            enabled: true,
            path: Some(cache_path.clone()),
        },
        ..RunConfig::default()
    };

    let mut orchestrator = Orchestrator::from_config(vec![dielmo(), munyumbwe()], &config)
        .with_run_id("run-test")
        .with_iteration(0);
    let sims = vec![
        cohort_sim("Dielmo", "d-0a", 0),
        cohort_sim("Dielmo", "d-0b", 0),
        spatial_sim("m-0a", 0, 1.0),
        spatial_sim("m-1a", 1, 0.0),
        // no report at all: recorded, not fatal
        SimulationRecord::new(SimMetadata::new("m-1b", 1, "Munyumbwe")),
        // belongs to no configured site
        cohort_sim("Namawala", "x-0", 0),
    ];
    let report = orchestrator.analyze(&sims).unwrap();

    let incidence = report.results[&AnalyzerId::new("Dielmo", "incidence")][&SampleIndex(0)];
    let expected =
        calib_math::gamma_poisson(&[10.0, 20.0], &[10.0, 20.0], &[20.0, 20.0], &[20.0, 15.0]);
    assert!((incidence - expected).abs() < 1e-9);

    // days 2..9: node sums 3..=9 with one extra case per day, or 2..=8 without
    let cases = &report.results[&AnalyzerId::new("Munyumbwe", "cases")];
    assert!((cases[&SampleIndex(0)] + (49.0f64 + 81.0 + 225.0).sqrt()).abs() < 1e-9);
    assert!((cases[&SampleIndex(1)] + (16.0f64 + 49.0 + 169.0).sqrt()).abs() < 1e-9);

    assert!((report.totals[&SampleIndex(0)] - (0.5 * incidence + cases[&SampleIndex(0)])).abs() < 1e-9);
    assert!((report.totals[&SampleIndex(1)] - cases[&SampleIndex(1)]).abs() < 1e-9);

    assert_eq!(report.failures.summary.failed, 1);
    assert_eq!(report.failures.failed[0].item_id, "Munyumbwe_cases:m-1b");
    assert_eq!(report.failures.summary.succeeded, 4);
    assert!(report.degenerate.is_empty());

    let written: IterationCache =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert_eq!(written.run_id, "run-test");
    assert_eq!(
        written.analyzers.keys().collect::<Vec<_>>(),
        vec!["Dielmo_incidence", "Munyumbwe_cases"]
    );
    let cases_cache = &written.analyzers["Munyumbwe_cases"];
    assert_eq!(cases_cache.sims.len(), 2);
    assert_eq!(cases_cache.sims[0].table.column("Counts").unwrap(), vec![12.0, 13.0, 17.0]);
}

#[test]
fn disabled_cache_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let mut orchestrator = Orchestrator::new(vec![munyumbwe()])
        .with_cache(false, Some(cache_path.clone()));
    let report = orchestrator.analyze(&[spatial_sim("m-0a", 0, 1.0)]).unwrap();
    assert!(report.cache.analyzers.is_empty());
    assert_eq!(report.cache.results.len(), 1);
    assert!(!cache_path.exists());
}
