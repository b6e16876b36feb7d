//! Property tests for replicate averaging and reference rebinning.

use std::collections::BTreeMap;

use calib_common::{SampleIndex, SimId};
use calib_core::analyzer::{
    AnalyzerSetup, AnalyzerSpec, AnalyzerVariant, ExtractedObservation, PrevalenceByRoundConfig,
    SAMPLE_DIM,
};
use calib_core::binning::{aggregate_on_index, TargetIndex, AGE_DIM};
use calib_core::{BinValue, CalibSite, ReferenceDataset, Table};
use proptest::prelude::*;

fn region_round(value: f64) -> Table {
    let mut t = Table::new(["region", "round"], ["prevalence"]);
    t.push_row(vec![BinValue::Label("all".into()), BinValue::Number(1.0)], vec![value])
        .unwrap();
    t
}

fn site() -> CalibSite {
    let reference = ReferenceDataset::new().with_table("prevalence_by_round", region_round(0.5));
    let spec = AnalyzerSpec::new(
        "prev",
        1.0,
        AnalyzerVariant::PrevalenceByRound(PrevalenceByRoundConfig::default()),
    );
    let setup: AnalyzerSetup = serde_json::from_str(r#"{"testdays": [1]}"#).unwrap();
    CalibSite::new("Matsari", &reference, &[spec], &BTreeMap::from([("prev".into(), setup)]))
        .unwrap()
}

fn observations(site: &CalibSite, sample: u32, values: &[f64]) -> Vec<ExtractedObservation> {
    let id = site.analyzers()[0].id().clone();
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| ExtractedObservation {
            analyzer: id.clone(),
            sample: SampleIndex(sample),
            sim_id: SimId::new(format!("sim-{}-{}", sample, i)),
            table: region_round(v),
        })
        .collect()
}

fn combined_value(site: &CalibSite, sample: u32) -> f64 {
    let combined = site.analyzers()[0].combined().unwrap();
    let slice = combined
        .slice(SAMPLE_DIM, &BinValue::Number(f64::from(sample)))
        .unwrap();
    slice.column("prevalence").unwrap()[0]
}

#[test]
fn three_replicates_of_a_tenth_combine_exactly() {
    let mut site = site();
    let obs = observations(&site, 0, &[0.1, 0.1, 0.1]);
    site.analyzers_mut()[0].combine(&obs).unwrap();
    assert_eq!(combined_value(&site, 0), 0.1);
}

proptest! {
    #[test]
    fn identical_replicates_average_to_themselves(v in -1.0e3f64..1.0e3, n in 1usize..8) {
        let mut site = site();
        let obs = observations(&site, 0, &vec![v; n]);
        site.analyzers_mut()[0].combine(&obs).unwrap();
        let got = combined_value(&site, 0);
        prop_assert_eq!(got, v);
    }

    #[test]
    fn two_replicates_average_to_midpoint(v in -1.0e3f64..1.0e3) {
        let mut site = site();
        let obs = observations(&site, 3, &[v, 2.0 * v]);
        site.analyzers_mut()[0].combine(&obs).unwrap();
        let got = combined_value(&site, 3);
        prop_assert!((got - 1.5 * v).abs() <= 1e-9 * v.abs().max(1.0));
    }

    #[test]
    fn rebinning_conserves_mass_inside_the_edges(
        edges in prop::collection::btree_set(1u32..60, 1..6),
        weights in prop::collection::vec(0.0f64..100.0, 60),
    ) {
        let edges: Vec<f64> = edges.into_iter().map(f64::from).collect();
        let top = edges[edges.len() - 1];

        let mut target = Table::new([AGE_DIM], ["v"]);
        for &e in &edges {
            target.push_row(vec![BinValue::Number(e)], vec![0.0]).unwrap();
        }
        let index = TargetIndex::from_table(&target);

        let mut source = Table::new([AGE_DIM], ["v"]);
        let mut inside = 0.0;
        for (k, &w) in weights.iter().enumerate() {
            let age = k as f64 + 0.5;
            if age <= top {
                inside += w;
            }
            source.push_row(vec![BinValue::Number(age)], vec![w]).unwrap();
        }

        let out = aggregate_on_index(&source, &index, &["v"]).unwrap();
        let total: f64 = out.column("v").unwrap().iter().sum();
        prop_assert!((total - inside).abs() <= 1e-9 * inside.max(1.0));
        prop_assert!(out.len() <= edges.len());
        for key in out.keys() {
            prop_assert!(edges.contains(&key[0].as_f64().unwrap()));
        }
    }
}

#[test]
fn other_analyzers_observations_are_ignored() {
    let mut site = site();
    let mut obs = observations(&site, 0, &[0.2]);
    let mut foreign = observations(&site, 0, &[9.0]);
    foreign[0].analyzer = calib_common::AnalyzerId::new("Rafin", "prev");
    obs.extend(foreign);
    site.analyzers_mut()[0].combine(&obs).unwrap();
    assert_eq!(combined_value(&site, 0), 0.2);
}

#[test]
fn no_observations_leave_nothing_to_score() {
    let mut site = site();
    let analyzer = &mut site.analyzers_mut()[0];
    analyzer.combine(&[]).unwrap();
    assert!(analyzer.combined().is_none());
    assert!(analyzer.finalize().unwrap().is_empty());
}
