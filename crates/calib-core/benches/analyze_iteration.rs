//! Criterion benchmarks for one calibration iteration in `calib-core`.
//!
//! Simulations are synthetic spatial reports held in memory, so the numbers
//! cover extraction, combining and scoring without disk access.

use std::collections::BTreeMap;

use calib_core::analyzer::{AnalyzerSetup, AnalyzerSpec};
use calib_core::{
    BinValue, CalibSite, Orchestrator, RawContent, ReferenceDataset, SimMetadata, SimulationRecord,
    SpatialReport, Table,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const MONTHS: usize = 24;
const DAYS: usize = 3650 + MONTHS * 30;

fn site() -> CalibSite {
    let mut t = Table::new(["Channel", "month"], ["Counts"]);
    for m in 0..MONTHS {
        t.push_row(
            vec![BinValue::Label("Clinical_Cases".into()), BinValue::Number(m as f64)],
            vec![30.0 + (m % 12) as f64],
        )
        .expect("reference row");
    }
    let reference = ReferenceDataset::new().with_table("cc_by_month", t);
    let specs: Vec<AnalyzerSpec> =
        serde_json::from_str(r#"[{"name": "cases", "variant": {"type": "monthly_spatial"}}]"#)
            .expect("spec");
    let setups: BTreeMap<String, AnalyzerSetup> =
        serde_json::from_str(r#"{"cases": {}}"#).expect("setup");
    CalibSite::new("Munyumbwe", &reference, &specs, &setups).expect("site")
}

fn simulations(samples: u32, replicates: u32) -> Vec<SimulationRecord> {
    let mut sims = Vec::new();
    for sample in 0..samples {
        for rep in 0..replicates {
            let rows: Vec<Vec<f32>> = (0..DAYS)
                .map(|d| vec![((d + rep as usize) % 3) as f32, (sample % 5) as f32, 1.0])
                .collect();
            let report = SpatialReport::new(vec![1, 2, 3], rows).expect("report");
            sims.push(
                SimulationRecord::new(SimMetadata::new(
                    format!("sim-{}-{}", sample, rep),
                    sample,
                    "Munyumbwe",
                ))
                .with_file(
                    "output/SpatialReport_New_Clinical_Cases.bin",
                    RawContent::Spatial(report),
                ),
            );
        }
    }
    sims
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    group.sample_size(20);

    for samples in [8u32, 32] {
        let sims = simulations(samples, 2);
        group.bench_with_input(BenchmarkId::new("monthly_spatial", samples), &sims, |b, sims| {
            b.iter(|| {
                let mut orchestrator = Orchestrator::new(vec![site()]).with_max_threads(4);
                let report = orchestrator.analyze(black_box(sims)).expect("iteration");
                black_box(report.best());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
