//! calibtool core library
//!
//! Turns raw simulation output into per-sample likelihood scores:
//! - Labeled tables and the rebinning helpers that map simulation bins onto
//!   reference bins
//! - Report decoders for summary JSON and binary spatial reports
//! - Analyzers that extract, combine and score one observable each
//! - Calibration sites binding analyzers to reference data
//! - The orchestrator that runs one iteration across sites

pub mod analyzer;
pub mod binning;
pub mod logging;
pub mod orchestrator;
pub mod record;
pub mod reference;
pub mod site;
pub mod spatial;
pub mod summary;
pub mod table;

pub use analyzer::{
    Analyzer, AnalyzerSetup, AnalyzerSpec, AnalyzerVariant, ExtractedObservation,
    VisualizationCache,
};
pub use orchestrator::{combine_sites, IterationCache, IterationReport, Orchestrator};
pub use record::{RawContent, SimMetadata, SimulationRecord};
pub use reference::{ReferenceDataset, ReferenceProvider, SiteReferences};
pub use site::CalibSite;
pub use spatial::SpatialReport;
pub use table::{BinKey, BinValue, Table};
