//! Per-simulation input records.
//!
//! The calibration core never parses simulator configuration or dispatches
//! jobs. It sees each finished simulation as metadata plus already-parsed
//! output files keyed by logical filename.

use std::borrow::Cow;
use std::collections::BTreeMap;

use calib_common::{Error, Result, SampleIndex, SimId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spatial::SpatialReport;

/// Routing metadata of one simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimMetadata {
    pub sim_id: SimId,
    pub sample: SampleIndex,
    /// Name of the site this simulation was configured for.
    pub site_tag: String,
}

impl SimMetadata {
    pub fn new(sim_id: impl Into<String>, sample: u32, site_tag: impl Into<String>) -> Self {
        SimMetadata {
            sim_id: SimId::new(sim_id),
            sample: SampleIndex(sample),
            site_tag: site_tag.into(),
        }
    }
}

/// Content of one simulation output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum RawContent {
    Json(Value),
    /// A spatial report decoded by the caller.
    Spatial(SpatialReport),
    /// Undecoded file bytes.
    Bytes(Vec<u8>),
    Text(String),
}

/// One finished simulation as presented to the analyzers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    #[serde(flatten)]
    pub metadata: SimMetadata,
    #[serde(default)]
    pub raw_data: BTreeMap<String, RawContent>,
}

impl SimulationRecord {
    pub fn new(metadata: SimMetadata) -> Self {
        SimulationRecord {
            metadata,
            raw_data: BTreeMap::new(),
        }
    }

    /// Attach one parsed output file.
    pub fn with_file(mut self, filename: impl Into<String>, content: RawContent) -> Self {
        self.raw_data.insert(filename.into(), content);
        self
    }

    pub fn sim_id(&self) -> &SimId {
        &self.metadata.sim_id
    }

    pub fn sample(&self) -> SampleIndex {
        self.metadata.sample
    }

    pub fn file(&self, filename: &str) -> Result<&RawContent> {
        self.raw_data.get(filename).ok_or_else(|| self.missing(filename))
    }

    /// A JSON output file.
    pub fn json(&self, filename: &str) -> Result<&Value> {
        match self.file(filename)? {
            RawContent::Json(value) => Ok(value),
            other => Err(Error::Decode(format!(
                "{} of {} is {}, expected JSON",
                filename,
                self.metadata.sim_id,
                other.kind()
            ))),
        }
    }

    /// A text output file; raw bytes must be UTF-8.
    pub fn text(&self, filename: &str) -> Result<&str> {
        match self.file(filename)? {
            RawContent::Text(text) => Ok(text),
            RawContent::Bytes(bytes) => std::str::from_utf8(bytes).map_err(|e| {
                Error::Decode(format!("{} of {} is not UTF-8: {}", filename, self.metadata.sim_id, e))
            }),
            other => Err(Error::Decode(format!(
                "{} of {} is {}, expected text",
                filename,
                self.metadata.sim_id,
                other.kind()
            ))),
        }
    }

    /// A spatial report, decoding raw bytes when needed.
    pub fn spatial(&self, filename: &str) -> Result<Cow<'_, SpatialReport>> {
        match self.file(filename)? {
            RawContent::Spatial(report) => Ok(Cow::Borrowed(report)),
            RawContent::Bytes(bytes) => SpatialReport::decode(bytes).map(Cow::Owned),
            other => Err(Error::Decode(format!(
                "{} of {} is {}, expected a spatial report",
                filename,
                self.metadata.sim_id,
                other.kind()
            ))),
        }
    }

    fn missing(&self, filename: &str) -> Error {
        Error::MissingFile {
            sim_id: self.metadata.sim_id.to_string(),
            filename: filename.to_string(),
        }
    }
}

impl RawContent {
    fn kind(&self) -> &'static str {
        match self {
            RawContent::Json(_) => "json",
            RawContent::Spatial(_) => "spatial",
            RawContent::Bytes(_) => "bytes",
            RawContent::Text(_) => "text",
        }
    }
}
