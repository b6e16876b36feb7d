//! Identity types for analyzers, parameter samples and simulations.
//!
//! Results are keyed by these values rather than by object identity, so a
//! result can always be traced back to the site and analyzer that produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of one parameter sample within a calibration iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleIndex(pub u32);

impl fmt::Display for SampleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SampleIndex {
    fn from(sample: u32) -> Self {
        SampleIndex(sample)
    }
}

/// Identifier of one simulation run (one replicate of one sample).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimId(pub String);

impl SimId {
    pub fn new(id: impl Into<String>) -> Self {
        SimId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of a set of results: an analyzer bound to a site.
///
/// Ordering is by site first, then analyzer, so results from the same site
/// sort together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnalyzerId {
    pub site: String,
    pub analyzer: String,
}

impl AnalyzerId {
    pub fn new(site: impl Into<String>, analyzer: impl Into<String>) -> Self {
        AnalyzerId {
            site: site.into(),
            analyzer: analyzer.into(),
        }
    }

    /// Flat identifier `<site>_<analyzer>`, used as the cache key.
    ///
    /// Not guaranteed to be reversible when names contain underscores; use
    /// the structured id wherever ownership matters.
    pub fn uid(&self) -> String {
        format!("{}_{}", self.site, self.analyzer)
    }
}

impl fmt::Display for AnalyzerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.analyzer)
    }
}
