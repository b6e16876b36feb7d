//! Error types for calibtool.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Site Configuration Error
//!   Reason: site 'Namawala' analyzer 'incidence': no analyzers configured
//!   Fix: Check the analyzer list and setup keys passed to the site.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 21,
//!   "category": "data_shape",
//!   "message": "simulation 'sim-7' is missing 'output/InsetChart.json'",
//!   "recoverable": true,
//!   "suggested_action": "skip",
//!   "context": { "sim_id": "sim-7", "filename": "output/InsetChart.json" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for calibtool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Site, analyzer or run configuration errors.
    Config,
    /// Reference or simulation data with the wrong structure.
    DataShape,
    /// Malformed report payloads.
    Decode,
    /// Likelihood inputs that cannot be scored.
    Numeric,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::DataShape => write!(f, "data_shape"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Numeric => write!(f, "numeric"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for agents to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Fix the site or analyzer configuration.
    FixConfig,
    /// Skip this simulation and continue.
    Skip,
    /// Abort the iteration.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for calibtool.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("site '{site}' analyzer '{analyzer}': {reason}")]
    Configuration {
        site: String,
        analyzer: String,
        reason: String,
    },

    #[error("site '{site}' has no reference data of type '{reference_type}'")]
    MissingReference {
        site: String,
        reference_type: String,
    },

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    // Data shape errors (20-29)
    #[error("site '{site}' analyzer '{analyzer}': unexpected data shape: {reason}")]
    DataShape {
        site: String,
        analyzer: String,
        reason: String,
    },

    #[error("simulation '{sim_id}' is missing '{filename}'")]
    MissingFile { sim_id: String, filename: String },

    #[error("channel '{channel}' unavailable: {reason}")]
    MissingChannel { channel: String, reason: String },

    #[error("decode failed: {0}")]
    Decode(String),

    // Numeric errors (30-39)
    #[error("numeric error: {0}")]
    Numeric(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] error.
    pub fn configuration(
        site: impl Into<String>,
        analyzer: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Configuration {
            site: site.into(),
            analyzer: analyzer.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::DataShape`] error.
    pub fn data_shape(
        site: impl Into<String>,
        analyzer: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::DataShape {
            site: site.into(),
            analyzer: analyzer.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Data shape and decode errors
    /// - 30-39: Numeric errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Configuration { .. } => 10,
            Error::MissingReference { .. } => 11,
            Error::InvalidConfig(_) => 12,
            Error::DataShape { .. } => 20,
            Error::MissingFile { .. } => 21,
            Error::MissingChannel { .. } => 22,
            Error::Decode(_) => 23,
            Error::Numeric(_) => 30,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Toml(_) => 62,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration { .. } | Error::MissingReference { .. } | Error::InvalidConfig(_) => {
                ErrorCategory::Config
            }
            Error::DataShape { .. } | Error::MissingFile { .. } | Error::MissingChannel { .. } => {
                ErrorCategory::DataShape
            }
            Error::Decode(_) => ErrorCategory::Decode,
            Error::Numeric(_) => ErrorCategory::Numeric,
            Error::Io(_) | Error::Json(_) | Error::Toml(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether the iteration can continue past this error.
    ///
    /// Per-simulation extraction failures are recoverable: the replicate is
    /// dropped and the iteration proceeds. Site configuration is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Configuration { .. } => false,
            Error::MissingReference { .. } => false,
            Error::InvalidConfig(_) => false,
            Error::DataShape { .. } => false,

            Error::MissingFile { .. } => true,
            Error::MissingChannel { .. } => true,
            Error::Decode(_) => true,
            Error::Numeric(_) => true,

            Error::Io(_) => true,
            Error::Json(_) => true,
            Error::Toml(_) => false,
        }
    }

    /// Returns the suggested action for agents.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Configuration { .. } => SuggestedAction::FixConfig,
            Error::MissingReference { .. } => SuggestedAction::FixConfig,
            Error::InvalidConfig(_) => SuggestedAction::FixConfig,
            Error::DataShape { .. } => SuggestedAction::Abort,

            Error::MissingFile { .. } => SuggestedAction::Skip,
            Error::MissingChannel { .. } => SuggestedAction::Skip,
            Error::Decode(_) => SuggestedAction::Skip,
            Error::Numeric(_) => SuggestedAction::Skip,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
            Error::Toml(_) => SuggestedAction::FixConfig,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => {
                "Check the analyzer list and setup keys passed to the site."
            }
            Error::MissingReference { .. } => {
                "Add the reference dataset for this site, or remove the analyzer that requires it."
            }
            Error::InvalidConfig(_) => {
                "Check calibtool.toml syntax and that max_threads is at least 1."
            }
            Error::DataShape { .. } => {
                "The reference table does not have the channels this analyzer expects. Fix the reference data."
            }
            Error::MissingFile { .. } => {
                "The simulation did not produce this report. Check the simulation's output directory."
            }
            Error::MissingChannel { .. } => {
                "Enable the channel in the simulation's report configuration."
            }
            Error::Decode(_) => {
                "The report is truncated or malformed. Re-run or re-download the simulation output."
            }
            Error::Numeric(_) => {
                "Reference and simulation bins do not line up. Check the binning of both tables."
            }
            Error::Io(_) => "Check disk space, permissions, and paths. Retry the operation.",
            Error::Json(_) => "Invalid JSON in file. Check syntax with 'jq .' or restore from backup.",
            Error::Toml(_) => "Invalid TOML in the run configuration. Check its syntax.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "Site Configuration Error",
            Error::MissingReference { .. } => "Missing Reference Data",
            Error::InvalidConfig(_) => "Invalid Run Configuration",
            Error::DataShape { .. } => "Unexpected Data Shape",
            Error::MissingFile { .. } => "Missing Simulation Output",
            Error::MissingChannel { .. } => "Missing Report Channel",
            Error::Decode(_) => "Report Decode Error",
            Error::Numeric(_) => "Numeric Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
            Error::Toml(_) => "TOML Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the iteration could continue.
    pub recoverable: bool,

    /// Suggested action for agents.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (site, simulation, file).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::Configuration { site, analyzer, .. } | Error::DataShape { site, analyzer, .. } => {
                context.insert("site".to_string(), serde_json::json!(site));
                context.insert("analyzer".to_string(), serde_json::json!(analyzer));
            }
            Error::MissingReference {
                site,
                reference_type,
            } => {
                context.insert("site".to_string(), serde_json::json!(site));
                context.insert("reference_type".to_string(), serde_json::json!(reference_type));
            }
            Error::MissingFile { sim_id, filename } => {
                context.insert("sim_id".to_string(), serde_json::json!(sim_id));
                context.insert("filename".to_string(), serde_json::json!(filename));
            }
            Error::MissingChannel { channel, .. } => {
                context.insert("channel".to_string(), serde_json::json!(channel));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Result of a batch operation that may have partial success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult<T> {
    /// Successfully completed items.
    pub succeeded: Vec<T>,

    /// Failed items with their errors.
    pub failed: Vec<BatchError>,

    /// Summary statistics.
    pub summary: BatchSummary,
}

/// A single error in a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Identifier of the failed item.
    pub item_id: String,

    /// The structured error.
    pub error: StructuredError,
}

/// Summary of batch operation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub all_succeeded: bool,
    pub any_succeeded: bool,
}

impl<T> BatchResult<T> {
    /// Create a new batch result from succeeded and failed items.
    pub fn new(succeeded: Vec<T>, failed: Vec<BatchError>) -> Self {
        let succeeded_count = succeeded.len();
        let failed_count = failed.len();

        BatchResult {
            succeeded,
            failed,
            summary: BatchSummary {
                total: succeeded_count + failed_count,
                succeeded: succeeded_count,
                failed: failed_count,
                all_succeeded: failed_count == 0,
                any_succeeded: succeeded_count > 0,
            },
        }
    }

    /// Add a failure to the batch result.
    pub fn add_failure(&mut self, item_id: impl Into<String>, error: &Error) {
        self.failed.push(BatchError {
            item_id: item_id.into(),
            error: StructuredError::from(error),
        });
        self.summary.failed += 1;
        self.summary.total += 1;
        self.summary.all_succeeded = false;
    }

    /// Add a success to the batch result.
    pub fn add_success(&mut self, item: T) {
        self.succeeded.push(item);
        self.summary.succeeded += 1;
        self.summary.total += 1;
        self.summary.any_succeeded = true;
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
