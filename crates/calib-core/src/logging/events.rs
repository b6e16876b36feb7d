//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! All events carry the run id, the calibration iteration and the lifecycle stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use calib_common::AnalyzerId;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of one calibration iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Site construction and analyzer binding.
    Setup,
    /// Per-simulation observation extraction.
    Apply,
    /// Replicate averaging per sample.
    Combine,
    /// Likelihood scoring per sample.
    Compare,
    /// Result series assembly.
    Finalize,
    /// Visualization cache export.
    Cache,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Setup => "setup",
            Stage::Apply => "apply",
            Stage::Combine => "combine",
            Stage::Compare => "compare",
            Stage::Finalize => "finalize",
            Stage::Cache => "cache",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Setup
    pub const SITE_READY: &str = "site.ready";
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Apply
    pub const APPLY_STARTED: &str = "apply.started";
    pub const APPLY_FAILED: &str = "apply.failed";
    pub const APPLY_FINISHED: &str = "apply.finished";

    // Combine / finalize
    pub const COMBINE_FINISHED: &str = "combine.finished";
    pub const FINALIZE_DEGENERATE: &str = "finalize.degenerate";
    pub const FINALIZE_FINISHED: &str = "finalize.finished";

    // Cache
    pub const CACHE_WRITTEN: &str = "cache.written";
}

/// A structured log event for JSONL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,

    pub level: Level,

    /// Event name (e.g., "run.started", "apply.failed").
    pub event: String,

    /// Unique ID for this process invocation.
    pub run_id: String,

    /// Calibration iteration, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,

    pub stage: Stage,

    pub message: String,

    /// Site the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Analyzer the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,

    /// Additional structured fields (stable keys).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,
}

impl LogEvent {
    /// Create a new log event with required fields.
    pub fn new(
        level: Level,
        event: impl Into<String>,
        run_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: run_id.into(),
            iteration: None,
            stage,
            message: message.into(),
            site: None,
            analyzer: None,
            fields: HashMap::new(),
        }
    }

    /// Attach the analyzer the event concerns.
    pub fn with_analyzer(mut self, id: &AnalyzerId) -> Self {
        self.site = Some(id.site.clone());
        self.analyzer = Some(id.analyzer.clone());
        self
    }

    /// Add a field to the event.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Context for generating log events with a consistent run id and iteration.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub iteration: Option<u32>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            iteration: None,
        }
    }

    /// Set the calibration iteration.
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Create an event with this context.
    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        let mut e = LogEvent::new(level, event, &self.run_id, stage, message);
        e.iteration = self.iteration;
        e
    }

    /// Shortcut for info-level event.
    pub fn info(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Info, event, stage, message)
    }

    /// Shortcut for warn-level event.
    pub fn warn(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Warn, event, stage, message)
    }
}
