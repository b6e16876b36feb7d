//! calibtool common types, IDs, and errors.
//!
//! This crate provides foundational types shared by the calibration core:
//! - Analyzer, sample and simulation identity types
//! - The error taxonomy with stable codes
//! - Run configuration loading and validation

pub mod config;
pub mod error;
pub mod id;

pub use config::{CacheSettings, Config, ConfigPaths, ConfigResolver, ConfigSnapshot, RunConfig};
pub use error::{BatchError, BatchResult, Error, ErrorCategory, Result, StructuredError};
pub use id::{AnalyzerId, SampleIndex, SimId};
