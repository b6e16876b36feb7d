//! Named likelihood models so analyzers can be wired to a kernel by value.

use serde::{Deserialize, Serialize};

use super::binomial::beta_binomial;
use super::distance::{euclidean_distance, weighted_squares};
use super::gamma::gamma_poisson;

/// Kernels over paired (trials, counts) columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountModel {
    /// Successes out of trials (e.g. positives among sampled individuals).
    BetaBinomial,
    /// Events against exposure (e.g. incidents per person-year).
    GammaPoisson,
}

impl CountModel {
    /// Score reference against simulation.
    pub fn score(
        self,
        ref_trials: &[f64],
        sim_trials: &[f64],
        ref_counts: &[f64],
        sim_counts: &[f64],
    ) -> f64 {
        match self {
            CountModel::BetaBinomial => beta_binomial(ref_trials, sim_trials, ref_counts, sim_counts),
            CountModel::GammaPoisson => gamma_poisson(ref_trials, sim_trials, ref_counts, sim_counts),
        }
    }
}

impl std::fmt::Display for CountModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountModel::BetaBinomial => write!(f, "beta_binomial"),
            CountModel::GammaPoisson => write!(f, "gamma_poisson"),
        }
    }
}

/// Kernels over a single value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    #[default]
    Euclidean,
    /// Requires every reference value to be non-zero.
    WeightedSquares,
}

impl DistanceModel {
    /// Score reference against simulation.
    pub fn score(self, reference: &[f64], sim: &[f64]) -> f64 {
        match self {
            DistanceModel::Euclidean => euclidean_distance(reference, sim),
            DistanceModel::WeightedSquares => weighted_squares(reference, sim),
        }
    }
}

impl std::fmt::Display for DistanceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceModel::Euclidean => write!(f, "euclidean_distance"),
            DistanceModel::WeightedSquares => write!(f, "weighted_squares"),
        }
    }
}
