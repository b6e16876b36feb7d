//! Likelihood kernels for comparing simulated and reference tables.
//!
//! Every kernel is a pure function of the reference and simulated values and
//! is normalized by the number of bins, so scores from reference tables of
//! different granularity are comparable. Larger is better.

pub mod math;

pub use math::binomial::beta_binomial;
pub use math::dirichlet::{dirichlet_multinomial, dirichlet_multinomial_flat, dirichlet_single};
pub use math::distance::{euclidean_distance, weighted_squares};
pub use math::gamma::gamma_poisson;
pub use math::model::{CountModel, DistanceModel};
pub use math::stable::{gammaln, log_gamma};
