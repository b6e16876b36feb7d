//! Gamma-Poisson comparison of binned event counts against exposure.
//!
//! Each bin carries an exposure `n` (e.g. person-years) and an event count
//! `k` (e.g. clinical incidents) for both reference and simulation. The
//! per-bin term is the log marginal likelihood that both counts share one
//! Poisson rate under a flat Gamma prior:
//!
//! ```text
//! LL = (k_ref + 1)·ln(n_ref)            if n_ref > 0
//!    + (k_sim + 1)·ln(n_sim)            if n_sim > 0
//!    - (k_ref + k_sim + 1)·ln(n_ref + n_sim)   if n_ref + n_sim > 0
//!    + gammaln(k_ref + k_sim + 1) - gammaln(k_ref + 1) - gammaln(k_sim + 1)
//! ```
//!
//! Log terms with a zero exposure are skipped rather than smoothed. This is
//! deliberately not aligned with the smoothing used by the beta-binomial and
//! Dirichlet-multinomial kernels.

use super::stable::gammaln;

/// Gamma-Poisson log-likelihood averaged over bins.
///
/// # Arguments
/// * `ref_trials`, `sim_trials` - exposure per bin
/// * `ref_counts`, `sim_counts` - event count per bin
///
/// Returns 0 when there are no bins and NaN when the slices differ in length.
pub fn gamma_poisson(
    ref_trials: &[f64],
    sim_trials: &[f64],
    ref_counts: &[f64],
    sim_counts: &[f64],
) -> f64 {
    let num_bins = ref_counts.len();
    if ref_trials.len() != num_bins || sim_trials.len() != num_bins || sim_counts.len() != num_bins
    {
        return f64::NAN;
    }

    let mut ll = 0.0;
    for i in 0..num_bins {
        let (n_ref, n_sim) = (ref_trials[i], sim_trials[i]);
        let (k_ref, k_sim) = (ref_counts[i], sim_counts[i]);

        if n_ref > 0.0 {
            ll += (k_ref + 1.0) * n_ref.ln();
        }
        if n_sim > 0.0 {
            ll += (k_sim + 1.0) * n_sim.ln();
        }
        if n_ref + n_sim > 0.0 {
            ll -= (k_ref + k_sim + 1.0) * (n_ref + n_sim).ln();
        }
        ll += gammaln(k_ref + k_sim + 1.0);
        ll -= gammaln(k_ref + 1.0);
        ll -= gammaln(k_sim + 1.0);
    }

    if num_bins != 0 {
        ll /= num_bins as f64;
    }
    ll
}
