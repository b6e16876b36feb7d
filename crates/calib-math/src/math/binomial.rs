//! Beta-binomial comparison of binned success/trial counts.
//!
//! Each bin carries `n` trials (e.g. person-years or individuals sampled) and
//! `k` successes (e.g. incidents or positives) for both the reference and the
//! simulation. The per-bin term is the log marginal likelihood that both
//! samples share one success probability under a uniform Beta prior:
//!
//! ```text
//! LL = gammaln(n_ref + 1) + gammaln(n_sim + 2) - gammaln(n_ref + n_sim + 2)
//!    + gammaln(k_ref + k_sim + 1) + gammaln((n_ref - k_ref) + (n_sim - k_sim) + 1)
//!    - gammaln(k_ref + 1) - gammaln(n_ref - k_ref + 1)
//!    - gammaln(k_sim + 1) - gammaln(n_sim - k_sim + 1)
//! ```
//!
//! Bins with zero trials still contribute through the `+1`/`+2` terms; they
//! are never skipped.

use super::stable::gammaln;

/// Beta-binomial log-likelihood averaged over bins.
///
/// # Arguments
/// * `ref_trials`, `sim_trials` - trials per bin
/// * `ref_counts`, `sim_counts` - successes per bin
///
/// Returns NaN if the slices are empty or differ in length.
pub fn beta_binomial(
    ref_trials: &[f64],
    sim_trials: &[f64],
    ref_counts: &[f64],
    sim_counts: &[f64],
) -> f64 {
    let num_bins = ref_counts.len();
    if num_bins == 0
        || ref_trials.len() != num_bins
        || sim_trials.len() != num_bins
        || sim_counts.len() != num_bins
    {
        return f64::NAN;
    }

    let mut ll = 0.0;
    for i in 0..num_bins {
        let (n_ref, n_sim) = (ref_trials[i], sim_trials[i]);
        let (k_ref, k_sim) = (ref_counts[i], sim_counts[i]);

        ll += gammaln(n_ref + 1.0);
        ll += gammaln(n_sim + 2.0);
        ll -= gammaln(n_ref + n_sim + 2.0);
        ll += gammaln(k_ref + k_sim + 1.0);
        ll += gammaln(n_ref - k_ref + n_sim - k_sim + 1.0);
        ll -= gammaln(k_ref + 1.0);
        ll -= gammaln(n_ref - k_ref + 1.0);
        ll -= gammaln(k_sim + 1.0);
        ll -= gammaln(n_sim - k_sim + 1.0);
    }

    ll / num_bins as f64
}
