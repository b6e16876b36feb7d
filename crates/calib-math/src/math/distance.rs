//! Distance-based pseudo-likelihoods.
//!
//! Both return the negated distance so that, like the log-likelihood
//! kernels, a larger value means closer agreement.

/// Negative Euclidean distance `-sqrt(Σ (ref_i - sim_i)²)`.
///
/// Returns NaN if the slices differ in length.
pub fn euclidean_distance(reference: &[f64], sim: &[f64]) -> f64 {
    if reference.len() != sim.len() {
        return f64::NAN;
    }
    let sum_sq: f64 = reference
        .iter()
        .zip(sim.iter())
        .map(|(r, s)| (r - s) * (r - s))
        .sum();
    -sum_sq.sqrt()
}

/// Negative reference-weighted distance `-sqrt(Σ (ref_i - sim_i)² / ref_i)`.
///
/// There is no guard on `ref_i == 0`: the caller must not pass zero
/// reference values, which otherwise yield a non-finite score.
///
/// Returns NaN if the slices differ in length.
pub fn weighted_squares(reference: &[f64], sim: &[f64]) -> f64 {
    if reference.len() != sim.len() {
        return f64::NAN;
    }
    let sum: f64 = reference
        .iter()
        .zip(sim.iter())
        .map(|(r, s)| (r - s) * (r - s) / r)
        .sum();
    -sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_identity_is_zero() {
        let x = [1.0, 2.5, -3.0];
        assert_eq!(euclidean_distance(&x, &x), 0.0);
    }

    #[test]
    fn euclidean_three_four_five() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), -5.0);
    }

    #[test]
    fn euclidean_is_symmetric() {
        let a = [1.0, 7.0, 2.0];
        let b = [4.0, 3.0, 9.0];
        assert_eq!(euclidean_distance(&a, &b), euclidean_distance(&b, &a));
    }

    #[test]
    fn weighted_squares_known_value() {
        // (2-4)²/2 + (8-8)²/8 = 2 → -sqrt(2)
        let ws = weighted_squares(&[2.0, 8.0], &[4.0, 8.0]);
        assert!((ws + 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn weighted_squares_zero_reference_is_not_finite() {
        assert!(!weighted_squares(&[0.0], &[1.0]).is_finite());
    }

    #[test]
    fn length_mismatch_is_nan() {
        assert!(euclidean_distance(&[1.0], &[]).is_nan());
        assert!(weighted_squares(&[1.0, 2.0], &[1.0]).is_nan());
    }
}
