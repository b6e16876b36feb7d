//! Dirichlet-multinomial comparison of categorical count tables.
//!
//! The reference and the simulation each contribute a table of counts with
//! one row per outer bin (e.g. an age bin or a season/age pair) and one
//! column per category bin (e.g. a parasite-density bin). Per outer bin `b`
//! with `C` categories:
//!
//! ```text
//! LL_b = gammaln(Nref_b + 1) + gammaln(Nsim_b) - gammaln(Nref_b + Nsim_b + C)
//!      + Σ_c [ gammaln(ref_bc + sim_bc + 1) - gammaln(sim_bc + 1) - gammaln(ref_bc + 1) ]
//! ```
//!
//! The total is divided by the number of cells so that reference tables of
//! different granularity produce comparable scores.
//!
//! Two independent forms are provided: [`dirichlet_multinomial`] walks a
//! dense `[bin][category]` grid, while [`dirichlet_multinomial_flat`] takes a
//! long-form table (one row per cell, tagged with its outer-bin group) and
//! accumulates the terms column-wise. On a complete grid they agree.

use std::collections::{BTreeMap, BTreeSet};

use super::stable::gammaln;

/// Dirichlet-multinomial log-likelihood over a dense `[bin][category]` grid.
///
/// Returns NaN if the grids are empty, ragged, or of different shapes.
pub fn dirichlet_multinomial(reference: &[Vec<f64>], sim: &[Vec<f64>]) -> f64 {
    let num_bins = reference.len();
    if num_bins == 0 || sim.len() != num_bins {
        return f64::NAN;
    }
    let num_categories = reference[0].len();
    if num_categories == 0 {
        return f64::NAN;
    }
    if reference
        .iter()
        .chain(sim.iter())
        .any(|row| row.len() != num_categories)
    {
        return f64::NAN;
    }

    let c = num_categories as f64;
    let mut ll = 0.0;
    for (ref_row, sim_row) in reference.iter().zip(sim.iter()) {
        let ref_total: f64 = ref_row.iter().sum();
        let sim_total: f64 = sim_row.iter().sum();

        ll += gammaln(ref_total + 1.0);
        ll += gammaln(sim_total);
        ll -= gammaln(ref_total + sim_total + c);
        for (&r, &s) in ref_row.iter().zip(sim_row.iter()) {
            ll += gammaln(r + s + 1.0);
            ll -= gammaln(s + 1.0);
            ll -= gammaln(r + 1.0);
        }
    }

    ll / (num_bins * num_categories) as f64
}

/// Dirichlet-multinomial log-likelihood over a long-form table.
///
/// `groups[i]` identifies the outer bin of row `i` and `categories[i]` its
/// category bin; `C` is the number of distinct categories across all rows.
/// The result is divided by the number of rows.
///
/// Returns NaN if the slices are empty or of different lengths.
pub fn dirichlet_multinomial_flat<G, K>(
    groups: &[G],
    categories: &[K],
    reference: &[f64],
    sim: &[f64],
) -> f64
where
    G: Ord,
    K: Ord,
{
    let n = reference.len();
    if n == 0 || sim.len() != n || groups.len() != n || categories.len() != n {
        return f64::NAN;
    }

    let num_categories = categories.iter().collect::<BTreeSet<_>>().len() as f64;

    let mut totals: BTreeMap<&G, (f64, f64)> = BTreeMap::new();
    for ((g, &r), &s) in groups.iter().zip(reference.iter()).zip(sim.iter()) {
        let entry = totals.entry(g).or_insert((0.0, 0.0));
        entry.0 += r;
        entry.1 += s;
    }

    let ref_totals: f64 = totals.values().map(|&(r, _)| gammaln(r + 1.0)).sum();
    let sim_totals: f64 = totals.values().map(|&(_, s)| gammaln(s)).sum();
    let joint_totals: f64 = totals
        .values()
        .map(|&(r, s)| gammaln(r + s + num_categories))
        .sum();

    let joint_cells: f64 = reference
        .iter()
        .zip(sim.iter())
        .map(|(&r, &s)| gammaln(r + s + 1.0))
        .sum();
    let ref_cells: f64 = reference.iter().map(|&r| gammaln(r + 1.0)).sum();
    let sim_cells: f64 = sim.iter().map(|&s| gammaln(s + 1.0)).sum();

    let ll = ref_totals + sim_totals - joint_totals + joint_cells - ref_cells - sim_cells;
    ll / n as f64
}

/// Dirichlet-multinomial log-likelihood for a single outer bin.
///
/// Differs from the gridded form in its simulation-total term,
/// `gammaln(Nsim + C)`, and is divided by the number of categories.
pub fn dirichlet_single(reference: &[f64], sim: &[f64]) -> f64 {
    let num_categories = reference.len();
    if num_categories == 0 || sim.len() != num_categories {
        return f64::NAN;
    }

    let c = num_categories as f64;
    let ref_total: f64 = reference.iter().sum();
    let sim_total: f64 = sim.iter().sum();

    let mut ll = gammaln(ref_total + 1.0) + gammaln(sim_total + c)
        - gammaln(ref_total + sim_total + c);
    for (&r, &s) in reference.iter().zip(sim.iter()) {
        ll += gammaln(r + s + 1.0) - gammaln(s + 1.0) - gammaln(r + 1.0);
    }
    ll / c
}
