//! Per-variable placement of observations onto a time grid.

use crate::grid::TimeGrid;
use crate::series::Series;

/// Bounded-gap forward fill of one variable onto `grid`.
///
/// Every grid timestamp `t` takes the value of the latest observation at or
/// before `t` when `t - offset <= max_gap`, otherwise `normal_value`. An
/// observation exactly on `t` has gap zero and therefore always wins; among
/// observations sharing an offset the last one recorded wins. Observations
/// outside `[grid.start(), grid.end()]` never contribute.
pub fn impute(series: &Series, grid: &TimeGrid, max_gap: i64, normal_value: f64) -> Vec<f64> {
    let observations: Vec<_> = series
        .observations()
        .iter()
        .filter(|obs| grid.contains_offset(obs.offset))
        .collect();

    let mut out = Vec::with_capacity(grid.len());
    let mut next = 0;
    let mut latest = None;

    for t in grid.timestamps() {
        while next < observations.len() && observations[next].offset <= t {
            latest = Some(observations[next]);
            next += 1;
        }
        let value = match latest {
            Some(obs) if t - obs.offset <= max_gap => obs.value,
            _ => normal_value,
        };
        out.push(value);
    }

    out
}

/// As-recorded placement: a cell is set only where an observation falls exactly
/// on its grid timestamp. Later observations at the same offset overwrite
/// earlier ones.
pub fn place_exact(series: &Series, grid: &TimeGrid) -> Vec<Option<f64>> {
    let mut out = vec![None; grid.len()];
    for obs in series.observations() {
        if let Some(idx) = grid.index_of(obs.offset) {
            out[idx] = Some(obs.value);
        }
    }
    out
}
