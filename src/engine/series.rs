//! Suppression resolution for historical series.
//!
//! The source does not publish rows for weeks with very few deaths, so a
//! jurisdiction/age-group's history may be missing entire years. Excluding
//! those years would bias the historical mean and trend, so missing years
//! are assigned a known small constant instead.

use std::collections::HashMap;
use std::ops::Range;

/// Completes a partial (year, value) series over `years`.
///
/// Input pairs may arrive in any order; pairs outside `years` are dropped.
/// The output has exactly one value per year of the range, ascending, with
/// absent years assigned `fill_value`. Resolving an already-complete series
/// returns it unchanged.
pub fn resolve(pairs: &[(i32, f64)], years: Range<i32>, fill_value: f64) -> Vec<(i32, f64)> {
    let by_year: HashMap<i32, f64> = pairs
        .iter()
        .filter(|(y, _)| years.contains(y))
        .map(|&(y, v)| (y, v))
        .collect();

    years
        .map(|y| (y, by_year.get(&y).copied().unwrap_or(fill_value)))
        .collect()
}
