//! Data types used by the excess-mortality pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One (jurisdiction, age-group, epidemiological week) observation from the
/// weekly death-count dataset. Never mutated after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekRecord {
    pub jurisdiction: String,
    pub age_group: String,
    pub year: i32,
    /// MMWR week-of-year ordinal, 1-53.
    pub week: u32,
    pub week_ending: NaiveDate,
    /// Death count; absent when the source withheld the cell.
    pub deaths: Option<f64>,
    /// True when the source suppressed this row for having a low count.
    pub suppressed: bool,
}

/// A weekly observation from the pre-baselined excess-deaths dataset, where
/// the source already publishes the expected count and the upper bound of
/// its 95% prediction interval alongside the observation.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselinedRecord {
    pub jurisdiction: String,
    pub week_ending: NaiveDate,
    /// Observed deaths; absent for recent weeks too incomplete to adjust.
    pub observed: Option<f64>,
    /// Average expected count (central expectation).
    pub expected: f64,
    /// Upper bound of the 95% prediction interval.
    pub upper_bound: f64,
}

/// Per-jurisdiction COVID death counts for one age bracket, input to the
/// mean-age-of-death computation.
#[derive(Debug, Clone, PartialEq)]
pub struct CovidDeathRow {
    pub jurisdiction: String,
    pub age_group: String,
    /// Absent when the cell was suppressed (counts of 1-9).
    pub deaths: Option<f64>,
}

/// Terminal output unit of the stratified mode: cumulative totals and the
/// per-million excess rate for one jurisdiction and age group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeGroupResult {
    pub jurisdiction: String,
    pub age_group: String,
    pub observed: f64,
    pub expected: f64,
    /// Excess deaths per million people, optionally age-adjusted.
    pub per_million: f64,
}

impl AgeGroupResult {
    pub fn excess(&self) -> f64 {
        self.observed - self.expected
    }
}

/// Result of a full stratified pass: per age-group rankings plus the set of
/// (jurisdiction, age-group) pairs excluded by the noise threshold.
///
/// Exclusion is a designed output state, not a failure; callers render
/// excluded pairs as "insufficient data" rather than omitting them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StratifiedReport {
    /// Age-group label to results, sorted ascending by per-million rate.
    pub groups: BTreeMap<String, Vec<AgeGroupResult>>,
    pub excluded: BTreeSet<(String, String)>,
}

impl StratifiedReport {
    /// Looks up the result for one jurisdiction within an age group.
    pub fn entry(&self, age_group: &str, jurisdiction: &str) -> Option<&AgeGroupResult> {
        self.groups
            .get(age_group)?
            .iter()
            .find(|e| e.jurisdiction == jurisdiction)
    }
}

/// One entry of the whole-population ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionRate {
    pub jurisdiction: String,
    pub per_million: f64,
}
