//! The excess-mortality aggregation pass.
//!
//! Drives the per-jurisdiction, per-age-group computation across the full
//! post-pandemic-start week range: observed totals with suppression
//! imputation, expected totals via the baseline estimator over resolved
//! history, noise-threshold exclusion, split-unit reconciliation, and final
//! per-million (optionally age-adjusted) rates.
//!
//! Iteration order is sorted by jurisdiction then age group, so repeated
//! runs with identical inputs sum floats in the same order and produce
//! bit-identical output.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::calendar::WeekIndex;
use crate::config::EngineConfig;
use crate::engine::baseline::BaselineDefinition;
use crate::engine::reconcile;
use crate::engine::series;
use crate::engine::types::{BaselinedRecord, JurisdictionRate, StratifiedReport, WeekRecord};
use crate::error::EngineError;
use crate::population::{ALL_AGES, PopulationRegistry};

/// Runs the stratified (per age group) analysis over every jurisdiction in
/// `records`.
///
/// A jurisdiction/age-group with no population entry is skipped with a
/// warning; an empty history window aborts the run. The returned report is
/// owned by the caller and carries no engine state, so the pass can be
/// re-run idempotently.
pub fn stratified_excess(
    records: &[WeekRecord],
    calendar: &WeekIndex,
    population: &PopulationRegistry,
    mean_death_ages: &BTreeMap<String, f64>,
    cfg: &EngineConfig,
) -> Result<StratifiedReport> {
    let (start_year, start_week) = cfg.pandemic_start;
    let start_idx = calendar
        .position(start_year, start_week)
        .context("pandemic start week missing from calendar")?;

    let mut by_jurisdiction: BTreeMap<&str, BTreeMap<&str, Vec<&WeekRecord>>> = BTreeMap::new();
    for record in records {
        by_jurisdiction
            .entry(record.jurisdiction.as_str())
            .or_default()
            .entry(record.age_group.as_str())
            .or_default()
            .push(record);
    }

    let mut report = StratifiedReport::default();

    for (&jurisdiction, groups) in &by_jurisdiction {
        let canonical = cfg.split.canonical(jurisdiction);
        let mut total_observed = 0.0;
        let mut total_expected = 0.0;

        for (&age_group, rows) in groups {
            let (observed, expected) = window_totals(rows, calendar, start_idx, cfg)
                .with_context(|| format!("baseline for {jurisdiction} / {age_group}"))?;

            // Excluded groups still count toward the jurisdiction total.
            total_observed += observed;
            total_expected += expected;

            if (observed - expected).abs() < cfg.noise_threshold {
                info!(
                    jurisdiction,
                    age_group,
                    excess = observed - expected,
                    "too few deaths to trust, reporting as insufficient data"
                );
                report
                    .excluded
                    .insert((canonical.to_string(), age_group.to_string()));
                continue;
            }

            match population.population(canonical, age_group) {
                Ok(pop) => {
                    let entries = report.groups.entry(age_group.to_string()).or_default();
                    reconcile::fold_entry(
                        &cfg.split, entries, jurisdiction, age_group, observed, expected, pop,
                    );
                }
                Err(e) => warn!(jurisdiction, age_group, error = %e, "skipping"),
            }
        }

        // The all-ages aggregate is always emitted, even when individual
        // age groups fell under the noise threshold.
        match population.population(canonical, ALL_AGES) {
            Ok(pop) => {
                let entries = report.groups.entry(ALL_AGES.to_string()).or_default();
                reconcile::fold_entry(
                    &cfg.split,
                    entries,
                    jurisdiction,
                    ALL_AGES,
                    total_observed,
                    total_expected,
                    pop,
                );
            }
            Err(e) => warn!(jurisdiction, error = %e, "skipping all-ages total"),
        }
    }

    for entries in report.groups.values_mut() {
        if cfg.age_adjustment.enabled {
            for entry in entries.iter_mut() {
                match mean_death_ages.get(&entry.jurisdiction) {
                    Some(&age) => {
                        entry.per_million = cfg.age_adjustment.adjust(entry.per_million, age);
                    }
                    None => warn!(
                        jurisdiction = %entry.jurisdiction,
                        "no mean death age known, rate left unadjusted"
                    ),
                }
            }
        }
        entries.sort_by(|a, b| {
            a.per_million
                .total_cmp(&b.per_million)
                .then_with(|| a.jurisdiction.cmp(&b.jurisdiction))
        });
    }

    Ok(report)
}

/// Sums observed and expected counts over the evaluation window for one
/// jurisdiction/age-group's rows.
fn window_totals(
    rows: &[&WeekRecord],
    calendar: &WeekIndex,
    start_idx: usize,
    cfg: &EngineConfig,
) -> Result<(f64, f64), EngineError> {
    let mut total_observed = 0.0;
    let mut total_expected = 0.0;

    for &(year, week) in &calendar.weeks()[start_idx..] {
        let observed = rows
            .iter()
            .find(|r| r.year == year && r.week == week && !r.suppressed)
            .and_then(|r| r.deaths)
            .unwrap_or(cfg.suppressed_fill);
        let expected = expected_for(rows, year, week, cfg)?;

        total_observed += observed;
        total_expected += expected;
    }

    Ok((total_observed, total_expected))
}

/// Expected deaths for one week, estimated from the resolved pre-pandemic
/// history of its week-of-year.
fn expected_for(
    rows: &[&WeekRecord],
    target_year: i32,
    week: u32,
    cfg: &EngineConfig,
) -> Result<f64, EngineError> {
    // Not all years have MMWR week 53, so week 53 is always estimated from
    // week-52 history.
    let week = week.min(52);
    let (start_year, start_week) = cfg.pandemic_start;

    let history: Vec<(i32, f64)> = rows
        .iter()
        .filter(|r| r.week == week && !r.suppressed)
        .filter(|r| r.year < start_year || (r.year == start_year && r.week < start_week))
        .filter_map(|r| r.deaths.map(|d| (r.year, d)))
        .collect();

    let series = series::resolve(&history, cfg.history_years(), cfg.suppressed_fill);
    Ok(cfg.baseline_method.estimate(&series, target_year)?.expected)
}

/// Whole-population mode: cumulative excess per jurisdiction from records
/// whose baseline the source already published.
///
/// Weeks before the configured start date, and weeks whose observation is
/// still too incomplete to adjust, are skipped. With the upper-bound
/// baseline only positive-excess weeks count (the bound is a one-sided
/// threshold); with the central expectation negative weeks legitimately
/// offset positive ones. Returns (jurisdiction, per-million) entries sorted
/// ascending by rate.
pub fn cumulative_excess(
    records: &[BaselinedRecord],
    population: &PopulationRegistry,
    cfg: &EngineConfig,
) -> Result<Vec<JurisdictionRate>> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();

    for record in records {
        if record.week_ending < cfg.start_date {
            continue;
        }
        let Some(observed) = record.observed else {
            continue;
        };
        let baseline = match cfg.baseline_definition {
            BaselineDefinition::CentralExpectation => record.expected,
            BaselineDefinition::UpperBound => record.upper_bound,
        };
        let excess = observed - baseline;
        if cfg.baseline_definition == BaselineDefinition::UpperBound && excess <= 0.0 {
            continue;
        }
        *totals
            .entry(cfg.split.canonical(&record.jurisdiction))
            .or_insert(0.0) += excess;
    }

    let mut rates = Vec::new();
    for (jurisdiction, excess) in totals {
        match population.population(jurisdiction, ALL_AGES) {
            Ok(pop) => rates.push(JurisdictionRate {
                jurisdiction: jurisdiction.to_string(),
                per_million: excess / pop as f64 * 1_000_000.0,
            }),
            Err(e) => warn!(jurisdiction, error = %e, "skipping"),
        }
    }

    rates.sort_by(|a, b| {
        a.per_million
            .total_cmp(&b.per_million)
            .then_with(|| a.jurisdiction.cmp(&b.jurisdiction))
    });
    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::baseline::BaselineMethod;
    use chrono::NaiveDate;

    fn date(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 6, 1).unwrap()
    }

    fn rec(jurisdiction: &str, age_group: &str, year: i32, week: u32, deaths: f64) -> WeekRecord {
        WeekRecord {
            jurisdiction: jurisdiction.to_string(),
            age_group: age_group.to_string(),
            year,
            week,
            week_ending: date(year),
            deaths: Some(deaths),
            suppressed: false,
        }
    }

    /// 2018-2019 history, pandemic starting (2020, 2), two-week window.
    fn test_config() -> EngineConfig {
        EngineConfig {
            baseline_method: BaselineMethod::Average,
            pandemic_start: (2020, 2),
            history_start_year: 2018,
            noise_threshold: 10.0,
            ..EngineConfig::default()
        }
    }

    fn test_calendar() -> WeekIndex {
        let mut rows = Vec::new();
        for year in [2018, 2019, 2020] {
            for week in 1..=3 {
                rows.push(rec("United States", "85 years and older", year, week, 1.0));
            }
        }
        WeekIndex::from_records(&rows).unwrap()
    }

    /// History at 100/week for weeks 1-3, 2018 and 2019.
    fn history_rows(jurisdiction: &str, age_group: &str) -> Vec<WeekRecord> {
        let mut rows = Vec::new();
        for year in [2018, 2019] {
            for week in 1..=3 {
                rows.push(rec(jurisdiction, age_group, year, week, 100.0));
            }
        }
        rows
    }

    fn registry(jurisdiction: &str, age_group: &str, count: u64) -> PopulationRegistry {
        let mut reg = PopulationRegistry::default();
        reg.insert_override(
            jurisdiction,
            &[
                (age_group.to_string(), count),
                (ALL_AGES.to_string(), count),
            ],
        );
        reg
    }

    #[test]
    fn test_per_million_rate() {
        // Window (2020, 2)..(2020, 3): expected 100/week, observed 350/week,
        // excess 500 over a population of one million.
        let mut records = history_rows("Vermont", "25-44 years");
        records.push(rec("Vermont", "25-44 years", 2020, 2, 350.0));
        records.push(rec("Vermont", "25-44 years", 2020, 3, 350.0));

        let report = stratified_excess(
            &records,
            &test_calendar(),
            &registry("Vermont", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &test_config(),
        )
        .unwrap();

        let entry = report.entry("25-44 years", "Vermont").unwrap();
        assert_eq!(entry.observed, 700.0);
        assert_eq!(entry.expected, 200.0);
        assert_eq!(entry.per_million, 500.0);
        // The all-ages aggregate mirrors the single group.
        assert_eq!(report.entry(ALL_AGES, "Vermont").unwrap().per_million, 500.0);
    }

    #[test]
    fn test_missing_weeks_imputed_with_fill() {
        // No pandemic rows at all: every window week is imputed at 5.0, and
        // |10 - 200| clears the threshold as a large negative excess.
        let records = history_rows("Vermont", "25-44 years");
        let report = stratified_excess(
            &records,
            &test_calendar(),
            &registry("Vermont", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &test_config(),
        )
        .unwrap();

        let entry = report.entry("25-44 years", "Vermont").unwrap();
        assert_eq!(entry.observed, 10.0);
        assert_eq!(entry.expected, 200.0);
    }

    #[test]
    fn test_zero_excess_excluded_but_in_all_ages() {
        // observed == expected exactly: |0| < threshold excludes the group
        // from stratified output, but its totals still reach "all".
        let mut records = history_rows("Vermont", "25-44 years");
        records.push(rec("Vermont", "25-44 years", 2020, 2, 100.0));
        records.push(rec("Vermont", "25-44 years", 2020, 3, 100.0));
        // A second group with real excess keeps the jurisdiction in output.
        records.extend(history_rows("Vermont", "45-64 years"));
        records.push(rec("Vermont", "45-64 years", 2020, 2, 200.0));
        records.push(rec("Vermont", "45-64 years", 2020, 3, 200.0));

        let mut reg = registry("Vermont", "25-44 years", 1_000_000);
        reg.insert_override("Vermont", &[("45-64 years".to_string(), 1_000_000)]);

        let report = stratified_excess(
            &records,
            &test_calendar(),
            &reg,
            &BTreeMap::new(),
            &test_config(),
        )
        .unwrap();

        assert!(report.entry("25-44 years", "Vermont").is_none());
        assert!(
            report
                .excluded
                .contains(&("Vermont".to_string(), "25-44 years".to_string()))
        );
        // all = (200 + 400) observed vs (200 + 200) expected.
        let all = report.entry(ALL_AGES, "Vermont").unwrap();
        assert_eq!(all.observed, 600.0);
        assert_eq!(all.expected, 400.0);
    }

    #[test]
    fn test_small_excess_included_in_all_ages_total() {
        // Excess of 5 with threshold 10: excluded from the group ranking,
        // still summed into the jurisdiction total.
        let mut records = history_rows("Vermont", "25-44 years");
        records.push(rec("Vermont", "25-44 years", 2020, 2, 100.0));
        records.push(rec("Vermont", "25-44 years", 2020, 3, 105.0));

        let report = stratified_excess(
            &records,
            &test_calendar(),
            &registry("Vermont", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &test_config(),
        )
        .unwrap();

        assert!(report.entry("25-44 years", "Vermont").is_none());
        let all = report.entry(ALL_AGES, "Vermont").unwrap();
        assert_eq!(all.observed, 205.0);
        assert_eq!(all.expected, 200.0);
    }

    #[test]
    fn test_split_jurisdiction_merged() {
        let mut records = Vec::new();
        for name in ["New York", "New York City"] {
            records.extend(history_rows(name, "25-44 years"));
            records.push(rec(name, "25-44 years", 2020, 2, 300.0));
            records.push(rec(name, "25-44 years", 2020, 3, 300.0));
        }

        let report = stratified_excess(
            &records,
            &test_calendar(),
            &registry("New York", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &test_config(),
        )
        .unwrap();

        let entries = &report.groups["25-44 years"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].jurisdiction, "New York");
        assert_eq!(entries[0].observed, 1200.0);
        assert_eq!(entries[0].expected, 400.0);
    }

    #[test]
    fn test_missing_population_skips_jurisdiction_only() {
        let mut records = history_rows("Vermont", "25-44 years");
        records.push(rec("Vermont", "25-44 years", 2020, 2, 350.0));
        records.extend(history_rows("Atlantis", "25-44 years"));
        records.push(rec("Atlantis", "25-44 years", 2020, 2, 350.0));

        let report = stratified_excess(
            &records,
            &test_calendar(),
            &registry("Vermont", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &test_config(),
        )
        .unwrap();

        assert!(report.entry("25-44 years", "Vermont").is_some());
        assert!(report.entry("25-44 years", "Atlantis").is_none());
    }

    #[test]
    fn test_age_adjustment_applied() {
        let mut records = history_rows("Vermont", "25-44 years");
        records.push(rec("Vermont", "25-44 years", 2020, 2, 350.0));
        records.push(rec("Vermont", "25-44 years", 2020, 3, 350.0));

        let mut cfg = test_config();
        cfg.age_adjustment.enabled = true;
        let ages = BTreeMap::from([("Vermont".to_string(), 70.0)]);

        let report = stratified_excess(
            &records,
            &test_calendar(),
            &registry("Vermont", "25-44 years", 1_000_000),
            &ages,
            &cfg,
        )
        .unwrap();

        let entry = report.entry("25-44 years", "Vermont").unwrap();
        let factor = 1.115f64.powf(4.0);
        assert!((entry.per_million - 500.0 * factor).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history_window_aborts() {
        let mut cfg = test_config();
        cfg.history_start_year = 2020; // empty window

        let mut records = history_rows("Vermont", "25-44 years");
        records.push(rec("Vermont", "25-44 years", 2020, 2, 350.0));

        let result = stratified_excess(
            &records,
            &test_calendar(),
            &registry("Vermont", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &cfg,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_week_53_uses_week_52_history() {
        let mut rows = Vec::new();
        for year in [2018, 2019] {
            rows.push(rec("United States", "85 years and older", year, 52, 1.0));
        }
        rows.push(rec("United States", "85 years and older", 2020, 52, 1.0));
        rows.push(rec("United States", "85 years and older", 2020, 53, 1.0));
        let calendar = WeekIndex::from_records(&rows).unwrap();

        let mut cfg = test_config();
        cfg.pandemic_start = (2020, 52);

        let mut records = Vec::new();
        for year in [2018, 2019] {
            records.push(rec("Vermont", "25-44 years", year, 52, 100.0));
        }
        records.push(rec("Vermont", "25-44 years", 2020, 52, 200.0));
        records.push(rec("Vermont", "25-44 years", 2020, 53, 200.0));

        let report = stratified_excess(
            &records,
            &calendar,
            &registry("Vermont", "25-44 years", 1_000_000),
            &BTreeMap::new(),
            &cfg,
        )
        .unwrap();

        // Week 53 is expected from week-52 history (100), not from an empty
        // week-53 series imputed at the fill value.
        let entry = report.entry("25-44 years", "Vermont").unwrap();
        assert_eq!(entry.expected, 200.0);
        assert_eq!(entry.observed, 400.0);
    }

    fn baselined(
        jurisdiction: &str,
        week_ending: NaiveDate,
        observed: Option<f64>,
        expected: f64,
        upper: f64,
    ) -> BaselinedRecord {
        BaselinedRecord {
            jurisdiction: jurisdiction.to_string(),
            week_ending,
            observed,
            expected,
            upper_bound: upper,
        }
    }

    #[test]
    fn test_cumulative_excess_central_keeps_negative_weeks() {
        let start = NaiveDate::from_ymd_opt(2020, 4, 26).unwrap();
        let records = vec![
            baselined("Vermont", start, Some(150.0), 100.0, 120.0),
            baselined("Vermont", start + chrono::Days::new(7), Some(80.0), 100.0, 120.0),
            // Pre-window and unreported weeks are skipped.
            baselined("Vermont", start - chrono::Days::new(7), Some(999.0), 100.0, 120.0),
            baselined("Vermont", start + chrono::Days::new(14), None, 100.0, 120.0),
        ];
        let reg = registry("Vermont", ALL_AGES, 1_000_000);

        let rates = cumulative_excess(&records, &reg, &EngineConfig::default()).unwrap();
        assert_eq!(rates.len(), 1);
        // (150-100) + (80-100) = 30
        assert_eq!(rates[0].per_million, 30.0);
    }

    #[test]
    fn test_cumulative_excess_upper_bound_drops_negative_weeks() {
        let start = NaiveDate::from_ymd_opt(2020, 4, 26).unwrap();
        let records = vec![
            baselined("Vermont", start, Some(150.0), 100.0, 120.0),
            baselined("Vermont", start + chrono::Days::new(7), Some(80.0), 100.0, 120.0),
        ];
        let reg = registry("Vermont", ALL_AGES, 1_000_000);

        let cfg = EngineConfig {
            baseline_definition: BaselineDefinition::UpperBound,
            ..EngineConfig::default()
        };
        let rates = cumulative_excess(&records, &reg, &cfg).unwrap();
        // Only 150 - 120 = 30 counts; the under-bound week carries nothing.
        assert_eq!(rates[0].per_million, 30.0);
    }

    #[test]
    fn test_cumulative_excess_sorted_ascending() {
        let start = NaiveDate::from_ymd_opt(2020, 4, 26).unwrap();
        let records = vec![
            baselined("Vermont", start, Some(200.0), 100.0, 120.0),
            baselined("Maine", start, Some(150.0), 100.0, 120.0),
        ];
        let mut reg = registry("Vermont", ALL_AGES, 1_000_000);
        reg.insert_override("Maine", &[(ALL_AGES.to_string(), 1_000_000)]);

        let rates = cumulative_excess(&records, &reg, &EngineConfig::default()).unwrap();
        assert_eq!(rates[0].jurisdiction, "Maine");
        assert_eq!(rates[1].jurisdiction, "Vermont");
    }
}
