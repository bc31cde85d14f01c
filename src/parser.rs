//! CSV parsers for the source datasets.
//!
//! Each parser deserializes raw rows with serde, applies the source filters
//! the analysis depends on, and converts to the engine's record types. The
//! engine itself never sees a file format.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;

use crate::engine::reconcile::SplitJurisdiction;
use crate::engine::types::{BaselinedRecord, CovidDeathRow, WeekRecord};
use crate::population::CensusRow;

/// Estimate type holding counts adjusted for reporting delays; the raw
/// "Unweighted" rows are always incomplete for recent weeks.
pub const PREDICTED_WEIGHTED: &str = "Predicted (weighted)";

/// The source publishes the two date formats interchangeably across files
/// and vintages.
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .with_context(|| format!("unrecognized date: {s}"))
}

/// Raw row of the weekly deaths by jurisdiction and age dataset.
#[derive(Debug, Deserialize)]
struct WeeklyCountRow {
    #[serde(rename = "Jurisdiction")]
    jurisdiction: String,
    #[serde(rename = "Week Ending Date")]
    week_ending: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Week")]
    week: u32,
    #[serde(rename = "Age Group")]
    age_group: String,
    #[serde(rename = "Number of Deaths")]
    deaths: Option<f64>,
    #[serde(rename = "Suppress")]
    suppress: Option<String>,
    #[serde(rename = "Type")]
    kind: String,
}

/// Parses the weekly death-count dataset, keeping only the
/// reporting-delay-adjusted estimates. Suppressed rows are kept but flagged;
/// the engine treats them as absent observations.
pub fn parse_weekly_counts(reader: impl Read) -> Result<Vec<WeekRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    for result in rdr.deserialize() {
        let row: WeeklyCountRow = result?;
        if row.kind != PREDICTED_WEIGHTED {
            continue;
        }
        let suppressed = row.suppress.as_deref().is_some_and(|s| !s.is_empty());
        records.push(WeekRecord {
            week_ending: parse_date(&row.week_ending)?,
            jurisdiction: row.jurisdiction,
            age_group: row.age_group,
            year: row.year,
            week: row.week,
            deaths: row.deaths,
            suppressed,
        });
    }

    Ok(records)
}

/// Raw row of the pre-baselined excess-deaths dataset.
#[derive(Debug, Deserialize)]
struct ExcessRow {
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Week Ending Date")]
    week_ending: String,
    #[serde(rename = "Observed Number")]
    observed: Option<f64>,
    #[serde(rename = "Average Expected Count")]
    expected: Option<f64>,
    #[serde(rename = "Upper Bound Threshold")]
    upper_bound: Option<f64>,
    #[serde(rename = "Total Excess Estimate")]
    total_excess: Option<f64>,
    #[serde(rename = "Outcome")]
    outcome: String,
    #[serde(rename = "Type")]
    kind: String,
}

fn excess_rows(reader: impl Read) -> Result<Vec<ExcessRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: ExcessRow = result?;
        if row.outcome == "All causes" && row.kind == PREDICTED_WEIGHTED {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Parses the excess-deaths dataset into weekly baselined records for the
/// whole-population mode. Rows without a published baseline are dropped.
pub fn parse_excess_deaths(reader: impl Read) -> Result<Vec<BaselinedRecord>> {
    let mut records = Vec::new();
    for row in excess_rows(reader)? {
        let (Some(expected), Some(upper_bound)) = (row.expected, row.upper_bound) else {
            continue;
        };
        records.push(BaselinedRecord {
            week_ending: parse_date(&row.week_ending)?,
            jurisdiction: row.state,
            observed: row.observed,
            expected,
            upper_bound,
        });
    }
    Ok(records)
}

/// Extracts the source's own total excess estimate per jurisdiction (it is
/// repeated on every row), merging split child units into their parent.
/// Used to compare our estimates against the official ones.
pub fn parse_official_totals(
    reader: impl Read,
    split: &SplitJurisdiction,
) -> Result<BTreeMap<String, f64>> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut seen: Vec<String> = Vec::new();

    for row in excess_rows(reader)? {
        if seen.contains(&row.state) {
            continue;
        }
        seen.push(row.state.clone());
        if let Some(total) = row.total_excess {
            *totals
                .entry(split.canonical(&row.state).to_string())
                .or_insert(0.0) += total;
        }
    }
    Ok(totals)
}

/// Raw row of the COVID deaths by sex and age dataset.
#[derive(Debug, Deserialize)]
struct CovidDeathsBySexAgeRow {
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Group")]
    group: String,
    #[serde(rename = "Sex")]
    sex: String,
    #[serde(rename = "Age Group")]
    age_group: String,
    #[serde(rename = "COVID-19 Deaths")]
    deaths: Option<f64>,
}

/// Parses per-state COVID deaths by age bracket, keeping the all-time,
/// both-sexes rows and dropping the national aggregate.
pub fn parse_covid_deaths(reader: impl Read) -> Result<Vec<CovidDeathRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: CovidDeathsBySexAgeRow = result?;
        if row.group != "By Total" || row.sex != "All Sexes" || row.state == "United States" {
            continue;
        }
        rows.push(CovidDeathRow {
            jurisdiction: row.state,
            age_group: row.age_group,
            deaths: row.deaths,
        });
    }

    Ok(rows)
}

/// Raw row of the census population estimates.
#[derive(Debug, Deserialize)]
struct PopulationRow {
    #[serde(rename = "NAME")]
    name: String,
    #[serde(rename = "SEX")]
    sex: u32,
    #[serde(rename = "AGE")]
    age: u32,
    #[serde(rename = "POPEST2020_CIV")]
    count: u64,
}

/// Parses single-year-of-age census rows; bracket filtering happens in the
/// population registry.
pub fn parse_census(reader: impl Read) -> Result<Vec<CensusRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: PopulationRow = result?;
        rows.push(CensusRow {
            jurisdiction: row.name,
            sex: row.sex,
            age: row.age,
            count: row.count,
        });
    }

    Ok(rows)
}
