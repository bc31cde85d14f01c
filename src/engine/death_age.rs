//! Mean age of COVID deaths per jurisdiction, input to age adjustment.

use std::collections::BTreeMap;

use crate::engine::reconcile::SplitJurisdiction;
use crate::engine::types::CovidDeathRow;

/// Age-bracket labels of the deaths-by-age dataset and the midpoint age
/// assigned to each. 85+ is approximated as 90.
static BRACKET_MIDPOINTS: &[(&str, f64)] = &[
    ("Under 1 year", 0.5),
    ("1-4 years", 3.0),
    ("5-14 years", 10.0),
    ("15-24 years", 20.0),
    ("25-34 years", 30.0),
    ("35-44 years", 40.0),
    ("45-54 years", 50.0),
    ("55-64 years", 60.0),
    ("65-74 years", 70.0),
    ("75-84 years", 80.0),
    ("85 years and over", 90.0),
];

/// Computes the death-count-weighted mean age of COVID deaths for every
/// jurisdiction in `rows`.
///
/// Suppressed cells are assumed to hold `suppressed_fill` deaths (assuming 0
/// or 5 has an insignificant effect on the mean). Rows for a split child
/// unit are merged into the parent before averaging. Rows whose age-group
/// label is not a known bracket (e.g. an "All Ages" total) are skipped.
pub fn mean_death_ages(
    rows: &[CovidDeathRow],
    split: &SplitJurisdiction,
    suppressed_fill: f64,
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new(); // (age*deaths, deaths)

    for row in rows {
        let Some(midpoint) = midpoint_for(&row.age_group) else {
            continue;
        };
        let deaths = row.deaths.unwrap_or(suppressed_fill);
        let name = split.canonical(&row.jurisdiction);

        let entry = sums.entry(name.to_string()).or_insert((0.0, 0.0));
        entry.0 += midpoint * deaths;
        entry.1 += deaths;
    }

    sums.into_iter()
        .filter(|&(_, (_, deaths))| deaths > 0.0)
        .map(|(name, (ages, deaths))| (name, ages / deaths))
        .collect()
}

fn midpoint_for(age_group: &str) -> Option<f64> {
    BRACKET_MIDPOINTS
        .iter()
        .find(|&&(label, _)| label == age_group)
        .map(|&(_, midpoint)| midpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(jurisdiction: &str, age_group: &str, deaths: Option<f64>) -> CovidDeathRow {
        CovidDeathRow {
            jurisdiction: jurisdiction.to_string(),
            age_group: age_group.to_string(),
            deaths,
        }
    }

    #[test]
    fn test_weighted_mean() {
        let rows = vec![
            row("Vermont", "65-74 years", Some(100.0)),
            row("Vermont", "85 years and over", Some(300.0)),
        ];
        let ages = mean_death_ages(&rows, &SplitJurisdiction::default(), 5.0);
        // (70*100 + 90*300) / 400 = 85
        assert_eq!(ages["Vermont"], 85.0);
    }

    #[test]
    fn test_suppressed_cells_use_fill() {
        let rows = vec![
            row("Vermont", "15-24 years", None),
            row("Vermont", "15-24 years", Some(5.0)),
        ];
        let ages = mean_death_ages(&rows, &SplitJurisdiction::default(), 5.0);
        assert_eq!(ages["Vermont"], 20.0);
    }

    #[test]
    fn test_child_merged_into_parent() {
        let rows = vec![
            row("New York", "65-74 years", Some(100.0)),
            row("New York City", "85 years and over", Some(100.0)),
        ];
        let ages = mean_death_ages(&rows, &SplitJurisdiction::default(), 5.0);
        assert!(!ages.contains_key("New York City"));
        assert_eq!(ages["New York"], 80.0);
    }

    #[test]
    fn test_unknown_bracket_skipped() {
        let rows = vec![
            row("Vermont", "All Ages", Some(9999.0)),
            row("Vermont", "45-54 years", Some(10.0)),
        ];
        let ages = mean_death_ages(&rows, &SplitJurisdiction::default(), 5.0);
        assert_eq!(ages["Vermont"], 50.0);
    }
}
