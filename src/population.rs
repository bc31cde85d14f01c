//! Population registry: (jurisdiction, age-group) to population count.
//!
//! Built from single-age census rows summed into the age brackets the death
//! data is stratified by, plus a manual override table for jurisdictions the
//! census source lacks.

use std::collections::HashMap;

use crate::error::EngineError;

/// Age value the census source uses to mean "any age". Bracket upper bounds
/// must stay strictly below it so totals are not double-counted.
pub const AGE_ANY: u32 = 999;

/// Label of the reserved bucket holding a jurisdiction's full population.
pub const ALL_AGES: &str = "all";

/// Sex code for "both sexes" rows; others are sex-specific breakdowns.
pub const SEX_ALL: u32 = 0;

/// One census row: a single-year-of-age population count.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusRow {
    pub jurisdiction: String,
    pub sex: u32,
    pub age: u32,
    pub count: u64,
}

/// An inclusive age bracket. `upper` must be < [`AGE_ANY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBracket {
    pub lower: u32,
    pub upper: u32,
}

/// The age brackets of the weekly death-count dataset, plus the reserved
/// "all" bucket covering every age.
pub fn age_brackets() -> Vec<(String, AgeBracket)> {
    [
        (ALL_AGES, 0, 998),
        ("Under 25 years", 0, 24),
        ("25-44 years", 25, 44),
        ("45-64 years", 45, 64),
        ("65-74 years", 65, 74),
        ("75-84 years", 75, 84),
        ("85 years and older", 85, 998),
    ]
    .into_iter()
    .map(|(label, lower, upper)| (label.to_string(), AgeBracket { lower, upper }))
    .collect()
}

/// Puerto Rico is absent from the census estimates used for the states, so
/// its breakdown is entered verbatim from the UN Demographic Yearbook 2020.
pub fn puerto_rico_population() -> Vec<(String, u64)> {
    [
        (ALL_AGES, 3_193_694),
        (
            "Under 25 years",
            21_386 + 96_096 + 157_661 + 182_764 + 201_616 + 216_485,
        ),
        ("25-44 years", 219_925 + 185_241 + 189_502 + 198_881),
        ("45-64 years", 204_152 + 211_903 + 219_296 + 209_130),
        ("65-74 years", 189_933 + 176_557),
        ("75-84 years", 131_326 + 90_644),
        ("85 years and older", 91_196),
    ]
    .into_iter()
    .map(|(label, count)| (label.to_string(), count))
    .collect()
}

/// Maps (jurisdiction, age-group) to population counts.
#[derive(Debug, Clone, Default)]
pub struct PopulationRegistry {
    counts: HashMap<(String, String), u64>,
}

impl PopulationRegistry {
    /// Sums census rows into `brackets` for every jurisdiction present.
    ///
    /// Only "both sexes" rows count, and only ages strictly below
    /// [`AGE_ANY`]: the sentinel rows are whole-population duplicates.
    pub fn from_census(rows: &[CensusRow], brackets: &[(String, AgeBracket)]) -> Self {
        let mut counts: HashMap<(String, String), u64> = HashMap::new();

        for row in rows {
            if row.sex != SEX_ALL || row.age >= AGE_ANY {
                continue;
            }
            for (label, bracket) in brackets {
                if row.age >= bracket.lower && row.age <= bracket.upper {
                    *counts
                        .entry((row.jurisdiction.clone(), label.clone()))
                        .or_insert(0) += row.count;
                }
            }
        }

        Self { counts }
    }

    /// Enters a manually supplied breakdown for one jurisdiction. Entries
    /// take precedence over anything derived from the census rows.
    pub fn insert_override(&mut self, jurisdiction: &str, entries: &[(String, u64)]) {
        for (age_group, count) in entries {
            self.counts
                .insert((jurisdiction.to_string(), age_group.clone()), *count);
        }
    }

    pub fn population(&self, jurisdiction: &str, age_group: &str) -> Result<u64, EngineError> {
        self.counts
            .get(&(jurisdiction.to_string(), age_group.to_string()))
            .copied()
            .ok_or_else(|| EngineError::MissingPopulation {
                jurisdiction: jurisdiction.to_string(),
                age_group: age_group.to_string(),
            })
    }

    /// Sorted list of every jurisdiction with at least one entry.
    pub fn jurisdictions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.counts.keys().map(|(j, _)| j.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(jurisdiction: &str, sex: u32, age: u32, count: u64) -> CensusRow {
        CensusRow {
            jurisdiction: jurisdiction.to_string(),
            sex,
            age,
            count,
        }
    }

    #[test]
    fn test_bracket_sums() {
        let rows = vec![
            row("Vermont", SEX_ALL, 20, 10),
            row("Vermont", SEX_ALL, 30, 20),
            row("Vermont", SEX_ALL, 90, 5),
        ];
        let reg = PopulationRegistry::from_census(&rows, &age_brackets());

        assert_eq!(reg.population("Vermont", "Under 25 years").unwrap(), 10);
        assert_eq!(reg.population("Vermont", "25-44 years").unwrap(), 20);
        assert_eq!(reg.population("Vermont", "85 years and older").unwrap(), 5);
        // "all" is the true total, not a sentinel.
        assert_eq!(reg.population("Vermont", ALL_AGES).unwrap(), 35);
    }

    #[test]
    fn test_sentinel_and_sex_rows_ignored() {
        let rows = vec![
            row("Vermont", SEX_ALL, 20, 10),
            row("Vermont", SEX_ALL, AGE_ANY, 9999), // "any age" duplicate
            row("Vermont", 1, 20, 9999),            // male-only breakdown
        ];
        let reg = PopulationRegistry::from_census(&rows, &age_brackets());
        assert_eq!(reg.population("Vermont", ALL_AGES).unwrap(), 10);
    }

    #[test]
    fn test_override_takes_precedence() {
        let rows = vec![row("Puerto Rico", SEX_ALL, 20, 1)];
        let mut reg = PopulationRegistry::from_census(&rows, &age_brackets());
        reg.insert_override("Puerto Rico", &puerto_rico_population());

        assert_eq!(
            reg.population("Puerto Rico", ALL_AGES).unwrap(),
            3_193_694
        );
        assert_eq!(
            reg.population("Puerto Rico", "85 years and older").unwrap(),
            91_196
        );
    }

    #[test]
    fn test_missing_population_error() {
        let reg = PopulationRegistry::default();
        let err = reg.population("Atlantis", ALL_AGES).unwrap_err();
        assert!(matches!(err, EngineError::MissingPopulation { .. }));
    }

    #[test]
    fn test_jurisdictions_sorted_and_deduped() {
        let rows = vec![
            row("Vermont", SEX_ALL, 20, 1),
            row("Alabama", SEX_ALL, 20, 1),
            row("Vermont", SEX_ALL, 21, 1),
        ];
        let reg = PopulationRegistry::from_census(&rows, &age_brackets());
        assert_eq!(reg.jurisdictions(), vec!["Alabama", "Vermont"]);
    }
}
