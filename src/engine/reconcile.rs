//! Reconciliation of split administrative reporting units.
//!
//! The source reports one physical area under two names (the original case:
//! "New York City" separately from the rest of "New York"). Both must be
//! summed and reported under the parent's identity, for every age group and
//! for the "all ages" aggregate alike.

use serde::{Deserialize, Serialize};

use crate::engine::types::AgeGroupResult;

/// A parent reporting unit and the child unit double-reported out of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitJurisdiction {
    pub parent: String,
    pub child: String,
}

impl Default for SplitJurisdiction {
    fn default() -> Self {
        Self {
            parent: "New York".to_string(),
            child: "New York City".to_string(),
        }
    }
}

impl SplitJurisdiction {
    /// Maps a child unit's name to its parent; any other name passes through.
    pub fn canonical<'a>(&'a self, jurisdiction: &'a str) -> &'a str {
        if jurisdiction == self.child {
            self.parent.as_str()
        } else {
            jurisdiction
        }
    }
}

/// Folds one jurisdiction's totals into an entry list, merging split
/// parent/child units under the parent name.
///
/// If the list already holds an entry for the canonical jurisdiction, its
/// observed and expected totals are absorbed and the stale entry removed, so
/// no output ever names a child unit separately from its parent. The
/// per-million rate is computed from the merged totals against `population`.
/// Arrival order of parent and child does not affect the merged result.
pub fn fold_entry(
    split: &SplitJurisdiction,
    entries: &mut Vec<AgeGroupResult>,
    jurisdiction: &str,
    age_group: &str,
    mut observed: f64,
    mut expected: f64,
    population: u64,
) {
    let name = split.canonical(jurisdiction);

    if let Some(pos) = entries.iter().position(|e| e.jurisdiction == name) {
        let prior = entries.remove(pos);
        observed += prior.observed;
        expected += prior.expected;
    }

    entries.push(AgeGroupResult {
        jurisdiction: name.to_string(),
        age_group: age_group.to_string(),
        observed,
        expected,
        per_million: (observed - expected) / population as f64 * 1_000_000.0,
    });
}
