//! Engine configuration.
//!
//! Every knob has a default matching the reference analysis; a JSON config
//! file can override any subset of them, and the CLI overrides a few more on
//! top.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::age_adjust::AgeAdjustment;
use crate::engine::baseline::{BaselineDefinition, BaselineMethod};
use crate::engine::reconcile::SplitJurisdiction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub baseline_method: BaselineMethod,
    pub baseline_definition: BaselineDefinition,
    /// First pandemic week, (year, MMWR week). Like the CDC, excess is
    /// counted starting on 2020 week 6, which begins 02-Feb-2020.
    pub pandemic_start: (i32, u32),
    /// First year of the pre-pandemic history window; the window runs up to,
    /// excluding, the pandemic-start year.
    pub history_start_year: i32,
    /// Assumed count for suppressed weeks (the source withholds 0-10; 5 is
    /// the mean).
    pub suppressed_fill: f64,
    /// Below this absolute total excess, a jurisdiction/age-group has too few
    /// underlying deaths to trust and is reported as insufficient data.
    pub noise_threshold: f64,
    pub age_adjustment: AgeAdjustment,
    pub split: SplitJurisdiction,
    /// Reference series the week calendar is built from; must never be
    /// suppressed in the source.
    pub reference_jurisdiction: String,
    pub reference_age_group: String,
    /// Whole-population mode counts weeks ending on or after this date.
    pub start_date: NaiveDate,
    pub cache_max_age_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_method: BaselineMethod::LinearRegression,
            baseline_definition: BaselineDefinition::CentralExpectation,
            pandemic_start: (2020, 6),
            history_start_year: 2015,
            suppressed_fill: 5.0,
            noise_threshold: 10.0,
            age_adjustment: AgeAdjustment::default(),
            split: SplitJurisdiction::default(),
            reference_jurisdiction: "United States".to_string(),
            reference_age_group: "85 years and older".to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 4, 26).expect("valid date"),
            cache_max_age_secs: 3600,
        }
    }
}

impl EngineConfig {
    /// Loads the config from a JSON file at `path`. Missing fields keep
    /// their defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Years of the pre-pandemic history window.
    pub fn history_years(&self) -> std::ops::Range<i32> {
        self.history_start_year..self.pandemic_start.0
    }
}
