use thiserror::Error;

/// Error kinds the engine distinguishes.
///
/// `MissingPopulation` is fatal only to the single jurisdiction/age-group
/// computation that raised it; the other variants indicate malformed input
/// and abort the whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no population entry for {jurisdiction} / {age_group}")]
    MissingPopulation {
        jurisdiction: String,
        age_group: String,
    },

    #[error("no historical years available to estimate a baseline for year {target_year}")]
    EmptyHistoricalSeries { target_year: i32 },

    #[error("calendar weeks out of order at {year} week {week}")]
    NonMonotonicCalendar { year: i32, week: u32 },

    #[error("reference series contains no weeks")]
    EmptyCalendar,
}
