//! Canonical ordered index of epidemiological weeks.
//!
//! Built once, from the reported weeks of a reference jurisdiction and age
//! group that is never suppressed; every other component indexes into this
//! shared time axis.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::engine::types::WeekRecord;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeekInfo {
    /// Zero-based position in the week sequence.
    pub index: usize,
    pub week_ending: NaiveDate,
}

/// The full observation period as an ordered sequence of (year, week-of-year)
/// pairs, with per-week position and week-ending date lookup.
#[derive(Debug, Clone)]
pub struct WeekIndex {
    weeks: Vec<(i32, u32)>,
    info: HashMap<(i32, u32), WeekInfo>,
}

impl WeekIndex {
    /// Builds the index from reference rows, which must already be in
    /// chronological order.
    ///
    /// Fails with [`EngineError::EmptyCalendar`] if no rows are given, or
    /// [`EngineError::NonMonotonicCalendar`] on the first out-of-order or
    /// duplicate week. All downstream indexing depends on this, so either
    /// failure aborts the run.
    pub fn from_records<'a, I>(rows: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = &'a WeekRecord>,
    {
        let mut weeks = Vec::new();
        let mut info = HashMap::new();

        for row in rows {
            let week = (row.year, row.week);
            if let Some(&last) = weeks.last() {
                if week <= last {
                    return Err(EngineError::NonMonotonicCalendar {
                        year: row.year,
                        week: row.week,
                    });
                }
            }
            info.insert(
                week,
                WeekInfo {
                    index: weeks.len(),
                    week_ending: row.week_ending,
                },
            );
            weeks.push(week);
        }

        if weeks.is_empty() {
            return Err(EngineError::EmptyCalendar);
        }

        Ok(Self { weeks, info })
    }

    /// Filters `records` down to the reference jurisdiction and age group,
    /// preserving their order, and builds the index from them.
    pub fn from_reference(
        records: &[WeekRecord],
        jurisdiction: &str,
        age_group: &str,
    ) -> Result<Self, EngineError> {
        Self::from_records(
            records
                .iter()
                .filter(|r| r.jurisdiction == jurisdiction && r.age_group == age_group),
        )
    }

    pub fn len(&self) -> usize {
        self.weeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    pub fn weeks(&self) -> &[(i32, u32)] {
        &self.weeks
    }

    pub fn position(&self, year: i32, week: u32) -> Option<usize> {
        self.info.get(&(year, week)).map(|i| i.index)
    }

    pub fn week_ending(&self, year: i32, week: u32) -> Option<NaiveDate> {
        self.info.get(&(year, week)).map(|i| i.week_ending)
    }

    /// Week-ending date of the last week with data.
    pub fn last_week_ending(&self) -> Option<NaiveDate> {
        self.weeks
            .last()
            .and_then(|&(y, w)| self.week_ending(y, w))
    }
}
