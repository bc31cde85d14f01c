//! Expected-deaths baseline estimation from pre-pandemic history.

use serde::{Deserialize, Serialize};

use crate::engine::utility::mean;
use crate::error::EngineError;

/// How the expected death count for a week is derived from its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMethod {
    /// Arithmetic mean of the historical values.
    Average,
    /// Ordinary least-squares fit of value vs. year, projected to the target
    /// year. Captures the secular mortality trend a flat average misses.
    LinearRegression,
}

/// Which published baseline column the whole-population mode compares
/// observations against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineDefinition {
    /// Average expected count; weekly excess may be negative.
    CentralExpectation,
    /// Upper bound of the 95% prediction interval; only weeks above it
    /// carry excess.
    UpperBound,
}

/// An expected death count together with the method that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineEstimate {
    pub expected: f64,
    pub method: BaselineMethod,
}

impl BaselineMethod {
    /// Estimates the expected count for `target_year` from a complete
    /// historical (year, value) series.
    ///
    /// The series is sorted by year before fitting so the result does not
    /// depend on input order.
    pub fn estimate(
        self,
        series: &[(i32, f64)],
        target_year: i32,
    ) -> Result<BaselineEstimate, EngineError> {
        if series.is_empty() {
            return Err(EngineError::EmptyHistoricalSeries { target_year });
        }

        let mut series = series.to_vec();
        series.sort_by_key(|&(year, _)| year);

        let expected = match self {
            BaselineMethod::Average => {
                let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
                mean(&values)
            }
            BaselineMethod::LinearRegression => {
                let (slope, intercept) = ols_fit(&series);
                intercept + slope * target_year as f64
            }
        };

        Ok(BaselineEstimate {
            expected,
            method: self,
        })
    }
}

/// Least-squares (slope, intercept) of value vs. year. A degenerate series
/// (a single year) fits a flat line through its value.
fn ols_fit(series: &[(i32, f64)]) -> (f64, f64) {
    let n = series.len() as f64;
    let x_mean = series.iter().map(|&(y, _)| y as f64).sum::<f64>() / n;
    let y_mean = series.iter().map(|&(_, v)| v).sum::<f64>() / n;

    let sxx: f64 = series
        .iter()
        .map(|&(y, _)| (y as f64 - x_mean).powi(2))
        .sum();
    let sxy: f64 = series
        .iter()
        .map(|&(y, v)| (y as f64 - x_mean) * (v - y_mean))
        .sum();

    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    (slope, y_mean - slope * x_mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f64) -> Vec<(i32, f64)> {
        (2015..2020).map(|y| (y, value)).collect()
    }

    #[test]
    fn test_average_of_flat_history() {
        let est = BaselineMethod::Average.estimate(&flat(100.0), 2021).unwrap();
        assert_eq!(est.expected, 100.0);
        assert_eq!(est.method, BaselineMethod::Average);
    }

    #[test]
    fn test_regression_of_flat_history() {
        // Uniform values must be reproduced exactly by both methods.
        let est = BaselineMethod::LinearRegression
            .estimate(&flat(100.0), 2021)
            .unwrap();
        assert_eq!(est.expected, 100.0);
    }

    #[test]
    fn test_regression_projects_trend() {
        // Slope 10/year from 100 in 2015, projected to 2020.
        let series = vec![
            (2015, 100.0),
            (2016, 110.0),
            (2017, 120.0),
            (2018, 130.0),
            (2019, 140.0),
        ];
        let est = BaselineMethod::LinearRegression
            .estimate(&series, 2020)
            .unwrap();
        assert!((est.expected - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_regression_ignores_input_order() {
        let sorted = vec![(2015, 100.0), (2016, 110.0), (2017, 120.0)];
        let shuffled = vec![(2017, 120.0), (2015, 100.0), (2016, 110.0)];
        let a = BaselineMethod::LinearRegression
            .estimate(&sorted, 2020)
            .unwrap();
        let b = BaselineMethod::LinearRegression
            .estimate(&shuffled, 2020)
            .unwrap();
        assert_eq!(a.expected, b.expected);
    }

    #[test]
    fn test_single_year_series() {
        let est = BaselineMethod::LinearRegression
            .estimate(&[(2019, 80.0)], 2021)
            .unwrap();
        assert_eq!(est.expected, 80.0);
    }

    #[test]
    fn test_empty_series_is_an_error() {
        let err = BaselineMethod::Average.estimate(&[], 2021).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EmptyHistoricalSeries { target_year: 2021 }
        ));
    }
}
