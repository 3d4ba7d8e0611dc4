//! Dated value series — the input shape for prices and per-period returns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single (date, value) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Structural errors in dated series and signal sequences.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("dates must be strictly increasing: {date} at index {index} follows {previous}")]
    NonIncreasingDate {
        index: usize,
        date: NaiveDate,
        previous: NaiveDate,
    },
    #[error("non-finite value {value} on {date}")]
    NonFiniteValue { date: NaiveDate, value: f64 },
    #[error("conviction {conviction} on {date} is outside [0, 1]")]
    ConvictionOutOfRange { date: NaiveDate, conviction: f64 },
    #[error("price series needs at least 2 points to produce returns, got {len}")]
    TooShortForReturns { len: usize },
    #[error("non-positive price {value} on {date}")]
    NonPositivePrice { date: NaiveDate, value: f64 },
}

/// Ordered per-period return series for one instrument.
///
/// Invariant: dates strictly increasing, every value finite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    points: Vec<SeriesPoint>,
}

impl ReturnSeries {
    pub fn new(points: Vec<SeriesPoint>) -> Result<Self, SeriesError> {
        check_strictly_increasing(points.iter().map(|p| p.date))?;
        if let Some(bad) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(SeriesError::NonFiniteValue {
                date: bad.date,
                value: bad.value,
            });
        }
        Ok(Self { points })
    }

    /// Build from parallel `(date, value)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, value)| SeriesPoint { date, value })
                .collect(),
        )
    }

    /// Convert a price series into simple returns. The first price only
    /// serves as the base, so the result has `prices.len() - 1` points.
    pub fn from_prices(prices: &[SeriesPoint]) -> Result<Self, SeriesError> {
        if prices.len() < 2 {
            return Err(SeriesError::TooShortForReturns { len: prices.len() });
        }
        check_strictly_increasing(prices.iter().map(|p| p.date))?;
        if let Some(bad) = prices.iter().find(|p| p.value <= 0.0 || !p.value.is_finite()) {
            return Err(SeriesError::NonPositivePrice {
                date: bad.date,
                value: bad.value,
            });
        }
        let points = prices
            .windows(2)
            .map(|w| SeriesPoint {
                date: w[1].date,
                value: w[1].value / w[0].value - 1.0,
            })
            .collect();
        Ok(Self { points })
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

pub(crate) fn check_strictly_increasing<I>(dates: I) -> Result<(), SeriesError>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut previous: Option<NaiveDate> = None;
    for (index, date) in dates.into_iter().enumerate() {
        if let Some(prev) = previous {
            if date <= prev {
                return Err(SeriesError::NonIncreasingDate {
                    index,
                    date,
                    previous: prev,
                });
            }
        }
        previous = Some(date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn accepts_increasing_dates() {
        let series = ReturnSeries::from_pairs([(d(2), 0.01), (d(3), -0.02), (d(4), 0.0)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.first_date(), Some(d(2)));
        assert_eq!(series.last_date(), Some(d(4)));
    }

    #[test]
    fn rejects_duplicate_date() {
        let err = ReturnSeries::from_pairs([(d(2), 0.01), (d(2), 0.02)]).unwrap_err();
        assert!(matches!(err, SeriesError::NonIncreasingDate { index: 1, .. }));
    }

    #[test]
    fn rejects_out_of_order_date() {
        let err = ReturnSeries::from_pairs([(d(5), 0.01), (d(3), 0.02)]).unwrap_err();
        assert!(matches!(err, SeriesError::NonIncreasingDate { .. }));
    }

    #[test]
    fn rejects_nan() {
        let err = ReturnSeries::from_pairs([(d(2), f64::NAN)]).unwrap_err();
        assert!(matches!(err, SeriesError::NonFiniteValue { .. }));
    }

    #[test]
    fn prices_to_returns() {
        let prices = vec![
            SeriesPoint::new(d(2), 100.0),
            SeriesPoint::new(d(3), 110.0),
            SeriesPoint::new(d(4), 99.0),
        ];
        let series = ReturnSeries::from_prices(&prices).unwrap();
        assert_eq!(series.len(), 2);
        assert!((series.values()[0] - 0.1).abs() < 1e-12);
        assert!((series.values()[1] - (-0.1)).abs() < 1e-12);
        assert_eq!(series.first_date(), Some(d(3)));
    }

    #[test]
    fn prices_must_be_positive() {
        let prices = vec![SeriesPoint::new(d(2), 100.0), SeriesPoint::new(d(3), 0.0)];
        assert!(matches!(
            ReturnSeries::from_prices(&prices),
            Err(SeriesError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn empty_series_is_valid() {
        let series = ReturnSeries::new(Vec::new()).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.first_date(), None);
    }
}
