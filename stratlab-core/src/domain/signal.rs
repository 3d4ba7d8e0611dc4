//! Strategy signal sequences — produced externally, consumed read-only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::series::{check_strictly_increasing, SeriesError};

/// Desired market direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for flat.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Flat => 0.0,
        }
    }

    /// Number of position sides crossed when moving from `self` to `next`.
    ///
    /// Flat→long is one side (entry), long→short is two (exit + entry).
    pub fn sides_crossed(self, next: Direction) -> u32 {
        (self.sign() - next.sign()).abs() as u32
    }
}

/// One signal observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub date: NaiveDate,
    pub direction: Direction,
    /// Strength in [0, 1].
    pub conviction: f64,
}

impl Signal {
    pub fn new(date: NaiveDate, direction: Direction, conviction: f64) -> Self {
        Self {
            date,
            direction,
            conviction,
        }
    }

    pub fn long(date: NaiveDate) -> Self {
        Self::new(date, Direction::Long, 1.0)
    }

    pub fn short(date: NaiveDate) -> Self {
        Self::new(date, Direction::Short, 1.0)
    }

    pub fn flat(date: NaiveDate) -> Self {
        Self::new(date, Direction::Flat, 0.0)
    }

    /// Signed exposure implied by this signal.
    pub fn exposure(&self, scale_by_conviction: bool) -> f64 {
        if scale_by_conviction {
            self.direction.sign() * self.conviction
        } else {
            self.direction.sign()
        }
    }
}

/// Ordered signal sequence.
///
/// Invariant: dates strictly increasing, conviction within [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    signals: Vec<Signal>,
}

impl SignalSeries {
    pub fn new(signals: Vec<Signal>) -> Result<Self, SeriesError> {
        check_strictly_increasing(signals.iter().map(|s| s.date))?;
        if let Some(bad) = signals
            .iter()
            .find(|s| !(0.0..=1.0).contains(&s.conviction))
        {
            return Err(SeriesError::ConvictionOutOfRange {
                date: bad.date,
                conviction: bad.conviction,
            });
        }
        Ok(Self { signals })
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
