//! Monthly calculation period.

use core::fmt;

use chrono::{Datelike, NaiveDate};

use crate::{WbError, WbResult};

/// A (year, month) pair; the unit of computation for every calculator.
///
/// Ordering is chronological.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalculationPeriod {
    year: i32,
    month: u32,
}

impl CalculationPeriod {
    pub fn new(year: i32, month: u32) -> WbResult<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(WbError::InvalidPeriod { year, month });
        }
        Ok(Self { year, month })
    }

    /// Period containing the given date.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Human-readable label, e.g. "August 2025".
    pub fn label(&self) -> String {
        match self.first_day() {
            Some(date) => date.format("%B %Y").to_string(),
            None => format!("{}-{:02}", self.year, self.month),
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for CalculationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_month() {
        assert!(matches!(
            CalculationPeriod::new(2025, 13),
            Err(WbError::InvalidPeriod { month: 13, .. })
        ));
        assert!(CalculationPeriod::new(2025, 0).is_err());
    }

    #[test]
    fn label_and_display() {
        let p = CalculationPeriod::new(2025, 8).unwrap();
        assert_eq!(p.label(), "August 2025");
        assert_eq!(p.to_string(), "2025-08");
    }

    #[test]
    fn previous_and_next_cross_year() {
        let jan = CalculationPeriod::new(2025, 1).unwrap();
        assert_eq!(jan.previous(), CalculationPeriod::new(2024, 12).unwrap());
        assert_eq!(jan.previous().next(), jan);
    }

    #[test]
    fn ordering_is_chronological() {
        let a = CalculationPeriod::new(2024, 12).unwrap();
        let b = CalculationPeriod::new(2025, 1).unwrap();
        assert!(a < b);
    }
}
