//! Calendar-quarter reporting periods.
//!
//! The orchestrator iterates the company universe over a range of
//! [`Period`]s; connectors match observations to a period by its end date.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

/// One calendar quarter, e.g. 2024Q1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    quarter: u8,
}

impl Period {
    /// Creates a period, validating the quarter is 1..=4.
    pub fn new(year: i32, quarter: u8) -> Result<Self, IngestError> {
        if !(1..=4).contains(&quarter) {
            return Err(IngestError::InvalidParameter(format!(
                "quarter must be 1..=4, got {quarter}"
            )));
        }
        Ok(Self { year, quarter })
    }

    /// Returns the period containing the given date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month0() / 3) + 1) as u8,
        }
    }

    /// The calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The quarter within the year (1..=4).
    #[must_use]
    pub const fn quarter(&self) -> u8 {
        self.quarter
    }

    /// Last day of the quarter, used as the canonical `metric_date`.
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        let (month, day) = match self.quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        NaiveDate::from_ymd_opt(self.year, month, day).expect("quarter end is a valid date")
    }

    /// The same quarter one year earlier.
    #[must_use]
    pub const fn year_earlier(&self) -> Self {
        Self {
            year: self.year - 1,
            quarter: self.quarter,
        }
    }

    /// The following quarter.
    #[must_use]
    pub const fn next(&self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }

    /// Inclusive iterator from `self` through `end`.
    ///
    /// Empty when `end` precedes `self`.
    pub fn through(self, end: Self) -> impl Iterator<Item = Self> {
        let mut cursor = self;
        std::iter::from_fn(move || {
            if cursor > end {
                return None;
            }
            let out = cursor;
            cursor = cursor.next();
            Some(out)
        })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Period {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, quarter) = s
            .split_once(['Q', 'q'])
            .ok_or_else(|| IngestError::Parse(format!("expected <year>Q<quarter>, got {s:?}")))?;
        let year = year
            .parse::<i32>()
            .map_err(|e| IngestError::Parse(format!("bad year in period {s:?}: {e}")))?;
        let quarter = quarter
            .parse::<u8>()
            .map_err(|e| IngestError::Parse(format!("bad quarter in period {s:?}: {e}")))?;
        Self::new(year, quarter)
    }
}

impl TryFrom<String> for Period {
    type Error = IngestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}
