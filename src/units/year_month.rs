// src/units/year_month.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A simulated calendar month, rendered as `YYYY-MM`.
///
/// Ordering is chronological. `next`/`prev` wrap year boundaries, so
/// `1980-12` is followed by `1981-01`, never `1980-13`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be within 01..12 (got {month})"));
        }
        if !(0..=9999).contains(&year) {
            return Err(format!("year must be within 0000..9999 (got {year})"));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
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

    pub fn prev(&self) -> Self {
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

    /// Half-open temporal window `[first day, first day of next month)` used
    /// for forcing data searches.
    pub fn temporal_window(&self) -> (String, String) {
        (
            format!("{self}-01T00:00:00"),
            format!("{}-01T00:00:00", self.next()),
        )
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let Some((year, month)) = trimmed.split_once('-') else {
            return Err(format!("invalid year-month '{trimmed}' (expected YYYY-MM)"));
        };
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("invalid year-month '{trimmed}' (expected YYYY-MM)"));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in '{trimmed}'"))?;
        let month: u8 = month
            .parse()
            .map_err(|_| format!("invalid month in '{trimmed}'"))?;
        YearMonth::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Parse a two-digit month label such as `"01"` or `"12"`.
pub fn parse_month_label(label: &str) -> Result<u8, String> {
    let trimmed = label.trim();
    let month: u8 = trimmed
        .parse()
        .map_err(|_| format!("invalid month label '{trimmed}'"))?;
    if !(1..=12).contains(&month) {
        return Err(format!("month label '{trimmed}' is outside 01..12"));
    }
    Ok(month)
}
