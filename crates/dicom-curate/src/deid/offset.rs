//! Date arithmetic: ISO-8601 duration offsets and day shifts.

use chrono::{Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CurateError, Result};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?$").unwrap()
});

const DATE_FORMAT: &str = "%Y%m%d";

/// A calendar offset such as `P1Y2M`, `P10D` or `-P3W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateOffset {
    pub negative: bool,
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
}

impl DateOffset {
    /// Parse an ISO-8601 date duration.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = DURATION_RE.captures(s.trim()).ok_or_else(|| {
            CurateError::Config(format!("'{}' is not an ISO-8601 duration", s))
        })?;
        let field = |i: usize| -> Result<u32> {
            match caps.get(i) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| CurateError::Config(format!("duration field too large in '{}'", s))),
                None => Ok(0),
            }
        };
        let offset = Self {
            negative: caps.get(1).is_some(),
            years: field(2)?,
            months: field(3)?,
            weeks: field(4)?,
            days: field(5)?,
        };
        if (2..=5).all(|i| caps.get(i).is_none()) {
            return Err(CurateError::Config(format!("'{}' has no duration fields", s)));
        }
        Ok(offset)
    }

    fn apply(&self, date: NaiveDate) -> Option<NaiveDate> {
        let months = Months::new(self.years.checked_mul(12)?.checked_add(self.months)?);
        let days = Days::new(self.weeks as u64 * 7 + self.days as u64);
        if self.negative {
            date.checked_sub_months(months)?.checked_sub_days(days)
        } else {
            date.checked_add_months(months)?.checked_add_days(days)
        }
    }

    /// Shift a DA value (`YYYYMMDD`). Returns `None` when it does not parse.
    pub fn shift_da(&self, value: &str) -> Option<String> {
        let date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()?;
        Some(self.apply(date)?.format(DATE_FORMAT).to_string())
    }

    /// Shift the date part of a DT value, keeping the time part.
    pub fn shift_dt(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.len() < 8 || !value.is_char_boundary(8) {
            return None;
        }
        let (date, rest) = value.split_at(8);
        Some(format!("{}{}", self.shift_da(date)?, rest))
    }
}

impl std::str::FromStr for DateOffset {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self> {
        DateOffset::parse(s)
    }
}

/// Add (or subtract) whole days to a `YYYYMMDD` date.
pub fn shift_date(date: &str, offset_days: i64) -> Option<String> {
    let parsed = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).ok()?;
    let shifted = if offset_days >= 0 {
        parsed.checked_add_days(Days::new(offset_days as u64))?
    } else {
        parsed.checked_sub_days(Days::new(offset_days.unsigned_abs()))?
    };
    Some(shifted.format(DATE_FORMAT).to_string())
}
