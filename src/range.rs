//! Resolves a period selector into a concrete `[start, end]` interval.
//!
//! Weeks start on Sunday everywhere in this crate.

use chrono::{Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::FilterError;
use crate::filter::{Filter, Period};
use crate::models::RawValue;
use crate::normalize::parse_date;

/// Inclusive interval; `None` on a side means unbounded in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DateInterval {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateInterval {
    pub const UNBOUNDED: DateInterval = DateInterval {
        start: None,
        end: None,
    };

    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    /// Start of `first` through the last millisecond of `last`.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: Some(start_of_day(first)),
            end: Some(end_of_day(last)),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }

    /// Undated rows never fall inside an interval, not even an unbounded one.
    pub fn contains_opt(&self, at: Option<NaiveDateTime>) -> bool {
        at.is_some_and(|at| self.contains(at))
    }

    /// Calendar days between the bounds, `None` when either side is open.
    pub fn span_days(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((end.date() - start.date()).num_days().abs()),
            _ => None,
        }
    }

    /// Resolve against the local wall clock, captured once.
    pub fn resolve(filter: &Filter) -> Result<Self, FilterError> {
        Self::resolve_at(filter, Local::now().naive_local())
    }

    pub fn resolve_at(filter: &Filter, now: NaiveDateTime) -> Result<Self, FilterError> {
        let today = now.date();
        let (first, last) = match filter.period {
            Period::Today => (today, today),
            Period::Yesterday => {
                let day = previous_day(today);
                (day, day)
            }
            Period::ThisWeek => week_bounds(start_of_week(today)),
            Period::LastWeek => week_bounds(sub_days(start_of_week(today), 7)),
            Period::ThisMonth => month_bounds(start_of_month(today)),
            Period::LastMonth => month_bounds(sub_months(start_of_month(today), 1)),
            Period::ThisQuarter => quarter_bounds(start_of_quarter(today)),
            Period::LastQuarter => quarter_bounds(sub_months(start_of_quarter(today), 3)),
            Period::ThisYear => year_bounds(start_of_year(today)),
            Period::LastYear => year_bounds(sub_months(start_of_year(today), 12)),
            Period::Custom => return Self::resolve_custom(filter),
            Period::All => return Ok(Self::UNBOUNDED),
        };
        Ok(Self::days(first, last))
    }

    fn resolve_custom(filter: &Filter) -> Result<Self, FilterError> {
        let first = custom_bound("start", filter.start_date.as_deref())?;
        let last = custom_bound("end", filter.end_date.as_deref())?;

        if let (Some(first), Some(last)) = (first, last) {
            if first > last {
                return Err(FilterError::InvertedRange {
                    start: first,
                    end: last,
                });
            }
        }

        Ok(Self {
            start: first.map(start_of_day),
            end: last.map(end_of_day),
        })
    }
}

fn custom_bound(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, FilterError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    parse_date(Some(&RawValue::Text(raw.to_string())))
        .map(|at| Some(at.date()))
        .ok_or_else(|| FilterError::InvalidDate {
            field,
            value: raw.to_string(),
        })
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN))
}

pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    sub_days(date, u64::from(date.weekday().num_days_from_sunday()))
}

pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn start_of_quarter(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

pub fn start_of_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

pub(crate) fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

pub(crate) fn sub_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(date)
}

pub(crate) fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(date)
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

fn week_bounds(first: NaiveDate) -> (NaiveDate, NaiveDate) {
    (first, first.checked_add_days(Days::new(6)).unwrap_or(first))
}

fn span_bounds(first: NaiveDate, months: u32) -> (NaiveDate, NaiveDate) {
    let last = add_months(first, months)
        .map(previous_day)
        .unwrap_or(first);
    (first, last)
}

fn month_bounds(first: NaiveDate) -> (NaiveDate, NaiveDate) {
    span_bounds(first, 1)
}

fn quarter_bounds(first: NaiveDate) -> (NaiveDate, NaiveDate) {
    span_bounds(first, 3)
}

fn year_bounds(first: NaiveDate) -> (NaiveDate, NaiveDate) {
    span_bounds(first, 12)
}
