use std::collections::HashMap;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::filter::GranularityChoice;
use crate::models::Bucket;
use crate::range::{
    quarter_of, start_of_month, start_of_quarter, start_of_week, start_of_year, DateInterval,
};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    /// First day of the bucket holding `date`.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => start_of_week(date),
            Granularity::Month => start_of_month(date),
            Granularity::Quarter => start_of_quarter(date),
            Granularity::Year => start_of_year(date),
        }
    }

    /// Start of the bucket after the one starting at `start`.
    pub fn next(self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Granularity::Day => start.checked_add_days(Days::new(1)),
            Granularity::Week => start.checked_add_days(Days::new(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
            Granularity::Quarter => start.checked_add_months(Months::new(3)),
            Granularity::Year => start.checked_add_months(Months::new(12)),
        }
    }

    /// Sortable group key: `2024-01-31`, `2024-W05`, `2024-01`, `2024-Q1`, `2024`.
    pub fn key(self, date: NaiveDate) -> String {
        let start = self.bucket_start(date);
        match self {
            Granularity::Day => start.format("%Y-%m-%d").to_string(),
            Granularity::Week => week_key(start),
            Granularity::Month => start.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{}-Q{}", start.year(), quarter_of(start)),
            Granularity::Year => start.year().to_string(),
        }
    }

    /// Chart label: `31/01`, `28/01`, `jan 2024`, `T1 2024`, `2024`.
    pub fn label(self, date: NaiveDate) -> String {
        let start = self.bucket_start(date);
        match self {
            Granularity::Day | Granularity::Week => start.format("%d/%m").to_string(),
            Granularity::Month => format!(
                "{} {}",
                MONTH_ABBREVIATIONS[start.month0() as usize],
                start.year()
            ),
            Granularity::Quarter => format!("T{} {}", quarter_of(start), start.year()),
            Granularity::Year => start.year().to_string(),
        }
    }
}

/// Weeks are numbered within the year of their Saturday, so the week holding
/// 1 January is week 1 and keys never collide across a year boundary.
fn week_key(sunday: NaiveDate) -> String {
    let saturday = sunday.checked_add_days(Days::new(6)).unwrap_or(sunday);
    let week_year = saturday.year();
    let first_sunday = NaiveDate::from_ymd_opt(week_year, 1, 1)
        .map(start_of_week)
        .unwrap_or(sunday);
    let week = (sunday - first_sunday).num_days() / 7 + 1;
    format!("{week_year}-W{week:02}")
}

/// Explicit choices pass through; `auto` picks from the span in calendar days.
pub fn resolve_granularity(interval: &DateInterval, requested: GranularityChoice) -> Granularity {
    if let GranularityChoice::Fixed(granularity) = requested {
        return granularity;
    }
    match interval.span_days() {
        None => Granularity::Month,
        Some(days) if days <= 31 => Granularity::Day,
        Some(days) if days <= 120 => Granularity::Week,
        Some(days) if days <= 730 => Granularity::Month,
        Some(days) if days <= 1825 => Granularity::Quarter,
        Some(_) => Granularity::Year,
    }
}

pub fn assign(at: NaiveDateTime, granularity: Granularity) -> String {
    granularity.key(at.date())
}

pub fn empty_bucket<T: Default>(date: NaiveDate, granularity: Granularity) -> Bucket<T> {
    Bucket {
        key: granularity.key(date),
        period_start: granularity.bucket_start(date),
        label: granularity.label(date),
        value: T::default(),
    }
}

/// Every bucket from the one holding `first` through the one holding `last`.
pub fn span_buckets<T: Default>(
    first: NaiveDate,
    last: NaiveDate,
    granularity: Granularity,
) -> Vec<Bucket<T>> {
    let last_start = granularity.bucket_start(last);
    let mut cursor = Some(granularity.bucket_start(first));
    let mut buckets = Vec::new();

    while let Some(start) = cursor.filter(|start| *start <= last_start) {
        buckets.push(empty_bucket(start, granularity));
        cursor = granularity.next(start);
    }

    buckets
}

/// Gap-filled, zeroed buckets over `interval`.
///
/// Open or empty intervals fall back to the single bucket holding `now`, so a
/// series is never empty.
pub fn build_buckets<T: Default>(
    interval: &DateInterval,
    granularity: Granularity,
    now: NaiveDateTime,
) -> Vec<Bucket<T>> {
    let buckets = match (interval.start, interval.end) {
        (Some(start), Some(end)) => span_buckets(start.date(), end.date(), granularity),
        _ => Vec::new(),
    };
    if buckets.is_empty() {
        return vec![empty_bucket(now.date(), granularity)];
    }
    buckets
}

/// Buckets plus a key index for accumulating observations into them.
#[derive(Debug, Clone)]
pub struct Series<T> {
    granularity: Granularity,
    buckets: Vec<Bucket<T>>,
    index: HashMap<String, usize>,
}

impl<T: Default> Series<T> {
    pub fn over(interval: &DateInterval, granularity: Granularity, now: NaiveDateTime) -> Self {
        Self::from_buckets(build_buckets(interval, granularity, now), granularity)
    }

    pub fn spanning(first: NaiveDate, last: NaiveDate, granularity: Granularity) -> Self {
        Self::from_buckets(span_buckets(first, last, granularity), granularity)
    }

    fn from_buckets(buckets: Vec<Bucket<T>>, granularity: Granularity) -> Self {
        let index = buckets
            .iter()
            .enumerate()
            .map(|(position, bucket)| (bucket.key.clone(), position))
            .collect();
        Self {
            granularity,
            buckets,
            index,
        }
    }

    /// Accumulator for the bucket holding `at`, if the series covers it.
    pub fn slot_mut(&mut self, at: NaiveDateTime) -> Option<&mut T> {
        let position = *self.index.get(&assign(at, self.granularity))?;
        self.buckets.get_mut(position).map(|bucket| &mut bucket.value)
    }

    pub fn into_buckets(self) -> Vec<Bucket<T>> {
        self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{end_of_day, start_of_day};
    use proptest::prelude::*;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn noon(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(12, 0, 0).expect("valid time")
    }

    fn keys(buckets: &[Bucket<u32>]) -> Vec<&str> {
        buckets.iter().map(|bucket| bucket.key.as_str()).collect()
    }

    #[test]
    fn auto_granularity_follows_span() {
        let auto = GranularityChoice::Auto;
        let within = |days: u64| {
            let first = day(2024, 1, 1);
            DateInterval::days(first, first.checked_add_days(Days::new(days)).expect("date"))
        };
        assert_eq!(resolve_granularity(&within(31), auto), Granularity::Day);
        assert_eq!(resolve_granularity(&within(32), auto), Granularity::Week);
        assert_eq!(resolve_granularity(&within(120), auto), Granularity::Week);
        assert_eq!(resolve_granularity(&within(365), auto), Granularity::Month);
        assert_eq!(resolve_granularity(&within(1000), auto), Granularity::Quarter);
        assert_eq!(resolve_granularity(&within(3000), auto), Granularity::Year);
        assert_eq!(resolve_granularity(&DateInterval::UNBOUNDED, auto), Granularity::Month);
        assert_eq!(
            resolve_granularity(&within(3000), GranularityChoice::Fixed(Granularity::Day)),
            Granularity::Day
        );
    }

    #[test]
    fn month_buckets_are_gap_filled() {
        let interval = DateInterval::days(day(2023, 11, 15), day(2024, 2, 3));
        let buckets: Vec<Bucket<u32>> =
            build_buckets(&interval, Granularity::Month, noon(day(2024, 6, 1)));
        assert_eq!(keys(&buckets), vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
        assert_eq!(buckets[2].label, "jan 2024");
        assert_eq!(buckets[0].period_start, day(2023, 11, 1));
    }

    #[test]
    fn quarter_and_year_labels() {
        assert_eq!(Granularity::Quarter.key(day(2024, 5, 15)), "2024-Q2");
        assert_eq!(Granularity::Quarter.label(day(2024, 5, 15)), "T2 2024");
        assert_eq!(Granularity::Year.key(day(2024, 5, 15)), "2024");
        assert_eq!(Granularity::Day.label(day(2024, 5, 15)), "15/05");
    }

    #[test]
    fn week_keys_roll_into_the_next_year() {
        // Sunday 2023-12-31 starts the week holding 2024-01-01.
        assert_eq!(Granularity::Week.key(day(2024, 1, 3)), "2024-W01");
        assert_eq!(Granularity::Week.key(day(2023, 12, 31)), "2024-W01");
        assert_eq!(Granularity::Week.key(day(2023, 12, 30)), "2023-W52");
        assert_eq!(Granularity::Week.key(day(2023, 1, 1)), "2023-W01");
        assert_eq!(Granularity::Week.label(day(2024, 1, 3)), "31/12");
    }

    #[test]
    fn open_intervals_fall_back_to_now() {
        let now = noon(day(2024, 5, 15));
        let buckets: Vec<Bucket<u32>> =
            build_buckets(&DateInterval::UNBOUNDED, Granularity::Month, now);
        assert_eq!(keys(&buckets), vec!["2024-05"]);

        let inverted = DateInterval::new(
            Some(end_of_day(day(2024, 3, 1))),
            Some(start_of_day(day(2024, 1, 1))),
        );
        let buckets: Vec<Bucket<u32>> = build_buckets(&inverted, Granularity::Month, now);
        assert_eq!(keys(&buckets), vec!["2024-05"]);
    }

    #[test]
    fn series_slots_ignore_uncovered_dates() {
        let interval = DateInterval::days(day(2024, 1, 1), day(2024, 1, 31));
        let mut series: Series<u32> =
            Series::over(&interval, Granularity::Week, noon(day(2024, 1, 1)));
        if let Some(slot) = series.slot_mut(noon(day(2024, 1, 10))) {
            *slot += 1;
        }
        assert!(series.slot_mut(noon(day(2024, 3, 1))).is_none());
        let buckets = series.into_buckets();
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets.iter().map(|bucket| bucket.value).sum::<u32>(), 1);
        assert_eq!(buckets[1].value, 1);
    }

    fn granularity_strategy() -> impl Strategy<Value = Granularity> {
        prop_oneof![
            Just(Granularity::Day),
            Just(Granularity::Week),
            Just(Granularity::Month),
            Just(Granularity::Quarter),
            Just(Granularity::Year),
        ]
    }

    proptest! {
        #[test]
        fn buckets_are_contiguous_and_increasing(
            start_offset in 0u64..3000,
            length in 0u64..800,
            granularity in granularity_strategy(),
        ) {
            let first = day(2018, 1, 1).checked_add_days(Days::new(start_offset)).expect("date");
            let last = first.checked_add_days(Days::new(length)).expect("date");
            let buckets: Vec<Bucket<u32>> =
                build_buckets(&DateInterval::days(first, last), granularity, noon(first));

            prop_assert!(!buckets.is_empty());
            prop_assert_eq!(buckets[0].period_start, granularity.bucket_start(first));
            prop_assert_eq!(buckets[buckets.len() - 1].period_start, granularity.bucket_start(last));
            for pair in buckets.windows(2) {
                prop_assert!(pair[0].key < pair[1].key);
                prop_assert_eq!(granularity.next(pair[0].period_start), Some(pair[1].period_start));
            }
        }

        #[test]
        fn assign_is_stable_within_a_bucket_and_monotonic(
            offset in 0u64..5000,
            step in 0u64..400,
            granularity in granularity_strategy(),
        ) {
            let earlier = day(2015, 1, 1).checked_add_days(Days::new(offset)).expect("date");
            let later = earlier.checked_add_days(Days::new(step)).expect("date");
            let earlier_key = assign(noon(earlier), granularity);
            let later_key = assign(noon(later), granularity);

            prop_assert!(earlier_key <= later_key);
            prop_assert_eq!(assign(noon(granularity.bucket_start(later)), granularity), later_key);
        }
    }
}
