use chrono::NaiveDate;

/// Rejections raised while turning a [`crate::filter::Filter`] into a date interval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid {field} date {value:?}")]
    InvalidDate { field: &'static str, value: String },
    #[error("custom range starts on {start} but ends on {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}
