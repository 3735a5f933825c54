//! Aggregation core for a real-estate brokerage BI dashboard.
//!
//! Rows arrive as loosely typed spreadsheet records; every aggregator is a pure
//! function of `(rows, interval, filter)` and degrades malformed cells to
//! neutral values instead of failing.

pub mod buckets;
pub mod config;
pub mod contracts;
pub mod dashboard;
pub mod engagements;
pub mod error;
pub mod filter;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod properties;
pub mod range;
pub mod report;

pub use buckets::Granularity;
pub use error::FilterError;
pub use filter::{Filter, FilterUpdate, GranularityChoice, Period, Purpose};
pub use models::{Bucket, RawValue, Row};
pub use range::DateInterval;
