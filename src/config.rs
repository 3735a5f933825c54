use std::env;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDateTime};

use crate::engagements::DEFAULT_TOP_PROPERTIES;
use crate::normalize::parse_date_text;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Pinned "now"; `None` reads the local wall clock.
    pub reference_date: Option<NaiveDateTime>,
    pub top_properties: usize,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reference_date: None,
            top_properties: DEFAULT_TOP_PROPERTIES,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let reference_date = match read("DASHBOARD_REFERENCE_DATE") {
            Some(raw) => Some(
                parse_date_text(&raw)
                    .with_context(|| format!("DASHBOARD_REFERENCE_DATE is not a date: {raw:?}"))?,
            ),
            None => None,
        };

        let top_properties = match read("DASHBOARD_TOP_PROPERTIES") {
            Some(raw) => {
                let parsed: usize = raw.parse().with_context(|| {
                    format!("DASHBOARD_TOP_PROPERTIES must be a positive integer, got {raw:?}")
                })?;
                if parsed == 0 {
                    bail!("DASHBOARD_TOP_PROPERTIES must be a positive integer, got 0");
                }
                parsed
            }
            None => DEFAULT_TOP_PROPERTIES,
        };

        Ok(Self {
            reference_date,
            top_properties,
            log_filter: read("DASHBOARD_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    /// The instant every dashboard in one run is computed against.
    pub fn now(&self) -> NaiveDateTime {
        self.reference_date
            .unwrap_or_else(|| Local::now().naive_local())
    }
}
