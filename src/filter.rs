use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::buckets::Granularity;
use crate::normalize::fold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    #[default]
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    ThisYear,
    LastYear,
    Custom,
    #[serde(other)]
    All,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Yesterday => "yesterday",
            Period::ThisWeek => "this_week",
            Period::LastWeek => "last_week",
            Period::ThisMonth => "this_month",
            Period::LastMonth => "last_month",
            Period::ThisQuarter => "this_quarter",
            Period::LastQuarter => "last_quarter",
            Period::ThisYear => "this_year",
            Period::LastYear => "last_year",
            Period::Custom => "custom",
            Period::All => "all",
        }
    }

    /// Unrecognized keys mean "no date constraint".
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "today" => Period::Today,
            "yesterday" => Period::Yesterday,
            "this_week" => Period::ThisWeek,
            "last_week" => Period::LastWeek,
            "this_month" => Period::ThisMonth,
            "last_month" => Period::LastMonth,
            "this_quarter" => Period::ThisQuarter,
            "last_quarter" => Period::LastQuarter,
            "this_year" => Period::ThisYear,
            "last_year" => Period::LastYear,
            "custom" => Period::Custom,
            _ => Period::All,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested bucket size: a fixed granularity or `auto` (chosen from the span).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GranularityChoice {
    #[default]
    Auto,
    Fixed(Granularity),
}

impl GranularityChoice {
    /// Accepts `day`/`daily` … `year`/`yearly`; anything else but `auto` is month.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => GranularityChoice::Auto,
            "day" | "daily" => GranularityChoice::Fixed(Granularity::Day),
            "week" | "weekly" => GranularityChoice::Fixed(Granularity::Week),
            "quarter" | "quarterly" => GranularityChoice::Fixed(Granularity::Quarter),
            "year" | "yearly" => GranularityChoice::Fixed(Granularity::Year),
            _ => GranularityChoice::Fixed(Granularity::Month),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GranularityChoice::Auto => "auto",
            GranularityChoice::Fixed(granularity) => granularity.as_str(),
        }
    }
}

impl From<String> for GranularityChoice {
    fn from(value: String) -> Self {
        GranularityChoice::parse(&value)
    }
}

impl From<GranularityChoice> for String {
    fn from(value: GranularityChoice) -> Self {
        value.as_str().to_string()
    }
}

/// Business line of an engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Rent,
    Sale,
    Other,
}

impl Purpose {
    /// `None` for the "no constraint" sentinels (`todos`, `all`, blank).
    pub fn parse_filter(raw: &str) -> Option<Self> {
        match fold(raw).as_str() {
            "aluguel" | "rent" => Some(Purpose::Rent),
            "venda" | "sale" => Some(Purpose::Sale),
            "outros" | "other" => Some(Purpose::Other),
            _ => None,
        }
    }
}

fn deserialize_purpose<'de, D>(deserializer: D) -> Result<Option<Purpose>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Purpose::parse_filter))
}

fn is_unconstrained(raw: &str) -> bool {
    let folded = fold(raw);
    folded.is_empty() || folded == "todos" || folded == "all"
}

/// Everything an aggregation pass reads besides the rows themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub period: Period,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub granularity: GranularityChoice,
    pub collaborator: Option<String>,
    #[serde(deserialize_with = "deserialize_purpose")]
    pub purpose: Option<Purpose>,
}

impl Default for Filter {
    fn default() -> Self {
        Self::contracts()
    }
}

impl Filter {
    pub fn contracts() -> Self {
        Self {
            period: Period::ThisMonth,
            start_date: None,
            end_date: None,
            granularity: GranularityChoice::Auto,
            collaborator: None,
            purpose: None,
        }
    }

    pub fn properties() -> Self {
        Self {
            period: Period::All,
            ..Self::contracts()
        }
    }

    pub fn engagements() -> Self {
        Self::contracts()
    }

    pub fn custom(start_date: Option<&str>, end_date: Option<&str>) -> Self {
        Self {
            period: Period::Custom,
            start_date: start_date.map(str::to_string),
            end_date: end_date.map(str::to_string),
            ..Self::contracts()
        }
    }

    /// Merge `update` into this filter; unspecified fields keep their value.
    pub fn apply(&mut self, update: FilterUpdate) {
        if let Some(period) = update.period {
            self.period = period;
        }
        if let Some(start_date) = update.start_date {
            self.start_date = Some(start_date).filter(|value| !value.trim().is_empty());
        }
        if let Some(end_date) = update.end_date {
            self.end_date = Some(end_date).filter(|value| !value.trim().is_empty());
        }
        if let Some(granularity) = update.granularity {
            self.granularity = granularity;
        }
        if let Some(collaborator) = update.collaborator {
            self.collaborator = Some(collaborator).filter(|value| !is_unconstrained(value));
        }
        if let Some(purpose) = update.purpose {
            self.purpose = Purpose::parse_filter(&purpose);
        }
    }

    pub fn merged(mut self, update: FilterUpdate) -> Self {
        self.apply(update);
        self
    }

    /// Collaborator constraint, ignoring the "everyone" sentinels.
    pub fn collaborator(&self) -> Option<&str> {
        self.collaborator
            .as_deref()
            .filter(|value| !is_unconstrained(value))
    }
}

/// Partial filter change; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterUpdate {
    pub period: Option<Period>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub granularity: Option<GranularityChoice>,
    pub collaborator: Option<String>,
    pub purpose: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_keep_untouched_fields() {
        let mut filter = Filter::engagements();
        filter.apply(FilterUpdate {
            collaborator: Some("Ana Souza".to_string()),
            ..FilterUpdate::default()
        });
        filter.apply(FilterUpdate {
            period: Some(Period::LastMonth),
            ..FilterUpdate::default()
        });

        assert_eq!(filter.period, Period::LastMonth);
        assert_eq!(filter.collaborator(), Some("Ana Souza"));
        assert_eq!(filter.granularity, GranularityChoice::Auto);
    }

    #[test]
    fn sentinels_clear_constraints() {
        let filter = Filter::engagements().merged(FilterUpdate {
            collaborator: Some("todos".to_string()),
            purpose: Some("todos".to_string()),
            start_date: Some(String::new()),
            ..FilterUpdate::default()
        });
        assert_eq!(filter.collaborator(), None);
        assert_eq!(filter.purpose, None);
        assert_eq!(filter.start_date, None);
    }

    #[test]
    fn dashboard_defaults_differ_by_period() {
        assert_eq!(Filter::contracts().period, Period::ThisMonth);
        assert_eq!(Filter::properties().period, Period::All);
        assert_eq!(Filter::engagements().period, Period::ThisMonth);
    }

    #[test]
    fn granularity_aliases_and_fallback() {
        assert_eq!(GranularityChoice::parse("weekly"), GranularityChoice::Fixed(Granularity::Week));
        assert_eq!(GranularityChoice::parse("Day"), GranularityChoice::Fixed(Granularity::Day));
        assert_eq!(GranularityChoice::parse("auto"), GranularityChoice::Auto);
        assert_eq!(
            GranularityChoice::parse("fortnight"),
            GranularityChoice::Fixed(Granularity::Month)
        );
    }

    #[test]
    fn unknown_periods_are_unbounded() {
        assert_eq!(Period::parse("last-quarter"), Period::LastQuarter);
        assert_eq!(Period::parse("forever"), Period::All);
        let filter: Filter = serde_json::from_str(r#"{"period": "someday"}"#).expect("filter json");
        assert_eq!(filter.period, Period::All);
    }

    #[test]
    fn filters_deserialize_with_defaults() {
        let filter: Filter = serde_json::from_str(
            r#"{"period": "custom", "start_date": "2024-01-01", "granularity": "weekly", "purpose": "aluguel"}"#,
        )
        .expect("filter json");
        assert_eq!(filter.period, Period::Custom);
        assert_eq!(filter.start_date.as_deref(), Some("2024-01-01"));
        assert_eq!(filter.end_date, None);
        assert_eq!(filter.granularity, GranularityChoice::Fixed(Granularity::Week));
        assert_eq!(filter.purpose, Some(Purpose::Rent));
    }

    #[test]
    fn purpose_json_accepts_sentinels_and_any_case() {
        let everyone: Filter =
            serde_json::from_str(r#"{"period": "all", "purpose": "todos"}"#).expect("filter json");
        assert_eq!(everyone.purpose, None);

        let sale: Filter = serde_json::from_str(r#"{"purpose": "Venda"}"#).expect("filter json");
        assert_eq!(sale.purpose, Some(Purpose::Sale));

        let blank: Filter = serde_json::from_str(r#"{"purpose": ""}"#).expect("filter json");
        assert_eq!(blank.purpose, None);

        let null: Filter = serde_json::from_str(r#"{"purpose": null}"#).expect("filter json");
        assert_eq!(null.purpose, None);
    }
}
