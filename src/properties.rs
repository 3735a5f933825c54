use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{fields::property, Row};
use crate::normalize::{
    classify, first_date, normalize_text, parse_monetary_value, parse_score, KeywordRule,
};
use crate::range::DateInterval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Residential,
    Commercial,
    Mixed,
}

const DESTINATION_RULES: &[KeywordRule<Destination>] = &[
    KeywordRule::any(&["resid"], Destination::Residential),
    KeywordRule::any(&["comerc"], Destination::Commercial),
    KeywordRule::any(&["misto"], Destination::Mixed),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreBand {
    Incomplete,
    Fair,
    Good,
    VeryGood,
}

impl ScoreBand {
    pub fn of(score: f64) -> Self {
        if score < 50.0 {
            ScoreBand::Incomplete
        } else if score < 70.0 {
            ScoreBand::Fair
        } else if score < 90.0 {
            ScoreBand::Good
        } else {
            ScoreBand::VeryGood
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreBand::Incomplete => "Incompleto",
            ScoreBand::Fair => "Médio",
            ScoreBand::Good => "Bom",
            ScoreBand::VeryGood => "Muito bom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DestinationDistribution {
    pub residential: usize,
    pub commercial: usize,
    pub mixed: usize,
}

impl DestinationDistribution {
    fn add(&mut self, destination: Destination) {
        match destination {
            Destination::Residential => self.residential += 1,
            Destination::Commercial => self.commercial += 1,
            Destination::Mixed => self.mixed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScoreBands {
    pub incomplete: usize,
    pub fair: usize,
    pub good: usize,
    pub very_good: usize,
}

impl ScoreBands {
    fn add(&mut self, band: ScoreBand) {
        match band {
            ScoreBand::Incomplete => self.incomplete += 1,
            ScoreBand::Fair => self.fair += 1,
            ScoreBand::Good => self.good += 1,
            ScoreBand::VeryGood => self.very_good += 1,
        }
    }

    pub fn get(&self, band: ScoreBand) -> usize {
        match band {
            ScoreBand::Incomplete => self.incomplete,
            ScoreBand::Fair => self.fair,
            ScoreBand::Good => self.good,
            ScoreBand::VeryGood => self.very_good,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyOptions {
    /// Keep only listings whose status says they can be advertised for rent.
    pub advertised_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyKpis<'a> {
    pub total: usize,
    pub total_value: f64,
    pub destination_distribution: DestinationDistribution,
    pub score_bands: ScoreBands,
    #[serde(skip)]
    pub items: Vec<&'a Row>,
}

pub fn property_date(row: &Row) -> Option<NaiveDateTime> {
    first_date(property::DATES.iter().map(|field| row.get(field)))
}

pub fn destination(row: &Row) -> Option<Destination> {
    classify(&normalize_text(row.get(property::DESTINATION)), DESTINATION_RULES)
}

pub fn is_advertised(row: &Row) -> bool {
    let status = normalize_text(row.first_present(property::STATUSES));
    if status.is_empty() || status.contains("indisponivel") {
        return false;
    }
    status.contains("em desocupacao") || status.contains("vago") || status.contains("disponivel")
}

/// An unbounded interval keeps undated listings; any bound drops them.
pub fn compute_kpis<'a>(
    rows: &'a [Row],
    interval: &DateInterval,
    options: PropertyOptions,
) -> PropertyKpis<'a> {
    let items: Vec<&Row> = rows
        .iter()
        .filter(|row| interval.is_unbounded() || interval.contains_opt(property_date(row)))
        .filter(|row| !options.advertised_only || is_advertised(row))
        .collect();

    let mut destination_distribution = DestinationDistribution::default();
    let mut score_bands = ScoreBands::default();
    let mut total_value = 0.0;

    for row in &items {
        total_value += parse_monetary_value(row.get(property::VALUE));
        if let Some(destination) = destination(row) {
            destination_distribution.add(destination);
        }
        score_bands.add(ScoreBand::of(parse_score(row.get(property::SCORE))));
    }

    tracing::debug!(
        rows = rows.len(),
        kept = items.len(),
        advertised_only = options.advertised_only,
        total_value,
        "property kpis computed"
    );

    PropertyKpis {
        total: items.len(),
        total_value,
        destination_distribution,
        score_bands,
        items,
    }
}
