use std::collections::HashMap;
use std::fmt;

use chrono::{Months, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::buckets::{resolve_granularity, Granularity, Series};
use crate::filter::GranularityChoice;
use crate::models::{fields::contract, Bucket, Row};
use crate::normalize::{
    classify, display_text, first_date, fold, normalize_text, parse_date, parse_monetary_value,
    KeywordRule,
};
use crate::range::{start_of_month, DateInterval};

pub const NOT_INFORMED: &str = "Não informado";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuaranteeKind {
    Deposit,
    InsuranceBond,
    CapitalizationBond,
    Guarantor,
}

impl GuaranteeKind {
    pub fn label(self) -> &'static str {
        match self {
            GuaranteeKind::Deposit => "Caução",
            GuaranteeKind::InsuranceBond => "Seguro Fiança",
            GuaranteeKind::CapitalizationBond => "Título de Capitalização",
            GuaranteeKind::Guarantor => "Fiador",
        }
    }
}

const GUARANTEE_RULES: &[KeywordRule<GuaranteeKind>] = &[
    KeywordRule::any(&["cauc"], GuaranteeKind::Deposit),
    KeywordRule::any(&["seguro", "fianca"], GuaranteeKind::InsuranceBond),
    KeywordRule::any(&["titulo"], GuaranteeKind::CapitalizationBond),
    KeywordRule::any(&["fiador"], GuaranteeKind::Guarantor),
];

/// Collateral backing a contract. Unknown text passes through title-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuaranteeType {
    Known(GuaranteeKind),
    Other(String),
    NotInformed,
}

impl GuaranteeType {
    pub fn label(&self) -> &str {
        match self {
            GuaranteeType::Known(kind) => kind.label(),
            GuaranteeType::Other(text) => text,
            GuaranteeType::NotInformed => NOT_INFORMED,
        }
    }
}

impl fmt::Display for GuaranteeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for GuaranteeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

pub fn rent_value(row: &Row) -> f64 {
    parse_monetary_value(row.get(contract::RENT_VALUE))
}

pub fn guarantee_value(row: &Row) -> f64 {
    parse_monetary_value(row.get(contract::GUARANTEE_VALUE))
}

pub fn rescission_date(row: &Row) -> Option<NaiveDateTime> {
    parse_date(row.get(contract::RESCISSION_DATE))
}

/// Best available start: explicit start, then activation, then inclusion.
pub fn start_date(row: &Row) -> Option<NaiveDateTime> {
    first_date(contract::START_DATES.iter().map(|field| row.get(field)))
}

/// Folded status text; `None` only when no status column carries a value.
fn status(row: &Row) -> Option<String> {
    row.first_present(contract::STATUSES).map(|value| normalize_text(Some(value)))
}

/// No rescission date, and either no status at all or a status of exactly
/// "ativo". Any other status, blank included, is inactive.
pub fn is_active(row: &Row) -> bool {
    if rescission_date(row).is_some() {
        return false;
    }
    match status(row) {
        None => true,
        Some(status) => status == "ativo",
    }
}

pub fn is_new_in(row: &Row, interval: &DateInterval) -> bool {
    interval.contains_opt(start_date(row))
}

pub fn is_rescinded_in(row: &Row, interval: &DateInterval) -> bool {
    interval.contains_opt(rescission_date(row))
}

/// Rescinded in the period with a status of exactly "rescindido"; only these
/// hand their deposit back.
pub fn returns_deposit_in(row: &Row, interval: &DateInterval) -> bool {
    is_rescinded_in(row, interval) && status(row).as_deref() == Some("rescindido")
}

pub fn guarantee_type(row: &Row) -> GuaranteeType {
    let raw = display_text(row.first_filled(contract::GUARANTEES)).to_lowercase();
    if raw.is_empty() {
        return GuaranteeType::NotInformed;
    }
    match classify(&fold(&raw), GUARANTEE_RULES) {
        Some(kind) => GuaranteeType::Known(kind),
        None => GuaranteeType::Other(capitalize_first(&raw)),
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuaranteeShare {
    pub guarantee_type: GuaranteeType,
    pub count: usize,
    pub percent: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContractKpis {
    pub portfolio_value: f64,
    pub active_count: usize,
    pub new_count: usize,
    pub new_value: f64,
    pub average_ticket_new: f64,
    pub rescinded_count: usize,
    pub rescinded_value: f64,
    pub average_ticket_rescinded: f64,
    pub financial_churn_percent: f64,
    pub deposits_received_value: f64,
    pub deposits_returned_value: f64,
    pub guarantee_mix: Vec<GuaranteeShare>,
}

impl ContractKpis {
    pub fn guarantee(&self, kind: GuaranteeKind) -> Option<&GuaranteeShare> {
        self.guarantee_mix
            .iter()
            .find(|share| share.guarantee_type == GuaranteeType::Known(kind))
    }
}

/// Groups by guarantee type keeping first-seen order, then sorts by count.
fn group_guarantees<'a>(rows: impl Iterator<Item = &'a Row>) -> Vec<(GuaranteeType, usize, f64)> {
    let mut positions: HashMap<GuaranteeType, usize> = HashMap::new();
    let mut groups: Vec<(GuaranteeType, usize, f64)> = Vec::new();

    for row in rows {
        let kind = guarantee_type(row);
        let position = *positions.entry(kind.clone()).or_insert_with(|| {
            groups.push((kind, 0, 0.0));
            groups.len() - 1
        });
        let entry = &mut groups[position];
        entry.1 += 1;
        entry.2 += guarantee_value(row);
    }

    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
}

/// KPI set for `interval`. Portfolio value and active count ignore the
/// interval; everything else is restricted to it.
pub fn compute_kpis(rows: &[Row], interval: &DateInterval) -> ContractKpis {
    if rows.is_empty() {
        return ContractKpis::default();
    }

    let mut kpis = ContractKpis::default();

    for row in rows {
        let value = rent_value(row);

        if is_active(row) {
            kpis.active_count += 1;
            kpis.portfolio_value += value;
        }

        if is_new_in(row, interval) {
            kpis.new_count += 1;
            kpis.new_value += value;
            kpis.deposits_received_value += guarantee_value(row);
        }

        if is_rescinded_in(row, interval) {
            kpis.rescinded_count += 1;
            kpis.rescinded_value += value;
            if returns_deposit_in(row, interval) {
                kpis.deposits_returned_value += guarantee_value(row);
            }
        }
    }

    kpis.average_ticket_new = ratio(kpis.new_value, kpis.new_count as f64);
    kpis.average_ticket_rescinded = ratio(kpis.rescinded_value, kpis.rescinded_count as f64);
    kpis.financial_churn_percent = ratio(kpis.rescinded_value, kpis.portfolio_value) * 100.0;

    let new_count = kpis.new_count as f64;
    kpis.guarantee_mix = group_guarantees(rows.iter().filter(|row| is_new_in(row, interval)))
        .into_iter()
        .map(|(guarantee_type, count, value)| GuaranteeShare {
            guarantee_type,
            count,
            percent: ratio(count as f64, new_count) * 100.0,
            value,
        })
        .collect();

    tracing::debug!(
        rows = rows.len(),
        active = kpis.active_count,
        new = kpis.new_count,
        rescinded = kpis.rescinded_count,
        "contract kpis computed"
    );

    kpis
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContractPeriodTotals {
    pub new_count: usize,
    pub new_value: f64,
    pub rescinded_count: usize,
    pub rescinded_value: f64,
}

/// Window the series is drawn over: open sides default to the trailing
/// twelve months ending at `now`.
pub fn series_window(interval: &DateInterval, now: NaiveDateTime) -> DateInterval {
    let start = interval.start.unwrap_or_else(|| {
        let first = start_of_month(now.date());
        first
            .checked_sub_months(Months::new(11))
            .unwrap_or(first)
            .and_time(chrono::NaiveTime::MIN)
    });
    DateInterval::new(Some(start), Some(interval.end.unwrap_or(now)))
}

pub fn compute_series(
    rows: &[Row],
    interval: &DateInterval,
    requested: GranularityChoice,
    now: NaiveDateTime,
) -> Vec<Bucket<ContractPeriodTotals>> {
    let granularity = resolve_granularity(interval, requested);
    compute_series_with(rows, interval, granularity, now)
}

pub fn compute_series_with(
    rows: &[Row],
    interval: &DateInterval,
    granularity: Granularity,
    now: NaiveDateTime,
) -> Vec<Bucket<ContractPeriodTotals>> {
    let mut series: Series<ContractPeriodTotals> =
        Series::over(&series_window(interval, now), granularity, now);

    for row in rows {
        let value = rent_value(row);

        if let Some(started) = start_date(row).filter(|at| interval.contains(*at)) {
            if let Some(slot) = series.slot_mut(started) {
                slot.new_count += 1;
                slot.new_value += value;
            }
        }

        if let Some(rescinded) = rescission_date(row).filter(|at| interval.contains(*at)) {
            if let Some(slot) = series.slot_mut(rescinded) {
                slot.rescinded_count += 1;
                slot.rescinded_value += value;
            }
        }
    }

    series.into_buckets()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuaranteeSlice {
    pub name: GuaranteeType,
    pub value: usize,
}

/// Pie data: new contracts per guarantee type, largest first.
pub fn guarantee_breakdown(rows: &[Row], interval: &DateInterval) -> Vec<GuaranteeSlice> {
    group_guarantees(rows.iter().filter(|row| is_new_in(row, interval)))
        .into_iter()
        .map(|(name, value, _)| GuaranteeSlice { name, value })
        .collect()
}
