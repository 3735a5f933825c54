use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::buckets::{resolve_granularity, Series};
use crate::filter::{Filter, Purpose};
use crate::models::{fields::engagement, Bucket, Row};
use crate::normalize::{
    classify, display_text, extract_ids, first_date, fold, normalize_text, KeywordRule,
};
use crate::range::DateInterval;

pub const NO_COLLABORATOR: &str = "Sem responsável";
pub const DEFAULT_TOP_PROPERTIES: usize = 10;

const QUALIFIED_PHASES: &[&str] = &["sele", "qualific", "lead", "visita", "proposta", "negocio"];
const NOT_QUALIFIED: &[&str] = &["0", "nao"];
const UNDEFINED_TEMPERATURE: &str = "indefinido";
const DEAL_CLOSED: &str = "negocio realizado";
const DISCARDED: &str = "descart";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Site,
    #[serde(rename = "Viva Real")]
    VivaReal,
    #[serde(rename = "OLX")]
    Olx,
    #[serde(rename = "Imóvel Web")]
    ImovelWeb,
    Facebook,
    GrupoZap,
    #[serde(rename = "Chave Fácil")]
    ChaveFacil,
    #[serde(rename = "Indicação")]
    Referral,
    #[serde(rename = "Placas/Faixas")]
    Signage,
    #[serde(rename = "Outros")]
    Other,
}

impl Channel {
    pub fn label(self) -> &'static str {
        match self {
            Channel::Site => "Site",
            Channel::VivaReal => "Viva Real",
            Channel::Olx => "OLX",
            Channel::ImovelWeb => "Imóvel Web",
            Channel::Facebook => "Facebook",
            Channel::GrupoZap => "GrupoZap",
            Channel::ChaveFacil => "Chave Fácil",
            Channel::Referral => "Indicação",
            Channel::Signage => "Placas/Faixas",
            Channel::Other => "Outros",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiscardReason {
    #[serde(rename = "Valor muito alto")]
    Price,
    #[serde(rename = "Atendimento duplicado")]
    Duplicate,
    #[serde(rename = "Alugou/comprou com terceiros")]
    LostToCompetitor,
    #[serde(rename = "Contato inválido")]
    InvalidContact,
    #[serde(rename = "Desistência")]
    Withdrawal,
    #[serde(rename = "Indecisão")]
    Indecision,
    #[serde(rename = "Não responde contato")]
    Unresponsive,
    #[serde(rename = "Imóvel indisponível")]
    Unavailable,
    #[serde(rename = "Outros")]
    Other,
}

impl DiscardReason {
    pub fn label(self) -> &'static str {
        match self {
            DiscardReason::Price => "Valor muito alto",
            DiscardReason::Duplicate => "Atendimento duplicado",
            DiscardReason::LostToCompetitor => "Alugou/comprou com terceiros",
            DiscardReason::InvalidContact => "Contato inválido",
            DiscardReason::Withdrawal => "Desistência",
            DiscardReason::Indecision => "Indecisão",
            DiscardReason::Unresponsive => "Não responde contato",
            DiscardReason::Unavailable => "Imóvel indisponível",
            DiscardReason::Other => "Outros",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FunnelStageKind {
    Leads,
    #[serde(rename = "Qualificados")]
    Qualified,
    #[serde(rename = "Visitas realizadas")]
    Visited,
    #[serde(rename = "Propostas recebidas")]
    Proposed,
    #[serde(rename = "Negócios fechados")]
    Closed,
}

impl FunnelStageKind {
    pub fn label(self) -> &'static str {
        match self {
            FunnelStageKind::Leads => "Leads",
            FunnelStageKind::Qualified => "Qualificados",
            FunnelStageKind::Visited => "Visitas realizadas",
            FunnelStageKind::Proposed => "Propostas recebidas",
            FunnelStageKind::Closed => "Negócios fechados",
        }
    }
}

const CHANNEL_RULES: &[KeywordRule<Channel>] = &[
    KeywordRule::any(&["site"], Channel::Site),
    KeywordRule::any(&["viva real"], Channel::VivaReal),
    KeywordRule::any(&["olx"], Channel::Olx),
    KeywordRule::any(&["imovel web"], Channel::ImovelWeb),
    KeywordRule::any(&["facebook"], Channel::Facebook),
    KeywordRule::any(&["grupozap", "grupo zap"], Channel::GrupoZap),
    KeywordRule::any(&["chave facil"], Channel::ChaveFacil),
    KeywordRule::any(&["indicacao"], Channel::Referral),
    KeywordRule::any(&["placa", "faixa"], Channel::Signage),
];

const DISCARD_RULES: &[KeywordRule<DiscardReason>] = &[
    KeywordRule::any(&["valor"], DiscardReason::Price),
    KeywordRule::any(&["duplicado"], DiscardReason::Duplicate),
    KeywordRule::with_all(&["comprou", "alugou"], &["terceiros"], DiscardReason::LostToCompetitor),
    KeywordRule::any(&["contato inv"], DiscardReason::InvalidContact),
    KeywordRule::any(&["desist"], DiscardReason::Withdrawal),
    KeywordRule::any(&["indecis"], DiscardReason::Indecision),
    KeywordRule::any(&["nao responde"], DiscardReason::Unresponsive),
    KeywordRule::any(&["indispon"], DiscardReason::Unavailable),
];

const PURPOSE_RULES: &[KeywordRule<Purpose>] = &[
    KeywordRule::any(&["venda"], Purpose::Sale),
    KeywordRule::any(&["alug"], Purpose::Rent),
];

/// Inclusion timestamp, falling back to the last interaction.
pub fn engagement_date(row: &Row) -> Option<NaiveDateTime> {
    first_date(engagement::DATES.iter().map(|field| row.get(field)))
}

pub fn is_qualified(row: &Row) -> bool {
    let qualification = normalize_text(row.get(engagement::QUALIFICATION));
    if !qualification.is_empty() && !NOT_QUALIFIED.contains(&qualification.as_str()) {
        return true;
    }

    let temperature = normalize_text(row.get(engagement::TEMPERATURE));
    if !temperature.is_empty() && temperature != UNDEFINED_TEMPERATURE {
        return true;
    }

    let phase = normalize_text(row.get(engagement::PHASE));
    QUALIFIED_PHASES.iter().any(|keyword| phase.contains(keyword))
}

pub fn cart_properties(row: &Row) -> Vec<String> {
    extract_ids(row.get(engagement::CART_PROPERTIES))
}

pub fn visited_properties(row: &Row) -> Vec<String> {
    extract_ids(row.get(engagement::VISIT_PROPERTIES))
}

pub fn proposed_properties(row: &Row) -> Vec<String> {
    extract_ids(row.get(engagement::PROPOSAL_PROPERTIES))
}

pub fn is_visited(row: &Row) -> bool {
    !visited_properties(row).is_empty()
}

pub fn is_proposed(row: &Row) -> bool {
    !proposed_properties(row).is_empty()
}

pub fn is_closed(row: &Row) -> bool {
    [engagement::STATUS, engagement::PHASE, engagement::LAST_INTERACTION]
        .iter()
        .any(|field| normalize_text(row.get(field)).contains(DEAL_CLOSED))
}

pub fn channel(row: &Row) -> Channel {
    let source = normalize_text(row.first_filled(engagement::SOURCES));
    classify(&source, CHANNEL_RULES).unwrap_or(Channel::Other)
}

pub fn is_discarded(row: &Row) -> bool {
    normalize_text(row.get(engagement::STATUS)).contains(DISCARDED)
}

/// `None` unless the engagement was discarded.
pub fn discard_reason(row: &Row) -> Option<DiscardReason> {
    if !is_discarded(row) {
        return None;
    }
    let detail = normalize_text(row.first_filled(engagement::DISCARD_DETAILS));
    Some(classify(&detail, DISCARD_RULES).unwrap_or(DiscardReason::Other))
}

pub fn purpose(row: &Row) -> Purpose {
    let raw = normalize_text(row.get(engagement::PURPOSE));
    classify(&raw, PURPOSE_RULES).unwrap_or(Purpose::Other)
}

pub fn collaborator(row: &Row) -> String {
    let name = display_text(row.get(engagement::BROKER));
    if name.is_empty() {
        NO_COLLABORATOR.to_string()
    } else {
        name
    }
}

/// Date, purpose and collaborator constraints of `filter` against one row.
pub fn matches(row: &Row, interval: &DateInterval, filter: &Filter) -> bool {
    if !interval.contains_opt(engagement_date(row)) {
        return false;
    }
    if let Some(wanted) = filter.purpose {
        if purpose(row) != wanted {
            return false;
        }
    }
    if let Some(wanted) = filter.collaborator() {
        if collaborator(row) != wanted {
            return false;
        }
    }
    true
}

/// Rent and sale engagement sheets, kept apart the way they are uploaded.
#[derive(Debug, Clone, Copy)]
pub struct EngagementSources<'a> {
    pub rent: &'a [Row],
    pub sale: &'a [Row],
}

impl<'a> EngagementSources<'a> {
    pub fn new(rent: &'a [Row], sale: &'a [Row]) -> Self {
        Self { rent, sale }
    }

    /// The sheet matching `purpose`, or both concatenated.
    pub fn select(&self, purpose: Option<Purpose>) -> Cow<'a, [Row]> {
        match purpose {
            Some(Purpose::Rent) => Cow::Borrowed(self.rent),
            Some(Purpose::Sale) => Cow::Borrowed(self.sale),
            _ if self.sale.is_empty() => Cow::Borrowed(self.rent),
            _ if self.rent.is_empty() => Cow::Borrowed(self.sale),
            _ => Cow::Owned(self.rent.iter().chain(self.sale).cloned().collect()),
        }
    }

    /// Distinct named collaborators across both sheets, alphabetically.
    pub fn collaborators(&self) -> Vec<String> {
        let names: BTreeSet<(String, String)> = self
            .rent
            .iter()
            .chain(self.sale)
            .map(|row| display_text(row.get(engagement::BROKER)))
            .filter(|name| !name.is_empty())
            .map(|name| (fold(&name), name))
            .collect();
        names.into_iter().map(|(_, name)| name).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStage {
    pub stage: FunnelStageKind,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginRow {
    pub channel: Channel,
    pub leads: usize,
    pub closed: usize,
    pub conversion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoRow {
    pub reason: DiscardReason,
    pub count: usize,
    pub cumulative: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopPropertyRow {
    pub id: String,
    pub leads: usize,
    pub clicks: usize,
    pub visits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementMetrics<'a> {
    #[serde(skip)]
    pub rows: Vec<&'a Row>,
    pub funnel_stages: Vec<FunnelStage>,
    pub conversion_rate: f64,
    pub origin_data: Vec<OriginRow>,
    pub pareto_data: Vec<ParetoRow>,
    pub top_properties: Vec<TopPropertyRow>,
}

impl EngagementMetrics<'_> {
    pub fn stage(&self, kind: FunnelStageKind) -> usize {
        self.funnel_stages
            .iter()
            .find(|stage| stage.stage == kind)
            .map_or(0, |stage| stage.value)
    }
}

fn percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Counts per key in first-seen order, so equal counts keep input order
/// after the stable sort.
struct OrderedCounter<K> {
    positions: HashMap<K, usize>,
    entries: Vec<(K, usize)>,
}

impl<K: Eq + Hash + Clone> OrderedCounter<K> {
    fn new() -> Self {
        Self {
            positions: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn slot(&mut self, key: &K) -> usize {
        if let Some(position) = self.positions.get(key) {
            return *position;
        }
        self.entries.push((key.clone(), 0));
        self.positions.insert(key.clone(), self.entries.len() - 1);
        self.entries.len() - 1
    }

    fn add(&mut self, key: &K) {
        let position = self.slot(key);
        self.entries[position].1 += 1;
    }

    fn get(&self, key: &K) -> usize {
        self.positions
            .get(key)
            .map_or(0, |position| self.entries[*position].1)
    }

    fn into_sorted(mut self) -> Vec<(K, usize)> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
    }
}

pub fn funnel(rows: &[&Row]) -> Vec<FunnelStage> {
    let count = |predicate: fn(&Row) -> bool| rows.iter().filter(|row| predicate(row)).count();
    vec![
        FunnelStage {
            stage: FunnelStageKind::Leads,
            value: rows.len(),
        },
        FunnelStage {
            stage: FunnelStageKind::Qualified,
            value: count(is_qualified),
        },
        FunnelStage {
            stage: FunnelStageKind::Visited,
            value: count(is_visited),
        },
        FunnelStage {
            stage: FunnelStageKind::Proposed,
            value: count(is_proposed),
        },
        FunnelStage {
            stage: FunnelStageKind::Closed,
            value: count(is_closed),
        },
    ]
}

pub fn origin(rows: &[&Row]) -> Vec<OriginRow> {
    let mut leads = OrderedCounter::new();
    let mut closed: HashMap<Channel, usize> = HashMap::new();

    for row in rows {
        let channel = channel(row);
        leads.add(&channel);
        if is_closed(row) {
            *closed.entry(channel).or_insert(0) += 1;
        }
    }

    leads
        .into_sorted()
        .into_iter()
        .map(|(channel, leads)| {
            let closed = closed.get(&channel).copied().unwrap_or(0);
            OriginRow {
                channel,
                leads,
                closed,
                conversion: percent(closed, leads),
            }
        })
        .collect()
}

/// Discard reasons by frequency with a running cumulative share.
pub fn pareto(rows: &[&Row]) -> Vec<ParetoRow> {
    let mut counts = OrderedCounter::new();
    for reason in rows.iter().filter_map(|row| discard_reason(row)) {
        counts.add(&reason);
    }
    pareto_from_counts(counts.into_sorted())
}

/// `counts` must already be sorted, largest first.
pub fn pareto_from_counts(counts: Vec<(DiscardReason, usize)>) -> Vec<ParetoRow> {
    let total: usize = counts.iter().map(|(_, count)| count).sum();
    let mut running = 0;
    counts
        .into_iter()
        .map(|(reason, count)| {
            running += count;
            ParetoRow {
                reason,
                count,
                cumulative: percent(running, total),
            }
        })
        .collect()
}

fn distinct<'a>(ids: impl IntoIterator<Item = &'a String>) -> Vec<&'a String> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Properties ranked by how many engagements touched them. A row counts once
/// per property however many of its lists name it.
pub fn top_properties(rows: &[&Row], limit: usize) -> Vec<TopPropertyRow> {
    let mut leads = OrderedCounter::new();
    let mut clicks = OrderedCounter::new();
    let mut visits = OrderedCounter::new();

    for row in rows {
        let cart = cart_properties(row);
        let visited = visited_properties(row);
        let proposed = proposed_properties(row);

        for id in distinct(&cart) {
            clicks.add(id);
        }
        for id in distinct(&visited) {
            visits.add(id);
        }
        for id in distinct(cart.iter().chain(&visited).chain(&proposed)) {
            leads.add(id);
        }
    }

    leads
        .into_sorted()
        .into_iter()
        .take(limit)
        .map(|(id, count)| TopPropertyRow {
            clicks: clicks.get(&id),
            visits: visits.get(&id),
            leads: count,
            id,
        })
        .collect()
}

pub fn compute_metrics<'a>(
    rows: &'a [Row],
    interval: &DateInterval,
    filter: &Filter,
) -> EngagementMetrics<'a> {
    compute_metrics_limited(rows, interval, filter, DEFAULT_TOP_PROPERTIES)
}

pub fn compute_metrics_limited<'a>(
    rows: &'a [Row],
    interval: &DateInterval,
    filter: &Filter,
    top_limit: usize,
) -> EngagementMetrics<'a> {
    let filtered: Vec<&Row> = rows
        .iter()
        .filter(|row| matches(row, interval, filter))
        .collect();

    let funnel_stages = funnel(&filtered);
    let leads = filtered.len();
    let closed = funnel_stages
        .iter()
        .find(|stage| stage.stage == FunnelStageKind::Closed)
        .map_or(0, |stage| stage.value);

    let metrics = EngagementMetrics {
        conversion_rate: percent(closed, leads),
        origin_data: origin(&filtered),
        pareto_data: pareto(&filtered),
        top_properties: top_properties(&filtered, top_limit),
        funnel_stages,
        rows: filtered,
    };

    tracing::debug!(
        rows = rows.len(),
        leads,
        closed,
        discards = metrics.pareto_data.iter().map(|row| row.count).sum::<usize>(),
        "engagement metrics computed"
    );

    metrics
}

/// Engagement count per bucket.
///
/// Bounded intervals are gap-filled end to end; open ones between the first
/// and last observed bucket.
pub fn compute_timeline(
    rows: &[Row],
    interval: &DateInterval,
    filter: &Filter,
    now: NaiveDateTime,
) -> Vec<Bucket<usize>> {
    let granularity = resolve_granularity(interval, filter.granularity);
    let dates: Vec<NaiveDateTime> = rows
        .iter()
        .filter(|row| matches(row, interval, filter))
        .filter_map(engagement_date)
        .collect();

    let observed = dates.iter().min().zip(dates.iter().max());
    let mut series: Series<usize> = match observed {
        Some((first, last)) if !interval.is_bounded() => {
            Series::spanning(first.date(), last.date(), granularity)
        }
        _ => Series::over(interval, granularity, now),
    };

    for at in dates {
        if let Some(slot) = series.slot_mut(at) {
            *slot += 1;
        }
    }

    series.into_buckets()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::Granularity;
    use crate::filter::{FilterUpdate, GranularityChoice};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn january() -> DateInterval {
        DateInterval::days(day(2024, 1, 1), day(2024, 1, 31))
    }

    fn lead(date: &str) -> Row {
        Row::new().with(engagement::INCLUDED_AT, date)
    }

    fn refs(rows: &[Row]) -> Vec<&Row> {
        rows.iter().collect()
    }

    #[test]
    fn qualification_signals() {
        assert!(is_qualified(&lead("2024-01-02").with(engagement::QUALIFICATION, "Sim")));
        assert!(!is_qualified(&lead("2024-01-02").with(engagement::QUALIFICATION, "Não")));
        assert!(!is_qualified(&lead("2024-01-02").with(engagement::QUALIFICATION, "0")));
        assert!(is_qualified(&lead("2024-01-02").with(engagement::TEMPERATURE, "Quente")));
        assert!(!is_qualified(&lead("2024-01-02").with(engagement::TEMPERATURE, "Indefinido")));
        assert!(is_qualified(&lead("2024-01-02").with(engagement::PHASE, "Em Seleção")));
        assert!(is_qualified(&lead("2024-01-02").with(engagement::PHASE, "Negócio")));
        assert!(!is_qualified(&lead("2024-01-02").with(engagement::PHASE, "Novo")));
    }

    #[test]
    fn closed_deals_match_any_status_column() {
        assert!(is_closed(&lead("2024-01-02").with(engagement::STATUS, "Negócio realizado")));
        let noted = lead("2024-01-02")
            .with(engagement::LAST_INTERACTION, "NEGOCIO REALIZADO em 10/01");
        assert!(is_closed(&noted));
        assert!(!is_closed(&lead("2024-01-02").with(engagement::STATUS, "Em andamento")));
    }

    #[test]
    fn channels_follow_ordered_taxonomy() {
        let via = |source: &str| channel(&Row::new().with(engagement::MEDIA, source));
        assert_eq!(via("Site próprio"), Channel::Site);
        assert_eq!(via("Portal Viva Real"), Channel::VivaReal);
        assert_eq!(via("Im&oacute;vel Web"), Channel::ImovelWeb);
        assert_eq!(via("Grupo Zap"), Channel::GrupoZap);
        assert_eq!(via("Indicação de cliente"), Channel::Referral);
        assert_eq!(via("Faixa na fachada"), Channel::Signage);
        assert_eq!(via("Rádio"), Channel::Other);
        assert_eq!(channel(&Row::new()), Channel::Other);
        let referral_only = Row::new()
            .with(engagement::MEDIA, "")
            .with(engagement::REFERRAL, "OLX");
        assert_eq!(channel(&referral_only), Channel::Olx);
    }

    #[test]
    fn taxonomies_serialize_as_their_labels() {
        let channels = [Channel::Site, Channel::ImovelWeb, Channel::Referral, Channel::Other];
        for channel in channels {
            let json = serde_json::to_value(channel).expect("serialize channel");
            assert_eq!(json, channel.label());
        }
        let reasons = [DiscardReason::Price, DiscardReason::LostToCompetitor, DiscardReason::Other];
        for reason in reasons {
            let json = serde_json::to_value(reason).expect("serialize reason");
            assert_eq!(json, reason.label());
        }
        let stages = [FunnelStageKind::Leads, FunnelStageKind::Closed];
        for stage in stages {
            let json = serde_json::to_value(stage).expect("serialize stage");
            assert_eq!(json, stage.label());
        }
    }

    #[test]
    fn discard_reasons_only_for_discarded_rows() {
        let discarded = |detail: &str| {
            lead("2024-01-02")
                .with(engagement::STATUS, "Descartado")
                .with(engagement::DISCARD_REASON, detail)
        };
        let reason = |detail: &str| discard_reason(&discarded(detail));
        assert_eq!(reason("Valor acima do orçamento"), Some(DiscardReason::Price));
        assert_eq!(reason("Alugou com terceiros"), Some(DiscardReason::LostToCompetitor));
        assert_eq!(reason("Comprou outro imóvel"), Some(DiscardReason::Other));
        assert_eq!(reason("Cliente não responde"), Some(DiscardReason::Unresponsive));
        assert_eq!(reason(""), Some(DiscardReason::Other));
        let kept = lead("2024-01-02").with(engagement::DISCARD_REASON, "Valor");
        assert_eq!(discard_reason(&kept), None);

        let from_last_interaction = lead("2024-01-02")
            .with(engagement::STATUS, "descartado")
            .with(engagement::LAST_INTERACTION, "Desistiu da mudança");
        assert_eq!(discard_reason(&from_last_interaction), Some(DiscardReason::Withdrawal));
    }

    #[test]
    fn purpose_and_collaborator_defaults() {
        assert_eq!(purpose(&Row::new().with(engagement::PURPOSE, "Venda")), Purpose::Sale);
        assert_eq!(purpose(&Row::new().with(engagement::PURPOSE, "Aluguel")), Purpose::Rent);
        assert_eq!(purpose(&Row::new()), Purpose::Other);
        assert_eq!(collaborator(&Row::new().with(engagement::BROKER, "  Ana  ")), "Ana");
        assert_eq!(collaborator(&Row::new()), NO_COLLABORATOR);
    }

    #[test]
    fn funnel_counts_each_stage_independently() {
        let rows = vec![
            lead("2024-01-02")
                .with(engagement::PHASE, "Proposta")
                .with(engagement::PROPOSAL_PROPERTIES, "101"),
            lead("2024-01-03").with(engagement::VISIT_PROPERTIES, "102"),
            lead("2024-01-04").with(engagement::STATUS, "Negócio realizado"),
        ];
        let metrics = compute_metrics(&rows, &january(), &Filter::engagements());
        assert_eq!(metrics.stage(FunnelStageKind::Leads), 3);
        // The visit-only row carries no qualification signal.
        assert_eq!(metrics.stage(FunnelStageKind::Qualified), 1);
        assert_eq!(metrics.stage(FunnelStageKind::Visited), 1);
        assert_eq!(metrics.stage(FunnelStageKind::Proposed), 1);
        assert_eq!(metrics.stage(FunnelStageKind::Closed), 1);
        assert!((metrics.conversion_rate - 33.333).abs() < 0.01);
    }

    #[test]
    fn empty_inputs_produce_zeroed_metrics() {
        let metrics = compute_metrics(&[], &january(), &Filter::engagements());
        assert_eq!(metrics.funnel_stages.len(), 5);
        assert!(metrics.funnel_stages.iter().all(|stage| stage.value == 0));
        assert_eq!(metrics.conversion_rate, 0.0);
        assert!(metrics.origin_data.is_empty());
        assert!(metrics.pareto_data.is_empty());
        assert!(metrics.top_properties.is_empty());
    }

    #[test]
    fn filters_apply_date_purpose_and_collaborator() {
        let rows = vec![
            lead("2024-01-02").with(engagement::BROKER, "Ana").with(engagement::PURPOSE, "Aluguel"),
            lead("2024-01-03")
                .with(engagement::BROKER, "Bruno")
                .with(engagement::PURPOSE, "Aluguel"),
            lead("2024-01-04").with(engagement::BROKER, "Ana").with(engagement::PURPOSE, "Venda"),
            lead("2024-02-04").with(engagement::BROKER, "Ana").with(engagement::PURPOSE, "Aluguel"),
            Row::new().with(engagement::BROKER, "Ana"),
        ];
        let filter = Filter::engagements().merged(FilterUpdate {
            collaborator: Some("Ana".to_string()),
            purpose: Some("aluguel".to_string()),
            ..FilterUpdate::default()
        });
        let metrics = compute_metrics(&rows, &january(), &filter);
        assert_eq!(metrics.rows.len(), 1);

        let everyone = compute_metrics(&rows, &DateInterval::UNBOUNDED, &Filter::engagements());
        assert_eq!(everyone.rows.len(), 4);
    }

    #[test]
    fn origin_sorted_by_leads_with_conversion() {
        let rows = vec![
            lead("2024-01-02").with(engagement::MEDIA, "OLX"),
            lead("2024-01-02")
                .with(engagement::MEDIA, "Site")
                .with(engagement::STATUS, "Negócio realizado"),
            lead("2024-01-03").with(engagement::MEDIA, "site"),
            lead("2024-01-04").with(engagement::MEDIA, "Site"),
        ];
        let origin = origin(&refs(&rows));
        assert_eq!(origin[0].channel, Channel::Site);
        assert_eq!(origin[0].leads, 3);
        assert_eq!(origin[0].closed, 1);
        assert!((origin[0].conversion - 33.333).abs() < 0.01);
        assert_eq!(origin[1].channel, Channel::Olx);
        assert_eq!(origin[1].conversion, 0.0);
    }

    #[test]
    fn pareto_accumulates_share_of_discards() {
        let mut rows = Vec::new();
        for (detail, count) in [("Não responde", 3), ("Valor alto", 5), ("Mudou de ideia", 2)] {
            for _ in 0..count {
                rows.push(
                    lead("2024-01-05")
                        .with(engagement::STATUS, "Descartado")
                        .with(engagement::DISCARD_REASON, detail),
                );
            }
        }
        rows.push(lead("2024-01-05").with(engagement::STATUS, "Ativo"));

        let pareto = pareto(&refs(&rows));
        let summary: Vec<(DiscardReason, usize, f64)> =
            pareto.iter().map(|row| (row.reason, row.count, row.cumulative)).collect();
        assert_eq!(summary.len(), 3);
        assert_eq!((summary[0].0, summary[0].1), (DiscardReason::Price, 5));
        assert!((summary[0].2 - 50.0).abs() < 0.001);
        assert_eq!((summary[1].0, summary[1].1), (DiscardReason::Unresponsive, 3));
        assert!((summary[1].2 - 80.0).abs() < 0.001);
        assert_eq!((summary[2].0, summary[2].1), (DiscardReason::Other, 2));
        assert!((summary[2].2 - 100.0).abs() < 0.001);
    }

    #[test]
    fn top_properties_count_each_row_once_per_property() {
        let rows = vec![
            lead("2024-01-02")
                .with(engagement::CART_PROPERTIES, "101, 202")
                .with(engagement::VISIT_PROPERTIES, "101"),
            lead("2024-01-03").with(engagement::PROPOSAL_PROPERTIES, "202"),
            lead("2024-01-04").with(engagement::CART_PROPERTIES, "202"),
        ];
        let top = top_properties(&refs(&rows), 10);
        assert_eq!(
            top,
            vec![
                TopPropertyRow { id: "202".to_string(), leads: 3, clicks: 2, visits: 0 },
                TopPropertyRow { id: "101".to_string(), leads: 1, clicks: 1, visits: 1 },
            ]
        );
    }

    #[test]
    fn top_properties_respect_limit() {
        let rows: Vec<Row> = (0..15)
            .map(|id| lead("2024-01-02").with(engagement::CART_PROPERTIES, format!("{}", 100 + id)))
            .collect();
        assert_eq!(top_properties(&refs(&rows), DEFAULT_TOP_PROPERTIES).len(), 10);
    }

    #[test]
    fn timeline_is_gap_filled_over_bounded_interval() {
        let rows = vec![lead("2024-01-02"), lead("2024-01-02"), lead("2024-01-20")];
        let filter = Filter {
            granularity: GranularityChoice::Fixed(Granularity::Week),
            ..Filter::engagements()
        };
        let now = day(2024, 2, 1).and_hms_opt(9, 0, 0).expect("valid time");
        let timeline = compute_timeline(&rows, &january(), &filter, now);
        assert_eq!(timeline.len(), 5);
        let counts: Vec<usize> = timeline.iter().map(|bucket| bucket.value).collect();
        assert_eq!(counts, vec![2, 0, 1, 0, 0]);
    }

    #[test]
    fn timeline_over_open_interval_spans_observations() {
        let rows = vec![lead("2023-11-20"), lead("2024-02-03")];
        let now = day(2024, 6, 1).and_hms_opt(9, 0, 0).expect("valid time");
        let filter = Filter::engagements();
        let timeline = compute_timeline(&rows, &DateInterval::UNBOUNDED, &filter, now);
        let keys: Vec<&str> = timeline.iter().map(|bucket| bucket.key.as_str()).collect();
        assert_eq!(keys, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);

        let empty = compute_timeline(&[], &DateInterval::UNBOUNDED, &filter, now);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].key, "2024-06");
        assert_eq!(empty[0].value, 0);
    }

    #[test]
    fn sources_select_by_purpose_and_list_collaborators() {
        let rent = vec![lead("2024-01-02").with(engagement::BROKER, "Érica"), lead("2024-01-02")];
        let sale = vec![
            lead("2024-01-02").with(engagement::BROKER, "bruno"),
            lead("2024-01-02").with(engagement::BROKER, "Érica"),
        ];
        let sources = EngagementSources::new(&rent, &sale);
        assert_eq!(sources.select(Some(Purpose::Rent)).len(), 2);
        assert_eq!(sources.select(Some(Purpose::Sale)).len(), 2);
        assert_eq!(sources.select(None).len(), 4);
        assert_eq!(sources.collaborators(), vec!["bruno".to_string(), "Érica".to_string()]);
    }

    fn engagement_strategy() -> impl Strategy<Value = Row> {
        (
            1u32..=28,
            prop::sample::select(vec!["Site", "OLX", "Indicação", "Rádio", ""]),
            prop::sample::select(vec!["Descartado", "Negócio realizado", "Ativo", ""]),
            prop::sample::select(vec!["Valor", "Duplicado", "Não responde", "sem motivo"]),
            prop::collection::vec(100u32..110, 0..4),
        )
            .prop_map(|(date, media, status, reason, ids)| {
                let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                lead(&format!("2024-01-{date:02}"))
                    .with(engagement::MEDIA, media)
                    .with(engagement::STATUS, status)
                    .with(engagement::DISCARD_REASON, reason)
                    .with(engagement::CART_PROPERTIES, ids.join(","))
            })
    }

    proptest! {
        #[test]
        fn metrics_are_idempotent_and_bounded(rows in prop::collection::vec(engagement_strategy(), 0..40)) {
            let filter = Filter::engagements();
            let first = compute_metrics(&rows, &january(), &filter);
            let second = compute_metrics(&rows, &january(), &filter);
            prop_assert_eq!(&first, &second);

            prop_assert_eq!(first.stage(FunnelStageKind::Leads), rows.len());
            let origin_total: usize = first.origin_data.iter().map(|row| row.leads).sum();
            prop_assert_eq!(origin_total, rows.len());
            for pair in first.pareto_data.windows(2) {
                prop_assert!(pair[0].count >= pair[1].count);
                prop_assert!(pair[0].cumulative <= pair[1].cumulative);
            }
            if let Some(last) = first.pareto_data.last() {
                prop_assert!((last.cumulative - 100.0).abs() < 0.001);
            }
            prop_assert!(first.top_properties.len() <= DEFAULT_TOP_PROPERTIES);
        }
    }
}
