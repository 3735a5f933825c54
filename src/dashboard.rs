use chrono::NaiveDateTime;
use serde::Serialize;

use crate::buckets::{resolve_granularity, Granularity};
use crate::contracts::{self, ContractKpis, ContractPeriodTotals, GuaranteeSlice};
use crate::engagements::{self, EngagementMetrics, EngagementSources};
use crate::error::FilterError;
use crate::filter::Filter;
use crate::models::{Bucket, Row};
use crate::properties::{self, PropertyKpis, PropertyOptions};
use crate::range::DateInterval;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractsDashboard {
    pub filter: Filter,
    pub interval: DateInterval,
    pub granularity: Granularity,
    pub kpis: ContractKpis,
    pub series: Vec<Bucket<ContractPeriodTotals>>,
    pub guarantees: Vec<GuaranteeSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementDashboard<'a> {
    pub filter: Filter,
    pub interval: DateInterval,
    pub granularity: Granularity,
    pub metrics: EngagementMetrics<'a>,
    pub timeline: Vec<Bucket<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDashboard<'a> {
    pub filter: Filter,
    pub interval: DateInterval,
    pub rent: PropertyKpis<'a>,
    pub sale: PropertyKpis<'a>,
}

pub fn contracts_dashboard(
    rows: &[Row],
    filter: &Filter,
    now: NaiveDateTime,
) -> Result<ContractsDashboard, FilterError> {
    let interval = DateInterval::resolve_at(filter, now)?;
    let granularity = resolve_granularity(&interval, filter.granularity);

    Ok(ContractsDashboard {
        filter: filter.clone(),
        kpis: contracts::compute_kpis(rows, &interval),
        series: contracts::compute_series_with(rows, &interval, granularity, now),
        guarantees: contracts::guarantee_breakdown(rows, &interval),
        interval,
        granularity,
    })
}

/// `rows` is usually `EngagementSources::select(filter.purpose)`.
pub fn engagement_dashboard<'a>(
    rows: &'a [Row],
    filter: &Filter,
    now: NaiveDateTime,
    top_limit: usize,
) -> Result<EngagementDashboard<'a>, FilterError> {
    let interval = DateInterval::resolve_at(filter, now)?;

    Ok(EngagementDashboard {
        filter: filter.clone(),
        granularity: resolve_granularity(&interval, filter.granularity),
        metrics: engagements::compute_metrics_limited(rows, &interval, filter, top_limit),
        timeline: engagements::compute_timeline(rows, &interval, filter, now),
        interval,
    })
}

pub fn engagement_sources_dashboard(
    sources: EngagementSources<'_>,
    filter: &Filter,
    now: NaiveDateTime,
    top_limit: usize,
) -> Result<EngagementDashboard<'static>, FilterError> {
    let rows = sources.select(filter.purpose).into_owned();
    let dashboard = engagement_dashboard(&rows, filter, now, top_limit)?;
    Ok(dashboard.detached())
}

impl EngagementDashboard<'_> {
    /// Drops the borrowed detail rows so the dashboard can outlive its input.
    pub fn detached(self) -> EngagementDashboard<'static> {
        EngagementDashboard {
            filter: self.filter,
            interval: self.interval,
            granularity: self.granularity,
            metrics: EngagementMetrics {
                rows: Vec::new(),
                funnel_stages: self.metrics.funnel_stages,
                conversion_rate: self.metrics.conversion_rate,
                origin_data: self.metrics.origin_data,
                pareto_data: self.metrics.pareto_data,
                top_properties: self.metrics.top_properties,
            },
            timeline: self.timeline,
        }
    }
}

/// Rent inventory counts advertisable listings only; sale counts everything.
pub fn property_dashboard<'a>(
    rent: &'a [Row],
    sale: &'a [Row],
    filter: &Filter,
    now: NaiveDateTime,
) -> Result<PropertyDashboard<'a>, FilterError> {
    let interval = DateInterval::resolve_at(filter, now)?;

    Ok(PropertyDashboard {
        filter: filter.clone(),
        rent: properties::compute_kpis(rent, &interval, PropertyOptions { advertised_only: true }),
        sale: properties::compute_kpis(sale, &interval, PropertyOptions::default()),
        interval,
    })
}
