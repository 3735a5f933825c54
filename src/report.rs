use std::fmt::Write;

use crate::dashboard::{ContractsDashboard, EngagementDashboard, PropertyDashboard};
use crate::filter::Filter;
use crate::properties::{PropertyKpis, ScoreBand};
use crate::range::DateInterval;

fn interval_label(interval: &DateInterval) -> String {
    let side = |at: Option<chrono::NaiveDateTime>| {
        at.map(|at| at.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "…".to_string())
    };
    if interval.is_unbounded() {
        "all dates".to_string()
    } else {
        format!("{} to {}", side(interval.start), side(interval.end))
    }
}

fn write_header(output: &mut String, title: &str, filter: &Filter, interval: &DateInterval) {
    let _ = writeln!(output, "# {title}");
    let _ = writeln!(
        output,
        "Period {} ({})",
        filter.period,
        interval_label(interval)
    );
    if let Some(collaborator) = filter.collaborator() {
        let _ = writeln!(output, "Collaborator: {collaborator}");
    }
    if let Some(purpose) = filter.purpose {
        let _ = writeln!(output, "Purpose: {purpose:?}");
    }
    let _ = writeln!(output);
}

pub fn render_contracts(dashboard: &ContractsDashboard) -> String {
    let kpis = &dashboard.kpis;
    let mut output = String::new();

    write_header(&mut output, "Contracts Dashboard", &dashboard.filter, &dashboard.interval);

    let _ = writeln!(output, "## Portfolio");
    let _ = writeln!(
        output,
        "- Active contracts: {} worth {:.2}",
        kpis.active_count, kpis.portfolio_value
    );
    let _ = writeln!(
        output,
        "- New: {} worth {:.2} (average ticket {:.2})",
        kpis.new_count, kpis.new_value, kpis.average_ticket_new
    );
    let _ = writeln!(
        output,
        "- Rescinded: {} worth {:.2} (average ticket {:.2})",
        kpis.rescinded_count, kpis.rescinded_value, kpis.average_ticket_rescinded
    );
    let _ = writeln!(output, "- Financial churn: {:.2}%", kpis.financial_churn_percent);
    let _ = writeln!(
        output,
        "- Deposits received {:.2}, returned {:.2}",
        kpis.deposits_received_value, kpis.deposits_returned_value
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Guarantees");
    if kpis.guarantee_mix.is_empty() {
        let _ = writeln!(output, "No new contracts in this period.");
    } else {
        for share in &kpis.guarantee_mix {
            let _ = writeln!(
                output,
                "- {}: {} contracts ({:.1}%), {:.2} held",
                share.guarantee_type, share.count, share.percent, share.value
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Series ({})", dashboard.granularity.as_str());
    for bucket in &dashboard.series {
        let _ = writeln!(
            output,
            "- {}: {} new ({:.2}), {} rescinded ({:.2})",
            bucket.label,
            bucket.value.new_count,
            bucket.value.new_value,
            bucket.value.rescinded_count,
            bucket.value.rescinded_value
        );
    }

    output
}

pub fn render_engagements(dashboard: &EngagementDashboard<'_>) -> String {
    let metrics = &dashboard.metrics;
    let mut output = String::new();

    write_header(&mut output, "Engagement Dashboard", &dashboard.filter, &dashboard.interval);

    let _ = writeln!(output, "## Funnel");
    for stage in &metrics.funnel_stages {
        let _ = writeln!(output, "- {}: {}", stage.stage.label(), stage.value);
    }
    let _ = writeln!(output, "- Conversion: {:.2}%", metrics.conversion_rate);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Origin");
    if metrics.origin_data.is_empty() {
        let _ = writeln!(output, "No engagements in this period.");
    } else {
        for origin in &metrics.origin_data {
            let _ = writeln!(
                output,
                "- {}: {} leads, {} closed ({:.1}%)",
                origin.channel.label(),
                origin.leads,
                origin.closed,
                origin.conversion
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Discard Reasons");
    if metrics.pareto_data.is_empty() {
        let _ = writeln!(output, "No discarded engagements in this period.");
    } else {
        for row in &metrics.pareto_data {
            let _ = writeln!(
                output,
                "- {}: {} (cumulative {:.1}%)",
                row.reason.label(),
                row.count,
                row.cumulative
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Properties");
    if metrics.top_properties.is_empty() {
        let _ = writeln!(output, "No properties referenced in this period.");
    } else {
        for property in &metrics.top_properties {
            let _ = writeln!(
                output,
                "- {}: {} leads, {} cart adds, {} visits",
                property.id, property.leads, property.clicks, property.visits
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Timeline ({})", dashboard.granularity.as_str());
    for bucket in &dashboard.timeline {
        let _ = writeln!(output, "- {}: {}", bucket.label, bucket.value);
    }

    output
}

fn write_inventory(output: &mut String, title: &str, kpis: &PropertyKpis<'_>) {
    let _ = writeln!(output, "## {title}");
    let _ = writeln!(output, "- Listings: {} worth {:.2}", kpis.total, kpis.total_value);
    let destinations = &kpis.destination_distribution;
    let _ = writeln!(
        output,
        "- Residential {}, commercial {}, mixed {}",
        destinations.residential, destinations.commercial, destinations.mixed
    );
    let bands: Vec<String> = [
        ScoreBand::Incomplete,
        ScoreBand::Fair,
        ScoreBand::Good,
        ScoreBand::VeryGood,
    ]
    .into_iter()
    .map(|band| format!("{} {}", band.label(), kpis.score_bands.get(band)))
    .collect();
    let _ = writeln!(output, "- Score: {}", bands.join(", "));
}

pub fn render_properties(dashboard: &PropertyDashboard<'_>) -> String {
    let mut output = String::new();

    write_header(&mut output, "Property Dashboard", &dashboard.filter, &dashboard.interval);
    write_inventory(&mut output, "Rent (advertised)", &dashboard.rent);
    let _ = writeln!(output);
    write_inventory(&mut output, "Sale", &dashboard.sale);

    output
}
