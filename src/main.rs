use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use brokerage_metrics::config::AppConfig;
use brokerage_metrics::dashboard;
use brokerage_metrics::engagements::EngagementSources;
use brokerage_metrics::loader::load_rows;
use brokerage_metrics::report;
use brokerage_metrics::{Filter, FilterUpdate, GranularityChoice, Period, Row};

#[derive(Parser)]
#[command(name = "brokerage-metrics")]
#[command(
    about = "KPI dashboards for brokerage contract, engagement and property spreadsheets",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Contract portfolio, churn and guarantee KPIs
    Contracts {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Lead funnel, origin, discard reasons and top properties
    #[command(group(
        ArgGroup::new("sources")
            .args(["rent", "sale"])
            .required(true)
            .multiple(true)
    ))]
    Engagements {
        #[arg(long)]
        rent: Option<PathBuf>,
        #[arg(long)]
        sale: Option<PathBuf>,
        #[arg(long)]
        collaborator: Option<String>,
        /// aluguel, venda, outros or todos
        #[arg(long)]
        purpose: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Rent and sale inventory KPIs
    #[command(group(
        ArgGroup::new("sources")
            .args(["rent", "sale"])
            .required(true)
            .multiple(true)
    ))]
    Properties {
        #[arg(long)]
        rent: Option<PathBuf>,
        #[arg(long)]
        sale: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List collaborators named in engagement sheets
    #[command(group(
        ArgGroup::new("sources")
            .args(["rent", "sale"])
            .required(true)
            .multiple(true)
    ))]
    Collaborators {
        #[arg(long)]
        rent: Option<PathBuf>,
        #[arg(long)]
        sale: Option<PathBuf>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// today, yesterday, this_week ... last_year, custom or all
    #[arg(long)]
    period: Option<String>,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    /// auto, day, week, month, quarter or year
    #[arg(long)]
    granularity: Option<String>,
}

impl FilterArgs {
    /// Bounds without an explicit period imply a custom range.
    fn update(self) -> FilterUpdate {
        let period = match (&self.period, &self.start, &self.end) {
            (Some(period), _, _) => Some(Period::parse(period)),
            (None, None, None) => None,
            (None, _, _) => Some(Period::Custom),
        };
        FilterUpdate {
            period,
            start_date: self.start,
            end_date: self.end,
            granularity: self.granularity.as_deref().map(GranularityChoice::parse),
            ..FilterUpdate::default()
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,
    /// Write to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

impl OutputArgs {
    fn emit<T: Serialize>(
        &self,
        value: &T,
        markdown: impl FnOnce(&T) -> String,
    ) -> anyhow::Result<()> {
        let rendered = match self.format {
            Format::Markdown => markdown(value),
            Format::Json => {
                serde_json::to_string_pretty(value).context("failed to encode dashboard")?
            }
        };

        match &self.out {
            Some(out) => {
                std::fs::write(out, rendered)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Report written to {}.", out.display());
            }
            None => println!("{rendered}"),
        }
        Ok(())
    }
}

fn load_optional(path: Option<&Path>) -> anyhow::Result<Vec<Row>> {
    match path {
        Some(path) => load_rows(path),
        None => Ok(Vec::new()),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid DASHBOARD_* environment")?;
    init_tracing(&config);

    let now = config.now();
    tracing::debug!(%now, top_properties = config.top_properties, "configuration loaded");

    match cli.command {
        Commands::Contracts { file, filter, output } => {
            let rows = load_rows(&file)?;
            let filter = Filter::contracts().merged(filter.update());
            let dashboard = dashboard::contracts_dashboard(&rows, &filter, now)?;
            output.emit(&dashboard, report::render_contracts)?;
        }
        Commands::Engagements {
            rent,
            sale,
            collaborator,
            purpose,
            filter,
            output,
        } => {
            let rent = load_optional(rent.as_deref())?;
            let sale = load_optional(sale.as_deref())?;
            let filter = Filter::engagements().merged(FilterUpdate {
                collaborator,
                purpose,
                ..filter.update()
            });
            let rows = EngagementSources::new(&rent, &sale).select(filter.purpose);
            let dashboard =
                dashboard::engagement_dashboard(&rows, &filter, now, config.top_properties)?;
            output.emit(&dashboard, report::render_engagements)?;
        }
        Commands::Properties {
            rent,
            sale,
            filter,
            output,
        } => {
            let rent = load_optional(rent.as_deref())?;
            let sale = load_optional(sale.as_deref())?;
            let filter = Filter::properties().merged(filter.update());
            let dashboard = dashboard::property_dashboard(&rent, &sale, &filter, now)?;
            output.emit(&dashboard, report::render_properties)?;
        }
        Commands::Collaborators { rent, sale } => {
            let rent = load_optional(rent.as_deref())?;
            let sale = load_optional(sale.as_deref())?;
            let names = EngagementSources::new(&rent, &sale).collaborators();

            if names.is_empty() {
                println!("No collaborators found.");
                return Ok(());
            }
            for name in names {
                println!("- {name}");
            }
        }
    }

    Ok(())
}
