//! Healthstore CLI
//!
//! Command-line entry point:
//! - Print a default configuration
//! - Load sample data from two apps and aggregate it
//! - Run aggregations against the configured database

use anyhow::{bail, Context};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use healthstore::aggregation::{
    AggregateRequest, AggregateResponse, AggregationType, GroupBy, Period,
};
use healthstore::config::{generate_default_config, Config};
use healthstore::records::{Metadata, Record, RecordData, RecordTime, TimeRange, ZoneOffset};
use healthstore::service::HealthService;
use healthstore::storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Caller id used for commands issued from the terminal
const CLI_CALLER: u32 = 1_000;

#[derive(Parser)]
#[command(name = "healthstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "On-device health record store with priority-aware aggregation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a default configuration file
    Config,

    /// Insert overlapping sample data from two apps and aggregate it
    Demo {
        /// Keep the sample data in memory instead of the configured database
        #[arg(long)]
        in_memory: bool,
    },

    /// Aggregate stored records
    Aggregate {
        /// Aggregation names, e.g. STEPS_COUNT_TOTAL weight-avg
        #[arg(required = true)]
        aggregations: Vec<String>,
        /// Time range ending now (e.g. 12h, 7d)
        #[arg(short, long, default_value = "1d")]
        last: String,
        /// Bucket width: a duration (30m, 6h, 2d) or a period (day, week, month, year)
        #[arg(short, long)]
        group_by: Option<String>,
        /// Only count data from these packages
        #[arg(short, long)]
        origin: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    init_logging(&config);

    match cli.command {
        Commands::Config => {
            print!("{}", generate_default_config());
        }
        Commands::Demo { in_memory } => {
            let service = if in_memory {
                HealthService::with_store(Arc::new(SqliteStore::open_in_memory()?), &config)
                    .await?
            } else {
                HealthService::open(&config).await?
            };
            run_demo(&service, &cli.format).await?;
        }
        Commands::Aggregate {
            aggregations,
            last,
            group_by,
            origin,
        } => {
            let service = HealthService::open(&config).await?;
            let aggregations = aggregations
                .iter()
                .map(|name| {
                    AggregationType::from_name(name)
                        .with_context(|| format!("unknown aggregation: {}", name))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let span = parse_span(&last)?;
            let end = Utc::now().timestamp_millis();
            let start = end
                .checked_sub(span.num_milliseconds())
                .with_context(|| format!("span too long: {}", last))?;
            let range = TimeRange::try_new(start, end).context("empty time range")?;

            let mut request = AggregateRequest::new(aggregations, range).data_origins(origin);
            if let Some(group_by) = group_by {
                request = request.group_by(parse_group_by(&group_by)?);
            }

            let response = service.aggregate(CLI_CALLER, true, request).await?;
            print_response(&response, &cli.format)?;
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_demo(service: &HealthService, format: &str) -> anyhow::Result<()> {
    const HOUR: i64 = 3_600_000;
    let day_start = (Utc::now().timestamp_millis() / (24 * HOUR)) * (24 * HOUR);
    let offset = ZoneOffset::UTC;

    let watch = "com.example.watch";
    let phone = "com.example.phone";
    let scale = "com.example.scale";

    // The watch writes first and so outranks the phone
    let watch_records = vec![
        Record::new(
            Metadata::new(watch),
            RecordTime::interval(day_start, day_start + 2 * HOUR, offset),
            RecordData::Steps { count: 3000 },
        )?,
        Record::new(
            Metadata::new(watch),
            RecordTime::interval(day_start, day_start + 3 * HOUR, offset),
            RecordData::Distance { meters: 2400.0 },
        )?,
        Record::new(
            Metadata::new(watch),
            RecordTime::instant(day_start, offset),
            RecordData::BasalMetabolicRate { watts: 80.0 },
        )?,
    ];
    let phone_records = vec![
        Record::new(
            Metadata::new(phone),
            RecordTime::interval(day_start + HOUR, day_start + 3 * HOUR, offset),
            RecordData::Steps { count: 5000 },
        )?,
        Record::new(
            Metadata::new(scale),
            RecordTime::instant(day_start + HOUR / 2, offset),
            RecordData::Weight { grams: 71_500.0 },
        )?,
    ];

    service.insert_records(CLI_CALLER, true, watch_records).await?;
    service.insert_records(CLI_CALLER, true, phone_records).await?;

    let range = TimeRange::try_new(day_start, day_start + 4 * HOUR).context("empty demo range")?;
    let request = AggregateRequest::new(
        vec![
            AggregationType::StepsCountTotal,
            AggregationType::DistanceTotal,
            AggregationType::BasalCaloriesTotal,
            AggregationType::WeightAvg,
        ],
        range,
    )
    .group_by(GroupBy::Duration(chrono::Duration::hours(1)));

    let response = service.aggregate(CLI_CALLER, true, request).await?;
    print_response(&response, format)
}

fn print_response(response: &AggregateResponse, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    for group in &response.groups {
        println!(
            "{} .. {}",
            format_millis(group.interval.start),
            format_millis(group.interval.end)
        );
        if group.results.is_empty() {
            println!("  (no data)");
        }
        for (aggregation, result) in &group.results {
            println!(
                "  {:<40} {:>14}  [{}]",
                aggregation.name(),
                result.value.to_string(),
                result.data_origins.join(", ")
            );
        }
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Parse spans such as `30m`, `12h` or `7d`
fn parse_span(text: &str) -> anyhow::Result<chrono::Duration> {
    let text = text.trim();
    let (amount, unit) = match text.char_indices().last() {
        Some((index, _)) => text.split_at(index),
        None => bail!("empty span"),
    };
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("invalid span: {}", text))?;

    let span = match unit {
        "m" => chrono::Duration::try_minutes(amount),
        "h" => chrono::Duration::try_hours(amount),
        "d" => chrono::Duration::try_days(amount),
        "w" => chrono::Duration::try_weeks(amount),
        _ => bail!("invalid span unit in {} (use m, h, d or w)", text),
    }
    .with_context(|| format!("span out of range: {}", text))?;
    if span <= chrono::Duration::zero() {
        bail!("span must be positive: {}", text);
    }
    Ok(span)
}

fn parse_group_by(text: &str) -> anyhow::Result<GroupBy> {
    let period = match text.trim().to_lowercase().as_str() {
        "day" => Some(Period::Days(1)),
        "week" => Some(Period::Weeks(1)),
        "month" => Some(Period::Months(1)),
        "year" => Some(Period::Years(1)),
        _ => None,
    };
    match period {
        Some(period) => Ok(GroupBy::Period(period)),
        None => Ok(GroupBy::Duration(parse_span(text)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_span() {
        assert_eq!(parse_span("12h").unwrap(), chrono::Duration::hours(12));
        assert_eq!(parse_span(" 30m ").unwrap(), chrono::Duration::minutes(30));
        assert!(parse_span("0d").is_err());
        assert!(parse_span("5y").is_err());
        assert!(parse_span("").is_err());
    }

    #[test]
    fn test_huge_span_is_an_error() {
        assert!(parse_span("9999999999999999d").is_err());
        assert!(parse_span("9223372036854775807w").is_err());
    }

    #[test]
    fn test_parse_group_by() {
        assert_eq!(
            parse_group_by("week").unwrap(),
            GroupBy::Period(Period::Weeks(1))
        );
        assert_eq!(
            parse_group_by("6h").unwrap(),
            GroupBy::Duration(chrono::Duration::hours(6))
        );
        assert!(parse_group_by("fortnight").is_err());
    }
}
