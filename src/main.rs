//! CLI entry point for the excess-deaths analysis tool.
//!
//! Provides subcommands for the age-stratified analysis, the
//! whole-population analysis, the mean-age-of-death computation, and
//! downloading the source datasets.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use excess_deaths::calendar::WeekIndex;
use excess_deaths::config::EngineConfig;
use excess_deaths::engine::baseline::BaselineMethod;
use excess_deaths::engine::types::StratifiedReport;
use excess_deaths::engine::{aggregate, death_age};
use excess_deaths::fetch::{BasicClient, download_sources};
use excess_deaths::population::{PopulationRegistry, age_brackets, puerto_rico_population};
use excess_deaths::{cache, output, parser};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "excess_deaths")]
#[command(about = "Estimate excess mortality by jurisdiction and age group", long_about = None)]
struct Cli {
    /// JSON config file overriding the built-in defaults
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate excess deaths stratified by age group
    ByAgeGroup {
        /// Weekly death counts by jurisdiction and age (CSV)
        #[arg(
            long,
            default_value = "Weekly_Counts_of_Deaths_by_Jurisdiction_and_Age.csv"
        )]
        counts: String,

        /// Census population estimates (CSV)
        #[arg(long, default_value = "Population.csv")]
        population: String,

        /// Baseline method: average or linear_regression
        #[arg(long)]
        baseline_method: Option<String>,

        /// Enable age adjustment, computing mean death ages from this
        /// COVID-deaths-by-sex-and-age CSV
        #[arg(long)]
        age_adjust: Option<String>,

        /// Excess-deaths dataset (CSV) to compare our totals against the
        /// source's own estimates
        #[arg(long)]
        compare: Option<String>,

        /// Summary CSV to write
        #[arg(short, long, default_value = "by_age_group.csv")]
        summary: String,

        /// Results cache file
        #[arg(long, default_value = "cache.by_age_group.json")]
        cache_file: String,

        /// Recompute even if a fresh cache exists
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
    /// Whole-population cumulative excess from the pre-baselined dataset
    AllAges {
        /// Excess-deaths dataset (CSV)
        #[arg(long, default_value = "Excess_Deaths_Associated_with_COVID-19.csv")]
        excess: String,

        /// Census population estimates (CSV)
        #[arg(long, default_value = "Population.csv")]
        population: String,

        /// Count weeks ending on or after this date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,
    },
    /// Print the mean age of COVID deaths per jurisdiction
    DeathAges {
        /// COVID deaths by sex and age (CSV)
        #[arg(long, default_value = "Provisional_COVID-19_Deaths_by_Sex_and_Age.csv")]
        deaths: String,
    },
    /// Download the source datasets
    FetchData {
        /// Directory to save the CSV files into
        #[arg(short, long, default_value = "data")]
        output_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/excess_deaths.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("excess_deaths.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::ByAgeGroup {
            counts,
            population,
            baseline_method,
            age_adjust,
            compare,
            summary,
            cache_file,
            no_cache,
        } => by_age_group(
            cfg,
            &counts,
            &population,
            baseline_method.as_deref(),
            age_adjust.as_deref(),
            compare.as_deref(),
            &summary,
            &cache_file,
            no_cache,
        )?,
        Commands::AllAges {
            excess,
            population,
            start_date,
        } => all_ages(cfg, &excess, &population, start_date)?,
        Commands::DeathAges { deaths } => death_ages(cfg, &deaths)?,
        Commands::FetchData { output_dir } => {
            let client = BasicClient::new();
            download_sources(&client, Path::new(&output_dir)).await?;
        }
    }

    Ok(())
}

/// Runs the stratified analysis, reusing a fresh cached result when allowed.
#[allow(clippy::too_many_arguments)]
fn by_age_group(
    mut cfg: EngineConfig,
    counts: &str,
    population: &str,
    baseline_method: Option<&str>,
    age_adjust: Option<&str>,
    compare: Option<&str>,
    summary: &str,
    cache_file: &str,
    no_cache: bool,
) -> Result<()> {
    if let Some(method) = baseline_method {
        cfg.baseline_method = match method {
            "average" => BaselineMethod::Average,
            "linear_regression" => BaselineMethod::LinearRegression,
            other => anyhow::bail!("unknown baseline method: {other}"),
        };
    }
    if age_adjust.is_some() {
        cfg.age_adjustment.enabled = true;
    }

    let cached: Option<StratifiedReport> = if no_cache {
        None
    } else {
        cache::load_fresh(
            Path::new(cache_file),
            Duration::from_secs(cfg.cache_max_age_secs),
        )
    };

    let report = match cached {
        Some(report) => report,
        None => {
            let records = parser::parse_weekly_counts(File::open(counts)?)?;
            info!(records = records.len(), "weekly death counts loaded");

            let calendar = WeekIndex::from_reference(
                &records,
                &cfg.reference_jurisdiction,
                &cfg.reference_age_group,
            )?;
            info!(
                weeks = calendar.len(),
                last = %calendar.last_week_ending().unwrap_or_default(),
                "week calendar built"
            );

            let registry = load_population(population)?;

            let death_ages = match age_adjust {
                Some(path) => {
                    let rows = parser::parse_covid_deaths(File::open(path)?)?;
                    death_age::mean_death_ages(&rows, &cfg.split, cfg.suppressed_fill)
                }
                None => BTreeMap::new(),
            };

            let report =
                aggregate::stratified_excess(&records, &calendar, &registry, &death_ages, &cfg)?;
            if let Err(e) = cache::store(Path::new(cache_file), &report) {
                warn!(error = %e, "failed to write results cache");
            }
            report
        }
    };

    output::print_rankings(&report);

    let official = match compare {
        Some(path) => Some(parser::parse_official_totals(File::open(path)?, &cfg.split)?),
        None => None,
    };
    output::write_summary(summary, &report, official.as_ref())?;
    info!(summary, "summary written");

    Ok(())
}

/// Runs the whole-population analysis over the pre-baselined dataset.
fn all_ages(
    mut cfg: EngineConfig,
    excess: &str,
    population: &str,
    start_date: Option<NaiveDate>,
) -> Result<()> {
    if let Some(date) = start_date {
        cfg.start_date = date;
    }

    let records = parser::parse_excess_deaths(File::open(excess)?)?;
    info!(records = records.len(), "excess-deaths rows loaded");
    let registry = load_population(population)?;

    let rates = aggregate::cumulative_excess(&records, &registry, &cfg)?;
    if let Some(last) = records.iter().map(|r| r.week_ending).max() {
        info!(start = %cfg.start_date, last = %last, "evaluation window");
    }
    output::print_rates(&rates);

    Ok(())
}

fn death_ages(cfg: EngineConfig, deaths: &str) -> Result<()> {
    let rows = parser::parse_covid_deaths(File::open(deaths)?)?;
    let ages = death_age::mean_death_ages(&rows, &cfg.split, cfg.suppressed_fill);

    let mut sorted: Vec<_> = ages.into_iter().collect();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    for (jurisdiction, age) in sorted {
        println!("{age:.1} {jurisdiction}");
    }

    Ok(())
}

fn load_population(path: &str) -> Result<PopulationRegistry> {
    let census = parser::parse_census(File::open(path)?)?;
    let mut registry = PopulationRegistry::from_census(&census, &age_brackets());
    registry.insert_override("Puerto Rico", &puerto_rico_population());
    info!(
        jurisdictions = registry.jurisdictions().len(),
        "population registry built"
    );
    Ok(registry)
}
