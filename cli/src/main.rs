//! `docmatch`: index the uploads directory and query it.
//!
//! Every command scans the uploads directory into a fresh in-memory index
//! before running, then prints its result as JSON on stdout (`match` can
//! also print CSV). Logs go to stderr and are controlled by `RUST_LOG` or
//! `-v`.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docmatch_pipeline::{
    DocumentPipeline, EmbeddingConfig, Gap, IngestOutcome, MatchOptions, MatchReport, Period,
    PipelineConfig, SortBy,
};

/// Semantic document matching over a folder of text files.
#[derive(Debug, Parser)]
#[command(name = "docmatch", version, about)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Uploads directory, overriding the config.
    #[arg(short, long, global = true)]
    uploads: Option<PathBuf>,

    /// Use the offline hashing provider instead of the HTTP endpoint.
    #[arg(long, global = true)]
    offline: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Documents most similar to a piece of text.
    Query {
        /// Query text.
        text: String,

        /// Number of results.
        #[arg(short, default_value_t = 5)]
        k: usize,
    },

    /// Documents most similar to an uploaded document.
    Similar {
        /// Document id (file name).
        id: String,

        /// Number of results.
        #[arg(short, default_value_t = 5)]
        k: usize,
    },

    /// Match one document against others with score and key terms.
    Match {
        /// Source document id (file name).
        source: String,

        /// Target document ids. All other documents when omitted.
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Minimum similarity, in percent.
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,

        /// Minimum number of matched key terms.
        #[arg(long, default_value_t = 0)]
        min_terms: usize,

        /// Ordering: score_desc, score_asc or name.
        #[arg(long, default_value = "score_desc", value_parser = parse_sort)]
        sort: SortBy,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Index the uploads and print pipeline statistics.
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
}

fn parse_sort(value: &str) -> Result<SortBy, String> {
    match value {
        "score_desc" => Ok(SortBy::ScoreDesc),
        "score_asc" => Ok(SortBy::ScoreAsc),
        "name" => Ok(SortBy::Name),
        other => Err(format!(
            "unknown sort {other:?}, expected score_desc, score_asc or name"
        )),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = &cli.uploads {
        config.uploads.path = path.clone();
    }
    if cli.offline {
        config.embedding = EmbeddingConfig::hashing(config.embedding.dimension);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One CSV line per match report. Lists are joined with `; `.
#[derive(Debug, Serialize)]
struct MatchRow<'a> {
    source_id: &'a str,
    target_id: &'a str,
    score_percent: f32,
    matched_terms: String,
    missing_terms: String,
    education_periods: String,
    experience_periods: String,
    education_gap_months: String,
    experience_gap_months: String,
    education_to_first_job_months: Option<u32>,
}

impl<'a> From<&'a MatchReport> for MatchRow<'a> {
    fn from(report: &'a MatchReport) -> Self {
        let timeline = &report.source_timeline;
        let periods = |periods: &[Period]| {
            periods
                .iter()
                .map(|p| format!("{} ({})", p.entry, p.label()))
                .collect::<Vec<_>>()
                .join("; ")
        };
        let gaps = |gaps: &[Gap]| {
            gaps.iter()
                .map(|g| g.months.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        };

        Self {
            source_id: &report.source_id,
            target_id: &report.target_id,
            score_percent: report.score_percent,
            matched_terms: report.matched_terms.join("; "),
            missing_terms: report.missing_terms.join("; "),
            education_periods: periods(&timeline.education),
            experience_periods: periods(&timeline.experience),
            education_gap_months: gaps(&timeline.education_gaps),
            experience_gap_months: gaps(&timeline.experience_gaps),
            education_to_first_job_months: timeline.education_to_first_job_months,
        }
    }
}

fn write_csv(reports: &[MatchReport], out: impl io::Write) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for report in reports {
        writer.serialize(MatchRow::from(report))?;
    }
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let pipeline = DocumentPipeline::from_config(config)
        .await
        .context("starting document pipeline")?;

    let report = pipeline
        .ingest_uploads()
        .await
        .context("indexing uploads")?;
    for skipped in &report.skipped {
        warn!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    for outcome in &report.outcomes {
        if let IngestOutcome::Failed { id, error } = outcome {
            warn!("Not indexed {id}: {error}");
        }
    }
    info!("Indexed {} documents", pipeline.len().await);

    let result = run(&pipeline, cli.command).await;
    pipeline.shutdown();
    result
}

async fn run(pipeline: &DocumentPipeline, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Query { text, k } => {
            let results = pipeline.query(&text, k).await?;
            print_json(&results)
        }
        Command::Similar { id, k } => {
            let results = pipeline.search_by_id(&id, k).await?;
            print_json(&results)
        }
        Command::Match {
            source,
            targets,
            min_score,
            min_terms,
            sort,
            format,
        } => {
            if pipeline.get(&source).await.is_none() {
                bail!("{source} is not in the uploads directory");
            }
            let options = MatchOptions::default()
                .with_min_score_percent(min_score)
                .with_min_matched_terms(min_terms)
                .with_sort_by(sort);
            let reports = pipeline.compare(&source, &targets, &options).await?;
            match format {
                Format::Json => print_json(&reports),
                Format::Csv => write_csv(&reports, io::stdout().lock()),
            }
        }
        Command::Stats => print_json(&pipeline.stats().await),
    }
}
