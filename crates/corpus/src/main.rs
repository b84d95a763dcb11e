//! corpus - batch preprocessing for composer MIDI corpora
//!
//! Subcommands:
//! - `corpus init` - reset the working directories
//! - `corpus select [--flatten]` - copy the configured composers out of the raw corpus
//! - `corpus extract` / `corpus segments` - per-composer metric CSVs
//! - `corpus aggregate` / `corpus report` - combined table and HTML EDA
//! - `corpus merge-splits` - fold train/test/val splits into the chunked folder
//! - `corpus chunks <root>` - chunk summary CSV
//! - `corpus fit <root>` - fit the scaler and program table for the service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use maestroconf::MaestroConfig;
use midi_features::Metric;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corpus")]
#[command(about = "Batch preprocessing for composer MIDI corpora")]
#[command(version)]
struct Cli {
    /// Config file, used in place of ./maestro.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the working directories and create composer and split folders
    Init,

    /// Copy the configured composers from the input directory
    Select {
        /// Move nested MIDI files up and delete everything else
        #[arg(long)]
        flatten: bool,
    },

    /// Per-composer CSVs of whole-file metrics
    Extract {
        /// Comma-separated metrics
        #[arg(short, long, value_delimiter = ',', default_values_t = Metric::DEFAULT)]
        metrics: Vec<Metric>,
    },

    /// Per-composer CSVs of time-segment metrics
    Segments {
        /// Comma-separated metrics
        #[arg(short, long, value_delimiter = ',', default_values_t = Metric::DEFAULT)]
        metrics: Vec<Metric>,

        /// Segments per file (overrides config)
        #[arg(short, long)]
        num_segments: Option<usize>,
    },

    /// Concatenate the extracted CSVs into one table
    Aggregate {
        /// Output CSV (default: <reports_dir>/features.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// HTML reports per composer and for the whole table
    Report {
        /// Aggregated CSV to read instead of re-aggregating the extracted CSVs
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Move split files into the chunked train/test/val folders
    MergeSplits,

    /// Chunk summaries for every file under a labelled corpus
    Chunks {
        /// Corpus root, one folder per composer (default: output dir)
        root: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long, default_value = "chunks.csv")]
        output: PathBuf,

        /// Notes per chunk (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Fit the scaler and program-frequency table on a labelled corpus
    Fit {
        /// Corpus root, one folder per composer (default: output dir)
        root: Option<PathBuf>,

        /// Also write the labelled, scaled rows to this CSV
        #[arg(long)]
        rows: Option<PathBuf>,

        /// Notes per window (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = MaestroConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    for file in &sources.files {
        tracing::debug!("Config file: {}", file.display());
    }

    let corpus_config = &config.corpus;
    match cli.command {
        Commands::Init => corpus::init(corpus_config)?,

        Commands::Select { flatten } => {
            let selected = corpus::select(corpus_config, flatten)?;
            tracing::info!(
                "Selected {:?} into {}",
                selected,
                corpus_config.output_dir.display()
            );
        }

        Commands::Extract { metrics } => {
            corpus::extract_composers(
                &corpus_config.output_dir,
                &corpus_config.extracted_features_dir,
                &corpus_config.composers,
                &metrics,
            )?;
        }

        Commands::Segments {
            metrics,
            num_segments,
        } => {
            let num_segments = num_segments.unwrap_or(corpus_config.num_segments);
            if num_segments == 0 {
                anyhow::bail!("--num-segments must be at least 1");
            }
            corpus::segment_composers(
                &corpus_config.output_dir,
                &corpus_config.chunked_output_dir,
                &corpus_config.composers,
                &metrics,
                num_segments,
            )?;
        }

        Commands::Aggregate { output } => {
            let output = output.unwrap_or_else(|| corpus_config.reports_dir.join("features.csv"));
            let table = corpus::aggregate(&corpus_config.extracted_features_dir);
            table.write(&output)?;
            tracing::info!("Wrote {} rows to {}", table.len(), output.display());
        }

        Commands::Report { input } => {
            let table = match input {
                Some(path) => corpus::Table::read(&path)?,
                None => corpus::aggregate(&corpus_config.extracted_features_dir),
            };
            corpus::write_reports(&table, &corpus_config.reports_dir)?;
        }

        Commands::MergeSplits => {
            corpus::merge_splits(
                &corpus_config.train_test_val_dir,
                &corpus_config.chunked_output_dir,
                &corpus_config.composers,
            )?;
        }

        Commands::Chunks {
            root,
            output,
            chunk_size,
        } => {
            let root = root.unwrap_or_else(|| corpus_config.output_dir.clone());
            let chunk_size = chunk_size.unwrap_or(config.features.chunk_size);
            if chunk_size == 0 {
                anyhow::bail!("--chunk-size must be at least 1");
            }
            let records = corpus::summarize_corpus(&root, chunk_size);
            corpus::write_chunks(&output, &records)?;
            tracing::info!("Wrote {} chunks to {}", records.len(), output.display());
        }

        Commands::Fit {
            root,
            rows,
            chunk_size,
        } => {
            let root = root.unwrap_or_else(|| corpus_config.output_dir.clone());
            let chunk_size = chunk_size.unwrap_or(config.features.chunk_size);

            let fitted = corpus::fit_corpus(&root, chunk_size, &corpus_config.composers)?;
            if fitted.windows.is_empty() {
                tracing::warn!(
                    "No file under {} has {} usable notes, artifacts are identity",
                    root.display(),
                    chunk_size
                );
            }
            fitted.save_artifacts(&config.paths.scaler, &config.paths.program_freq)?;
            if let Some(rows) = rows {
                fitted.write_rows(&rows)?;
                tracing::info!("Wrote scaled rows to {}", rows.display());
            }
            println!("{}", serde_json::to_string_pretty(&fitted.summary())?);
        }
    }

    Ok(())
}
