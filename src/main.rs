//! # Feature Extractor CLI (`fx`)
//!
//! ## Usage
//!
//! ```bash
//! fx --config ./config/fx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fx init` | Create the result store and source tables |
//! | `fx import <file>` | Load raw articles from JSON Lines into the source |
//! | `fx run --start <date> --end <date>` | Enrich every new article in the range |
//! | `fx status --start <date> --end <date>` | Show checkpoint and progress for a range |
//! | `fx schema` | Print the structured-output JSON schema |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to change the
//! level (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feature_extractor::models::DateRange;
use feature_extractor::progress::{format_number, ProgressMode};
use feature_extractor::{config, import, migrate, pipeline, schema, status};

/// Feature Extractor: resumable LLM enrichment of financial news.
#[derive(Parser)]
#[command(
    name = "fx",
    about = "Feature Extractor: resumable, rate-limited LLM enrichment of financial news",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the result store schema and, for a SQLite source, the article table.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Load raw articles from a JSON Lines file into the SQLite source.
    Import {
        /// JSONL file, one article per line.
        file: PathBuf,
    },

    /// Enrich every article in `[start, end)` that is not stored yet.
    ///
    /// Resumes from the latest stored download time in the range.
    Run {
        /// First day of the range (YYYY-MM-DD), inclusive.
        #[arg(long)]
        start: String,

        /// Last day of the range (YYYY-MM-DD), exclusive.
        #[arg(long)]
        end: String,

        /// Enrich and write a single document, then stop.
        #[arg(long)]
        single_write: bool,

        /// Read the whole range again instead of resuming from the checkpoint.
        /// Already stored articles are skipped, so this retries the articles
        /// of chunks that failed in earlier runs.
        #[arg(long)]
        from_start: bool,

        /// Progress output on stderr: `human`, `json` or `off`.
        /// Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show the checkpoint and enrichment progress for a range.
    Status {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,
    },

    /// Print the JSON schema sent to the LLM for structured output.
    Schema,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    if let Commands::Schema = cli.command {
        println!("{}", serde_json::to_string_pretty(&schema::record_schema())?);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            let stats = import::import_jsonl(&cfg.source, &file).await?;
            println!(
                "Imported {} of {} articles into {}.",
                format_number(stats.inserted),
                format_number(stats.read as u64),
                cfg.source.path.display()
            );
        }
        Commands::Run {
            start,
            end,
            single_write,
            from_start,
            progress,
        } => {
            let range = DateRange::parse(&start, &end)?;
            let mode = match progress {
                Some(value) => ProgressMode::parse(&value)?,
                None => ProgressMode::default_for_tty(),
            };

            let summary = pipeline::run_extract(&cfg, &range, single_write, from_start, mode).await?;

            println!("Run complete for {}", range);
            println!("  Pages:            {}", summary.pages);
            println!("  Documents read:   {}", format_number(summary.documents_read as u64));
            println!("  Already stored:   {}", format_number(summary.skipped_existing as u64));
            println!("  Enriched:         {}", format_number(summary.enriched as u64));
            println!("  Chunks failed:    {}", summary.chunks_failed);
            println!(
                "  Checkpoint:       {}",
                summary
                    .checkpoint
                    .map(|cp| cp.to_rfc3339())
                    .unwrap_or_else(|| "none".to_string())
            );
        }
        Commands::Status { start, end } => {
            let range = DateRange::parse(&start, &end)?;
            status::run_status(&cfg, &range).await?;
        }
        // Handled above.
        Commands::Schema => {}
    }

    Ok(())
}
