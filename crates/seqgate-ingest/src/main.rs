//! Seqgate Ingest - bundle ingestion batch job

use anyhow::Result;
use clap::Parser;
use seqgate_common::logging::{init_logging, LogConfig, LogLevel};
use seqgate_ingest::config::PipelineConfig;
use seqgate_ingest::pipeline::Pipeline;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "seqgate-ingest")]
#[command(author, version, about = "Sequence-validated bundle ingestion batch job")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Execute one complete ingestion run
    Run {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root data directory (used when no config file is given)
        #[arg(short, long, default_value = "./data")]
        root: PathBuf,
    },

    /// Validate the configuration and exit
    CheckConfig {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn load_config(config: Option<&PathBuf>, root: &PathBuf) -> Result<PipelineConfig> {
    match config {
        Some(path) => PipelineConfig::load(path),
        None => {
            let mut config = PipelineConfig::with_root(root);
            config.apply_env()?;
            Ok(config)
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("seqgate-ingest".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    match cli.command {
        Command::Run { config, root } => {
            let config = load_config(config.as_ref(), &root)?;
            let report = Pipeline::new(config).run().await?;
            info!(
                "Run finished: {} admitted, {} anomalies, {} matched, {} rejected",
                report.admitted,
                report.validation.anomalies,
                report.classification.matched,
                report.classification.errors,
            );
        },
        Command::CheckConfig { config } => {
            let config = PipelineConfig::load(&config)?;
            config.validate()?;
            info!("Configuration ok: root {}", config.root_dir.display());
        },
    }

    Ok(())
}
