#![allow(dead_code)]

use clap::Parser;

mod config;
mod core;
mod logging;
mod processors;

/// Logsieve - a pull-based search pipeline engine for log records
#[derive(Parser)]
#[command(name = "logsieve")]
#[command(version = "0.1.0")]
#[command(about = "Logsieve: a pull-based search pipeline engine for log records")]
#[command(
    long_about = "Run search-query pipelines (filter, project, aggregate, sort, \
dedup, timechart, ...) over NDJSON log records, described in a TOML \
configuration file."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "./config/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// List available stage kinds
    #[arg(short = 'L', long)]
    list_stages: bool,
}

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging with the specified level
    logging::init_logging(&cli.log_level);

    // Handle the list-stages command
    if cli.list_stages {
        println!("Available stage kinds:");
        for stage in processors::factory::list_stages() {
            println!("  - {stage}");
        }
        return;
    }

    // Load configuration from the specified file
    let config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config from '{}': {e:#}", cli.config);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config::validate_config(&config) {
        tracing::error!("Configuration error: {e:#}");
        std::process::exit(1);
    }

    tracing::info!("Configuration loaded and validated successfully.");

    // Build the stage chain and drain it
    let pipeline = match core::pipeline::PipelineManager::new(config).build() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("Failed to build pipeline: {e:#}");
            std::process::exit(1);
        }
    };

    match pipeline.run().await {
        Ok(stats) => {
            tracing::info!("Done: {} records in {} fetches.", stats.records, stats.fetches);
        }
        Err(e) => {
            tracing::error!("Pipeline failed: {e:#}");
            std::process::exit(1);
        }
    }
}
