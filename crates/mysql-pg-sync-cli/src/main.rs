//! mysql-pg-sync CLI - MySQL to PostgreSQL table replication.

use clap::{Parser, Subcommand};
use mysql_pg_sync::{Config, Orchestrator, RunOptions, SyncError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mysql-pg-sync")]
#[command(about = "Replicate MySQL tables into a PostgreSQL landing schema")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync tables from source to target
    Run {
        /// Only sync these tables (still subject to include/exclude config)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Re-sync tables already marked succeeded, dropping them first
        #[arg(long)]
        force: bool,
    },

    /// Compare row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// Show recorded sync state per table
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { tables, force } => {
            let orchestrator = Orchestrator::new(config).await?;
            let summary = orchestrator.run(RunOptions { tables, force }).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\nSync {}", summary.status);
                println!("  Run ID: {}", summary.run_id);
                println!("  Duration: {:.2}s", summary.duration_seconds);
                println!(
                    "  Tables: {} succeeded, {} failed, {} skipped",
                    summary.tables_succeeded, summary.tables_failed, summary.tables_skipped
                );
                println!("  Rows: {}", summary.rows_transferred);
                if !summary.failed_tables.is_empty() {
                    println!("  Failed tables: {:?}", summary.failed_tables);
                }
            }

            if summary.tables_failed > 0 {
                return Err(SyncError::Validation(format!(
                    "{} table(s) failed to sync",
                    summary.tables_failed
                )));
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let outcomes = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                for outcome in &outcomes {
                    let mark = if outcome.passed { "ok" } else { "MISMATCH" };
                    println!(
                        "  {:<10} {} (source={}, target={})",
                        mark, outcome.table, outcome.source_rows, outcome.target_rows
                    );
                }
            }

            let mismatched = outcomes.iter().filter(|o| !o.passed).count();
            if mismatched > 0 {
                return Err(SyncError::Validation(format!(
                    "{} table(s) out of tolerance",
                    mismatched
                )));
            }
            println!("Validation completed successfully");
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            orchestrator.health_check().await?;
            println!("Source and target connections OK");
        }

        Commands::Status => {
            let orchestrator = Orchestrator::new(config).await?;
            let states = orchestrator.sync_states().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&states)?);
            } else if states.is_empty() {
                println!("No sync state recorded yet");
            } else {
                for state in &states {
                    println!(
                        "  {:<12} {} (source={}, target={}, retries={})",
                        state.status.as_str(),
                        state.table,
                        state.source_rows,
                        state.target_rows,
                        state.retries
                    );
                    if let Some(ref err) = state.error {
                        println!("    error: {}", err);
                    }
                }
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
