//! tiview CLI - continuously maintained materialized views into TiDB.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tiview::{health_check, Config, Pipeline, RunSummary, TiviewError};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "tiview")]
#[command(about = "Continuously maintained materialized views into TiDB")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "tiview.yaml")]
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
    /// Build the pipeline and run it until the job ends
    Run {
        /// Override target table (table or database.table)
        #[arg(long)]
        target_table: Option<String>,

        /// Override engine parallelism
        #[arg(long)]
        parallelism: Option<u32>,

        /// Drop the target table before creating it
        #[arg(long)]
        drop_old_table: bool,
    },

    /// Build the pipeline, print the target table and release everything
    Validate,

    /// Test store and engine connectivity
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), TiviewError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!(
        "Loaded configuration from {:?} (hash {})",
        cli.config,
        &config.hash()[..12]
    );

    match cli.command {
        Commands::Run {
            target_table,
            parallelism,
            drop_old_table,
        } => {
            if let Some(table) = target_table {
                config.pipeline.target_table = table;
            }
            if let Some(p) = parallelism {
                config.pipeline.parallelism = p;
            }
            if drop_old_table {
                config.pipeline.drop_old_table = true;
            }
            config.validate()?;

            let cancel_token = setup_signal_handler();
            let mut pipeline = config.into_builder().await?.build().await?;

            let started_at = Utc::now();
            let outcome = pipeline.run_until(cancel_token).await;
            let summary = RunSummary::finish(&pipeline, started_at, &outcome);

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }

            outcome?;
        }

        Commands::Validate => {
            let mut pipeline = config.into_builder().await?.build().await?;
            let described = describe(&pipeline);
            pipeline.close().await;

            let (target, ddl) = described?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&target)?);
            } else {
                println!("Validation completed successfully\n");
                println!("{}", ddl);
            }
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Store (TiDB): {} ({}ms)",
                    if result.store_connected { "OK" } else { "FAILED" },
                    result.store_latency_ms
                );
                if !result.store_endpoints.is_empty() {
                    println!("    PD endpoints: {}", result.store_endpoints.join(", "));
                }
                if let Some(ref err) = result.store_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Engine (SQL gateway): {} ({}ms)",
                    if result.engine_connected { "OK" } else { "FAILED" },
                    result.engine_latency_ms
                );
                if let Some(ref version) = result.engine_version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.engine_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(TiviewError::Store("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Target table as JSON plus its DDL.
fn describe(pipeline: &Pipeline) -> Result<(serde_json::Value, String), TiviewError> {
    let target = pipeline.target_table();
    let ddl = pipeline.target_ddl()?;
    let json = serde_json::json!({
        "run_id": pipeline.run_id(),
        "query": pipeline.query(),
        "default_database": pipeline.default_database(),
        "target_table": target.path.to_string(),
        "columns": target
            .columns
            .iter()
            .zip(&target.column_types)
            .map(|(name, data_type)| serde_json::json!({
                "name": name,
                "type": data_type.to_string(),
            }))
            .collect::<Vec<_>>(),
        "primary_key": target.primary_key,
        "fail_if_exists": pipeline.fails_if_table_exists(),
        "ddl": ddl,
    });
    Ok((json, ddl))
}

fn print_summary(summary: &RunSummary) {
    let headline = match summary.status.as_str() {
        "completed" => "Pipeline completed!",
        "cancelled" => "Pipeline cancelled.",
        _ => "Pipeline failed.",
    };
    println!("\n{}", headline);
    println!("  Run ID: {}", summary.run_id);
    println!("  Target: {}", summary.target_table);
    if let Some(ref job_id) = summary.job_id {
        println!("  Job: {}", job_id);
    }
    println!("  Duration: {:.2}s", summary.duration_seconds);
    if let Some(net) = summary.net_runtime_seconds {
        println!("  Net runtime: {:.2}s", net);
    }
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
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Cancelling the job and shutting down...", name);
                    token.cancel();
                });
            }
            Err(e) => eprintln!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling the job and shutting down...");
            token.cancel();
        }
    });

    cancel_token
}
