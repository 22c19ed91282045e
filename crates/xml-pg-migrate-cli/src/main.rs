//! xml-pg-migrate CLI - migrate XML table dumps into PostgreSQL.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use xml_pg_migrate::error::EXIT_CANCELLED;
use xml_pg_migrate::{Config, InspectionReport, MigrateError, MigrationResult, Orchestrator};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "xml-pg-migrate")]
#[command(about = "Migrate XML table dumps and their SQL Server DDL into PostgreSQL")]
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

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the filtered schema and import all dumps
    Run {
        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Override number of import workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override rows per INSERT statement
        #[arg(long)]
        batch_size: Option<usize>,

        /// Dry run: write the filtered schema without touching the database
        #[arg(long)]
        dry_run: bool,

        /// Exit with a non-zero code when any table fails to import
        #[arg(long)]
        fail_on_table_error: bool,
    },

    /// Parse the DDL and inspect dumps, then print the import plan
    Inspect,

    /// Write the filtered schema file without touching the database
    Generate {
        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Validate row counts between dumps and target tables
    Validate,

    /// Test the database connection and input paths
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

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler(cli.shutdown_timeout);

    match cli.command {
        Commands::Run {
            target_schema,
            workers,
            batch_size,
            dry_run,
            fail_on_table_error,
        } => {
            if let Some(schema) = target_schema {
                config.target.schema = Some(schema);
            }
            if let Some(w) = workers {
                config.migration.workers = Some(w);
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            config.validate()?;

            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.run(cancel_token, dry_run).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_result(&result, dry_run);
            }

            if fail_on_table_error && !result.failed_tables.is_empty() {
                return Err(MigrateError::TablesFailed(result.failed_tables));
            }
        }

        Commands::Inspect => {
            let orchestrator = Orchestrator::new(config)?;
            let report = orchestrator.inspect(cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_plan(&report);
            }
        }

        Commands::Generate { target_schema } => {
            if let Some(schema) = target_schema {
                config.target.schema = Some(schema);
            }
            config.validate()?;

            let output = config.paths.output_sql_file.clone();
            let orchestrator = Orchestrator::new(config)?;
            let report = orchestrator.generate(cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_plan(&report);
                println!("\nFiltered schema written to {}", output.display());
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config)?;
            let checks = orchestrator.validate(cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                println!("Row count validation:");
                for check in &checks {
                    println!(
                        "  {} {}: dump={} target={}",
                        if check.matches { "OK      " } else { "MISMATCH" },
                        check.table,
                        check.dump_rows,
                        check.target_rows
                    );
                }
            }

            let mismatched: Vec<String> = checks
                .into_iter()
                .filter(|c| !c.matches)
                .map(|c| c.table)
                .collect();
            if !mismatched.is_empty() {
                return Err(MigrateError::TablesFailed(mismatched));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Schema file: {}",
                    if result.schema_file_readable { "OK" } else { "MISSING" }
                );
                println!("  Dump files: {}", result.dump_files);
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::pool(
                    "health check failed",
                    "checking target connection and input paths",
                ));
            }
        }
    }

    Ok(())
}

fn print_result(result: &MigrationResult, dry_run: bool) {
    let status_msg = if dry_run {
        "Dry run completed!"
    } else {
        "Migration completed!"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Schema: {}", result.schema);
    println!("  Schema file: {}", result.schema_file.display());
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {}/{} imported ({} declared, {} skipped)",
        result.tables_imported,
        result.tables_discovered,
        result.tables_declared,
        result.tables_skipped
    );
    println!("  Rows: {}", result.rows_imported);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
}

fn print_plan(report: &InspectionReport) {
    println!("Target schema: {}", report.schema);
    for plan in &report.tables {
        println!(
            "  {:<30} {:<18} {}/{} columns, {} rows",
            plan.table, plan.action, plan.columns.len(), plan.declared_columns, plan.rows
        );
    }
    if !report.undeclared_dumps.is_empty() {
        println!("  Dumps without a declared table: {:?}", report.undeclared_dumps);
    }
    println!("  Foreign keys declared: {}", report.foreign_keys);
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG directives are layered over --verbosity
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel `token`, then force exit if the run has not wound down within
/// `shutdown_timeout` seconds.
fn arm_shutdown(token: &CancellationToken, name: &str, shutdown_timeout: u64) {
    eprintln!(
        "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
        name, shutdown_timeout
    );
    token.cancel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
        eprintln!("Graceful shutdown timed out; exiting");
        std::process::exit(EXIT_CANCELLED as i32);
    });
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    arm_shutdown(&token, name, shutdown_timeout);
                }
                Err(e) => error!("Failed to install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => arm_shutdown(&token, "Ctrl-C", shutdown_timeout),
            Err(e) => error!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
