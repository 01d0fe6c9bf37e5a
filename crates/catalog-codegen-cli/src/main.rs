//! catalog-codegen CLI - generate Rust data-access code from a PostgreSQL catalog.

use catalog_codegen::{CodegenError, Config, Container, GenerationReport, MockProvider};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "catalog-codegen")]
#[command(about = "Generate models, repositories, test doubles and tests from a PostgreSQL catalog")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "codegen.yaml")]
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

    /// Seconds to wait for started jobs after a shutdown signal (default: 30)
    #[arg(long, default_value = "30")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Introspect the catalog and generate every artifact
    Generate {
        /// Override source schema
        #[arg(long)]
        schema: Option<String>,

        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Render one job at a time
        #[arg(long)]
        sequential: bool,

        /// Rewrite every artifact, ignoring the manifest
        #[arg(long)]
        force: bool,

        /// Skip artifacts whose inputs did not change
        #[arg(long)]
        incremental: bool,

        /// Directory with <kind>.j2 templates overriding the built-ins
        #[arg(long)]
        template_dir: Option<PathBuf>,

        /// Test-double flavour: mockall or fake
        #[arg(long)]
        mock_provider: Option<String>,
    },

    /// Print the normalized schema as JSON
    Introspect {
        /// Override source schema
        #[arg(long)]
        schema: Option<String>,
    },

    /// List tables that pass the configured filter
    Tables {
        /// Override source schema
        #[arg(long)]
        schema: Option<String>,
    },

    /// Test the catalog connection
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

async fn run() -> Result<(), CodegenError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler(cli.shutdown_timeout);

    match cli.command {
        Commands::Generate {
            schema,
            workers,
            sequential,
            force,
            incremental,
            template_dir,
            mock_provider,
        } => {
            if let Some(schema) = schema {
                config.source.schema = schema;
            }
            if let Some(w) = workers {
                config.generation.workers = Some(w);
            }
            if sequential {
                config.generation.parallel = false;
            }
            if force {
                config.generation.force = true;
            }
            if incremental {
                config.generation.incremental = true;
            }
            if let Some(dir) = template_dir {
                config.output.template_dir = Some(dir);
            }
            if let Some(provider) = mock_provider {
                config.output.mock_provider = parse_mock_provider(&provider)?;
            }

            let container = Container::build(config, cancel_token).await?;
            let result = container.run().await;
            close(&container).await;
            let report = result?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }

            if let Some(e) = report.error() {
                return Err(e);
            }
        }

        Commands::Introspect { schema } => {
            if let Some(schema) = schema {
                config.source.schema = schema;
            }
            let container = Container::build(config, cancel_token).await?;
            let result = container.introspect().await;
            close(&container).await;
            let schemas = result?;

            if schemas.len() == 1 {
                println!("{}", serde_json::to_string_pretty(&schemas[0])?);
            } else {
                println!("{}", serde_json::to_string_pretty(&schemas)?);
            }
        }

        Commands::Tables { schema } => {
            if let Some(schema) = schema {
                config.source.schema = schema;
            }
            let namespace = config.source.schema.clone();
            let container = Container::build(config, cancel_token).await?;
            let result = container.tables(&namespace).await;
            close(&container).await;
            let tables = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    println!("{}", table);
                }
            }
        }

        Commands::HealthCheck => {
            let container = Container::build(config, cancel_token).await?;
            let result = container.health().await;
            close(&container).await;
            let health = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Health Check Results:");
                println!("  Catalog ({}): OK ({}ms)", health.db_type, health.latency_ms);
                println!(
                    "  Pool: {} open, {} idle, {} acquired (max {})",
                    health.pool.total, health.pool.idle, health.pool.acquired, health.pool.max_size
                );
                println!(
                    "  Template cache: {}/{} compiled",
                    health.cache.size, health.cache.capacity
                );
                println!("\n  Overall: HEALTHY");
            }
        }
    }

    Ok(())
}

fn parse_mock_provider(value: &str) -> Result<MockProvider, CodegenError> {
    match value {
        "mockall" => Ok(MockProvider::Mockall),
        "fake" => Ok(MockProvider::Fake),
        other => Err(CodegenError::Config(format!(
            "unknown mock provider '{}' (expected mockall or fake)",
            other
        ))),
    }
}

async fn close(container: &Container) {
    if let Err(e) = container.close().await {
        warn!("Teardown reported errors: {}", e);
    }
}

fn print_report(report: &GenerationReport) {
    println!("\nGeneration {}!", report.status);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Namespaces: {}", report.namespaces.join(", "));
    println!("  Tables: {}", report.tables_processed);
    println!(
        "  Files: {} written, {} unchanged ({} bytes)",
        report.files_written, report.files_skipped, report.bytes_written
    );
    for path in &report.migrations {
        println!("  Migration: {}", path.display());
    }
    if !report.failures.is_empty() {
        println!("  Failed artifacts:");
        for f in &report.failures {
            println!("    {}.{} [{}]: {}", f.namespace, f.table, f.artifact, f.error);
        }
    }
    for f in &report.namespace_failures {
        println!("  Failed namespace {}: {}", f.namespace, f.error);
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
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM. Started jobs get
/// `shutdown_timeout` seconds to finish before the process exits.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!(
                "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
                name, shutdown_timeout
            );
            token.cancel();
            force_exit_after(shutdown_timeout).await;
        });
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
        token.cancel();
        force_exit_after(shutdown_timeout).await;
    });

    cancel_token
}

async fn force_exit_after(shutdown_timeout: u64) {
    tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
    eprintln!("Shutdown timeout reached, exiting");
    std::process::exit(i32::from(CodegenError::Cancelled.exit_code()));
}
