//! db-migrator CLI - schema and data migration between relational databases.

use clap::{Parser, Subcommand};
use db_migrator::config::{InsertType, TableSpec};
use db_migrator::{
    connect, Config, ConnectionConfig, ConnectionFactory, DumpJob, FormatType, LoadJob,
    MigrateError, MigrationMode, SchemaInput, SchemaJob, SchemaOutput, ScriptType,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "db-migrator")]
#[command(about = "Schema and data migration between relational databases")]
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
    /// Dump source tables and queries into a catalog directory
    Dump {
        /// Catalog directory to write
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Entry format: csv, xml, bson or bin
        #[arg(long, value_parser = parse_format)]
        format: Option<FormatType>,

        /// Table to dump as NAME[:COL,COL][@FILTER]; repeatable
        #[arg(long = "table", value_parser = parse_table)]
        tables: Vec<TableSpec>,

        /// Native SQL query to dump; repeatable
        #[arg(long = "query")]
        queries: Vec<String>,

        /// Number of worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Row limit for every dump query
        #[arg(long)]
        query_limit: Option<u64>,

        /// Time zone for temporal values (UTC, +02:00)
        #[arg(long)]
        time_zone: Option<String>,

        /// Migration mode: data or schema; repeatable
        #[arg(long = "mode", value_parser = parse_mode)]
        modes: Vec<MigrationMode>,

        /// Table type to dump (TABLE, VIEW); repeatable
        #[arg(long = "table-type")]
        table_types: Vec<String>,
    },

    /// Load a catalog directory into the target database
    Load {
        /// Catalog directory to read
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Number of worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Rows per INSERT batch and transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Insert type: insert or replace
        #[arg(long, value_parser = parse_insert_type)]
        insert_type: Option<InsertType>,

        /// Migration mode: data or schema; repeatable
        #[arg(long = "mode", value_parser = parse_mode)]
        modes: Vec<MigrationMode>,
    },

    /// Generate DDL for a target dialect
    Schema {
        /// Target dialect (mysql, postgres, mssql, oracle, nuodb)
        #[arg(long)]
        dialect: Option<String>,

        /// Script file; stdout when absent
        #[arg(long)]
        output: Option<PathBuf>,

        /// Script type: drop or create; repeatable
        #[arg(long = "script-type", value_parser = parse_script_type)]
        script_types: Vec<ScriptType>,

        /// Schema to create objects in
        #[arg(long)]
        target_schema: Option<String>,

        /// Read schema.json from a dump catalog instead of inspecting the source
        #[arg(long)]
        from_catalog: Option<PathBuf>,

        /// Execute the scripts on the target database
        #[arg(long, conflicts_with = "output")]
        execute: bool,
    },

    /// Test database connections
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

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Dump {
            output_dir,
            format,
            tables,
            queries,
            threads,
            query_limit,
            time_zone,
            modes,
            table_types,
        } => {
            let dump = &mut config.dump;
            if let Some(dir) = output_dir {
                dump.output_dir = dir;
            }
            if let Some(format) = format {
                dump.format = format;
            }
            if !tables.is_empty() {
                dump.tables = tables;
            }
            if !queries.is_empty() {
                dump.queries = queries;
            }
            if let Some(threads) = threads {
                dump.threads = threads;
            }
            if query_limit.is_some() {
                dump.query_limit = query_limit;
            }
            if time_zone.is_some() {
                dump.time_zone = time_zone;
            }
            if !modes.is_empty() {
                dump.migration_modes = modes;
            }
            if !table_types.is_empty() {
                dump.table_types = table_types;
            }
            config.validate()?;

            let factory = Arc::new(ConnectionFactory::new(config.source()?.clone()));
            let result = DumpJob::new(&config, factory)?
                .with_cancellation(cancel_token)
                .run()
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nDump {}!", result.status);
                println!("  Output: {}", result.output_dir.display());
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Entries: {}/{}", result.entries_success, result.entries_total);
                println!("  Rows: {}", result.rows_dumped);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
                if result.schema_written {
                    println!("  Schema: written");
                }
                if !result.failed_entries.is_empty() {
                    println!("  Failed entries: {:?}", result.failed_entries);
                }
            }
            outcome(&result.status, &result.failed_entries)?;
        }

        Commands::Load {
            input_dir,
            threads,
            batch_size,
            insert_type,
            modes,
        } => {
            let load = &mut config.load;
            if let Some(dir) = input_dir {
                load.input_dir = dir;
            }
            if let Some(threads) = threads {
                load.threads = threads;
            }
            if let Some(size) = batch_size {
                load.batch_size = size;
            }
            if let Some(insert_type) = insert_type {
                load.insert_type = insert_type;
            }
            if !modes.is_empty() {
                load.migration_modes = modes;
            }
            config.validate()?;

            let factory = Arc::new(ConnectionFactory::new(config.target()?.clone()));
            let result = LoadJob::new(&config, factory)?
                .with_cancellation(cancel_token)
                .run()
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nLoad {}!", result.status);
                println!("  Input: {}", result.input_dir.display());
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Schema statements: {}", result.schema_statements);
                println!("  Entries: {}/{}", result.entries_success, result.entries_total);
                println!("  Rows: {}", result.rows_loaded);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
                if !result.failed_entries.is_empty() {
                    println!("  Failed entries: {:?}", result.failed_entries);
                }
            }
            outcome(&result.status, &result.failed_entries)?;
        }

        Commands::Schema {
            dialect,
            output,
            script_types,
            target_schema,
            from_catalog,
            execute,
        } => {
            let schema = &mut config.schema;
            if dialect.is_some() {
                schema.dialect = dialect;
            }
            if output.is_some() {
                schema.output = output;
            }
            if !script_types.is_empty() {
                schema.script_types = script_types;
            }
            if target_schema.is_some() {
                schema.target_schema = target_schema;
            }
            config.validate()?;

            let input = match from_catalog {
                Some(dir) => SchemaInput::Catalog(dir),
                None => SchemaInput::Inspect {
                    factory: Arc::new(ConnectionFactory::new(config.source()?.clone())),
                    scope: config.source()?.scope(&config.dump.table_types),
                },
            };
            let output = match (&config.schema.output, execute) {
                (_, true) => {
                    SchemaOutput::Target(Arc::new(ConnectionFactory::new(config.target()?.clone())))
                }
                (Some(path), false) => SchemaOutput::File(path.clone()),
                (None, false) => SchemaOutput::Stdout,
            };
            let writes_stdout = matches!(output, SchemaOutput::Stdout);
            let result = SchemaJob::new(config.schema.clone(), input, output).run().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if !writes_stdout {
                println!("\nSchema generated!");
                println!("  Source: {}", result.source_product);
                println!("  Dialect: {}", result.dialect);
                println!("  Output: {}", result.output);
                println!("  Scripts: {}", result.scripts);
                if execute {
                    println!("  Executed: {}", result.executed);
                }
            }
        }

        Commands::HealthCheck => {
            let connections: Vec<(&str, &ConnectionConfig)> = [
                ("source", config.source.as_ref()),
                ("target", config.target.as_ref()),
            ]
            .into_iter()
            .filter_map(|(role, c)| c.map(|c| (role, c)))
            .collect();
            if connections.is_empty() {
                return Err(MigrateError::Config(
                    "no source or target connection is configured".to_string(),
                ));
            }

            let mut checks = Vec::new();
            for (role, connection) in connections {
                let start = Instant::now();
                let outcome = connect(connection).await;
                let latency_ms = start.elapsed().as_millis() as u64;
                checks.push(match outcome {
                    Ok(session) => serde_json::json!({
                        "role": role,
                        "url": connection.display_url(),
                        "connected": true,
                        "product": session.database_info().product_name,
                        "version": session.database_info().product_version,
                        "latency_ms": latency_ms,
                    }),
                    Err(e) => serde_json::json!({
                        "role": role,
                        "url": connection.display_url(),
                        "connected": false,
                        "error": e.to_string(),
                        "latency_ms": latency_ms,
                    }),
                });
            }
            let healthy = checks.iter().all(|c| c["connected"] == true);

            if cli.output_json {
                let result = serde_json::json!({ "healthy": healthy, "connections": checks });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for check in &checks {
                    let status = if check["connected"] == true { "OK" } else { "FAILED" };
                    println!(
                        "  {} ({}): {} ({}ms)",
                        check["role"].as_str().unwrap_or_default(),
                        check["url"].as_str().unwrap_or_default(),
                        status,
                        check["latency_ms"]
                    );
                    if let Some(product) = check["product"].as_str() {
                        println!("    {} {}", product, check["version"].as_str().unwrap_or_default());
                    }
                    if let Some(err) = check["error"].as_str() {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Err(MigrateError::database("Health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

/// Error for a job that did not complete, so the exit code reflects it.
fn outcome(status: &str, failed: &[String]) -> Result<(), MigrateError> {
    match status {
        "cancelled" => Err(MigrateError::Cancelled),
        "failed" => Err(MigrateError::transfer(
            failed.join(", "),
            format!("{} entries failed", failed.len()),
        )),
        _ => Ok(()),
    }
}

fn parse_format(value: &str) -> Result<FormatType, String> {
    FormatType::from_name(value).ok_or_else(|| format!("unknown format '{}'", value))
}

fn parse_mode(value: &str) -> Result<MigrationMode, String> {
    MigrationMode::from_name(value).ok_or_else(|| format!("unknown migration mode '{}'", value))
}

fn parse_insert_type(value: &str) -> Result<InsertType, String> {
    InsertType::from_name(value).ok_or_else(|| format!("unknown insert type '{}'", value))
}

fn parse_script_type(value: &str) -> Result<ScriptType, String> {
    ScriptType::from_name(value).ok_or_else(|| format!("unknown script type '{}'", value))
}

fn parse_table(value: &str) -> Result<TableSpec, String> {
    TableSpec::parse(value).map_err(|e| e.to_string())
}

/// Logs go to stderr so stdout stays free for scripts and JSON results.
fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

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
                    eprintln!("\nReceived {}. Stopping after the current rows...", name);
                    token.cancel();
                });
            }
            Err(e) => eprintln!("Could not install {} handler: {}", name, e),
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
            eprintln!("\nReceived Ctrl-C. Stopping after the current rows...");
            token.cancel();
        }
    });

    cancel_token
}
