//! etlpipe CLI - audited ETL runs from queries or files into database tables.

mod wizard;

use clap::{Parser, Subcommand};
use etlpipe::{Config, EtlError, Orchestrator, RunResult, SourceConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "etlpipe")]
#[command(about = "Audited ETL runs from SQL queries or flat files into database tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "etl.yaml", global = true)]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured ETL job
    Run {
        /// Override source file path (switches the source to file mode)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Override source query
        #[arg(long, conflicts_with = "file")]
        query: Option<String>,

        /// Override destination table
        #[arg(long)]
        table: Option<String>,

        /// Override destination schema
        #[arg(long)]
        schema: Option<String>,
    },

    /// Prompt for the source mode and identifiers, then run
    Interactive,

    /// Test database connections
    HealthCheck,

    /// Print the destination table's column types
    Schema,

    /// Create the audit log table if it does not exist
    InitAudit,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, EtlError> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;

    // Prompts run before logging is installed to keep the terminal clean
    if let Commands::Interactive = cli.command {
        config = wizard::prompt_run(config).map_err(|e| EtlError::Config(e.to_string()))?;
        config.validate()?;
    }

    setup_logging(&cli.verbosity, &cli.log_format);
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            file,
            query,
            table,
            schema,
        } => {
            apply_overrides(&mut config, file, query, table, schema)?;
            let result = Orchestrator::new(config).run().await;
            print_result(&result, cli.output_json)?;
            Ok(exit_for(&result))
        }

        Commands::Interactive => {
            let result = Orchestrator::new(config).run().await;
            print_result(&result, cli.output_json)?;
            Ok(exit_for(&result))
        }

        Commands::HealthCheck => {
            let results = Orchestrator::new(config).health_check().await;
            let healthy = results.iter().all(|r| r.healthy);

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Health Check Results:");
                for r in &results {
                    println!(
                        "  {} ({} @ {}:{}): {}",
                        r.label,
                        r.kind,
                        r.host,
                        r.port,
                        if r.healthy { "OK" } else { "FAILED" }
                    );
                    if let Some(ref err) = r.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Err(EtlError::Config("Health check failed".to_string()));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Schema => {
            let table = config.destination.table.clone();
            let columns = Orchestrator::new(config).destination_schema().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else if columns.is_empty() {
                println!("No columns found for {}", table);
            } else {
                println!("Columns of {}:", table);
                for (name, data_type) in columns.iter() {
                    println!("  {:<32} {}", name, data_type);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::InitAudit => {
            let table = config.audit.table.clone();
            let created = Orchestrator::new(config).init_audit().await?;
            if created {
                println!("Created audit table {}", table);
            } else {
                println!("Audit table {} already exists", table);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_overrides(
    config: &mut Config,
    file: Option<PathBuf>,
    query: Option<String>,
    table: Option<String>,
    schema: Option<String>,
) -> Result<(), EtlError> {
    if let Some(path) = file {
        config.source = SourceConfig::File { path, sheet: None };
    }
    if let Some(sql) = query {
        match &mut config.source {
            SourceConfig::Query { sql: current, .. } => *current = sql,
            SourceConfig::File { .. } => {
                return Err(EtlError::Config(
                    "--query needs a query source with a connection in the configuration file"
                        .to_string(),
                ))
            }
        }
    }
    if let Some(table) = table {
        config.destination.table = table;
    }
    if let Some(schema) = schema {
        config.destination.schema = Some(schema);
    }
    config.validate()
}

fn print_result(result: &RunResult, output_json: bool) -> Result<(), EtlError> {
    if output_json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    let headline = if result.is_success() {
        "ETL run completed!"
    } else {
        "ETL run failed."
    };
    println!("\n{}", headline);
    println!("  Run ID: {}", result.run_id);
    println!("  Process: {}", result.process_name);
    println!("  Status: {} (stage {})", result.status, result.final_stage);
    println!("  Details: {}", result.details);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Rows: {} extracted, {} loaded",
        result.rows_extracted, result.rows_loaded
    );
    for m in &result.mismatches {
        println!(
            "  Mismatch: {} ({} -> {})",
            m.column, m.source_type, m.destination_type
        );
    }
    Ok(())
}

fn exit_for(result: &RunResult) -> ExitCode {
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
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
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
