//! Interactive run setup: prompts for the source mode and the two identifiers.

use dialoguer::{Confirm, Input, Select};
use etlpipe::{Config, SourceConfig};
use std::path::PathBuf;

/// Result type for prompt sessions.
pub type WizardResult<T> = Result<T, WizardError>;

/// Errors that can occur while prompting.
#[derive(Debug)]
pub enum WizardError {
    /// User declined to run.
    Cancelled,
    /// Terminal I/O error.
    Io(std::io::Error),
    /// The loaded configuration cannot serve the selected mode.
    Config(String),
}

impl std::fmt::Display for WizardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Run cancelled"),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for WizardError {}

impl From<std::io::Error> for WizardError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<dialoguer::Error> for WizardError {
    fn from(e: dialoguer::Error) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}

/// Where the data comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceMode {
    Database,
    File,
}

impl SourceMode {
    fn of(source: &SourceConfig) -> Self {
        match source {
            SourceConfig::Query { .. } => SourceMode::Database,
            SourceConfig::File { .. } => SourceMode::File,
        }
    }
}

/// Prompt for the run's source and destination, starting from `config`.
///
/// Database mode reuses the source connection from the loaded configuration.
pub fn prompt_run(mut config: Config) -> WizardResult<Config> {
    println!();
    println!("etlpipe - Interactive Run");
    println!("=========================");
    println!();

    let mode = prompt_mode(SourceMode::of(&config.source))?;

    config.source = match (mode, config.source) {
        (SourceMode::Database, SourceConfig::Query { connection, sql }) => {
            let sql: String = Input::new()
                .with_prompt("  Source query")
                .default(sql)
                .interact_text()?;
            SourceConfig::Query { connection, sql }
        }
        (SourceMode::Database, SourceConfig::File { .. }) => {
            return Err(WizardError::Config(
                "database mode needs a source connection in the configuration file".to_string(),
            ));
        }
        (SourceMode::File, existing) => {
            let default_path = match &existing {
                SourceConfig::File { path, .. } => path.display().to_string(),
                SourceConfig::Query { .. } => String::new(),
            };
            let path: String = Input::new()
                .with_prompt("  Source file (.csv, .xlsx, .xls, .ods)")
                .default(default_path)
                .interact_text()?;
            let sheet: String = Input::new()
                .with_prompt("  Sheet (blank for the first)")
                .allow_empty(true)
                .interact_text()?;
            SourceConfig::File {
                path: PathBuf::from(path.trim()),
                sheet: Some(sheet.trim().to_string()).filter(|s| !s.is_empty()),
            }
        }
    };

    config.destination.table = Input::new()
        .with_prompt("  Destination table")
        .default(config.destination.table.clone())
        .interact_text()?;

    println!();
    print_summary(&config);

    if !Confirm::new()
        .with_prompt("Start the run?")
        .default(true)
        .interact()?
    {
        return Err(WizardError::Cancelled);
    }

    Ok(config)
}

fn prompt_mode(current: SourceMode) -> WizardResult<SourceMode> {
    let options = &["Database query", "File"];
    let selection = Select::new()
        .with_prompt("Source mode")
        .items(options)
        .default(match current {
            SourceMode::Database => 0,
            SourceMode::File => 1,
        })
        .interact()?;

    Ok(match selection {
        0 => SourceMode::Database,
        _ => SourceMode::File,
    })
}

fn print_summary(config: &Config) {
    println!("Run Summary");
    println!("-----------");
    match &config.source {
        SourceConfig::Query { connection, sql } => {
            println!(
                "  Source: {} @ {}:{}/{}",
                connection.kind,
                connection.host,
                connection.port(),
                connection.database
            );
            println!("  Query: {}", sql);
        }
        SourceConfig::File { path, sheet } => {
            println!("  Source file: {}", path.display());
            if let Some(sheet) = sheet {
                println!("  Sheet: {}", sheet);
            }
        }
    }
    let dest = &config.destination.connection;
    println!(
        "  Destination: {} @ {}:{}/{}",
        dest.kind,
        dest.host,
        dest.port(),
        dest.database
    );
    match &config.destination.schema {
        Some(schema) => println!("  Table: {}.{}", schema, config.destination.table),
        None => println!("  Table: {}", config.destination.table),
    }
    println!("  Load mode: {:?}", config.load_mode());
    println!();
}
