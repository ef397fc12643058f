use anyhow::{Context, Result};
use bestiary_core::database::Database;
use bestiary_core::file_utils::read_sheet;
use bestiary_core::pipeline::{self, STAGES};
use bestiary_core::{BestiaryError, PipelineConfig};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "bestiary",
    version = "0.1.0",
    about = "Normalize the monster stat sheet into SQLite and query it",
    long_about = None
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true, default_value = "./bestiary.sqlite")]
    database: std::path::PathBuf,

    /// Path to log file
    #[arg(long, global = true, default_value = "/tmp/bestiary.log")]
    log_file: std::path::PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the normalization pipeline over a CSV export of the stat sheet
    Ingest {
        /// CSV export of the "Official Stats" sheet
        #[arg(long)]
        input: std::path::PathBuf,
        /// Pipeline configuration (TOML)
        #[arg(long)]
        config: Option<std::path::PathBuf>,
        /// Hide the progress bar and run report
        #[arg(long)]
        quiet: bool,
    },

    /// Print one monster, or one attribute group of it, as JSON
    Show {
        /// Monster id (zero-based row of the source sheet)
        #[arg(long)]
        id: i64,
        /// Attribute group to print
        #[arg(long, value_enum, default_value_t = Group::Sheet)]
        group: Group,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Group {
    Sheet,
    Physical,
    Alignment,
    Base,
    Abilities,
    SavingThrows,
    Skills,
    Damage,
    Senses,
    Languages,
}

fn setup_logging(verbose: u8, log_file: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(std::path::Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("bestiary.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

fn ingest(
    db_path: &std::path::Path,
    input: &std::path::Path,
    config_path: Option<&std::path::Path>,
    quiet: bool,
) -> Result<()> {
    let config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    let raw = read_sheet(input, config.delimiter_byte())
        .with_context(|| format!("Failed to read sheet {:?}", input))?;
    info!("Read {} rows from {:?}", raw.len(), input);

    let mut db = Database::new(db_path)?;

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(STAGES.len() as u64)
    };
    progress.set_style(
        ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} {msg} [{elapsed_precise}]")?
            .progress_chars("##-"),
    );

    let report = pipeline::run_with_progress(raw, &config, &mut db, |stage| {
        progress.set_message(stage.to_string());
        progress.inc(1);
    });
    progress.finish_and_clear();
    let report = report?;

    if !quiet {
        println!(
            "Read {} rows, dropped {} template rows",
            report.rows_read, report.rows_filtered
        );
        for (relation, rows) in &report.relations {
            println!("  {:<14} {:>6} rows", relation, rows);
        }
    }
    info!("Ingest complete. Data stored in database: {:?}", db_path);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show(db: &Database, id: i64, group: Group) -> bestiary_core::Result<serde_json::Value> {
    let to_json = |value: serde_json::Result<serde_json::Value>| {
        value.map_err(|e| BestiaryError::Parse(format!("Failed to serialize monster {}: {}", id, e)))
    };
    match group {
        Group::Sheet => to_json(serde_json::to_value(db.monster_sheet_by_id(id)?)),
        Group::Physical => to_json(serde_json::to_value(db.physical_stats_by_id(id)?)),
        Group::Alignment => to_json(serde_json::to_value(db.alignment_by_id(id)?)),
        Group::Base => to_json(serde_json::to_value(db.base_stats_by_id(id)?)),
        Group::Abilities => to_json(serde_json::to_value(db.ability_scores_by_id(id)?)),
        Group::SavingThrows => to_json(serde_json::to_value(db.saving_throws_by_id(id)?)),
        Group::Skills => to_json(serde_json::to_value(db.skills_by_id(id)?)),
        Group::Damage => to_json(serde_json::to_value(db.damage_modifiers_by_id(id)?)),
        Group::Senses => to_json(serde_json::to_value(db.senses_by_id(id)?)),
        Group::Languages => to_json(serde_json::to_value(db.languages_by_id(id)?)),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    info!("Starting bestiary CLI");

    match cli.command {
        Commands::Ingest { input, config, quiet } => {
            ingest(&cli.database, &input, config.as_deref(), quiet)?;
        }
        Commands::Show { id, group } => {
            if !cli.database.exists() {
                anyhow::bail!("Database not found at {:?}; run `bestiary ingest` first", cli.database);
            }
            let db = Database::new(&cli.database)?;
            match show(&db, id, group) {
                Ok(value) => print_json(&value)?,
                Err(e) if e.is_not_found() => {
                    eprintln!("No monster with id {} ({})", id, e);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
