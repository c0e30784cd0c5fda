//! Command-line interface for the ETL pipeline.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{date_from_file_name, validate_dump_date, DEFAULT_DB_FILE};
use crate::error::{EtlError, Result};
use crate::etl::{pending_dumps, process_dump, DumpSummary};
use crate::records::fbo_nightly_kinds;
use crate::store::{ConflictPolicy, Store};
use crate::taxonomy::Taxonomy;

/// FBO Nightly ETL - Parse procurement dumps and load them into SQLite.
#[derive(Parser)]
#[command(name = "fbo-nightly")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every pending dump in a data directory, oldest first.
    Run {
        /// Directory containing FBOFeedYYYYMMDD files.
        data_dir: PathBuf,

        /// Destination database path.
        #[arg(short, long, default_value = DEFAULT_DB_FILE)]
        db: PathBuf,

        /// Reprocess dumps already marked complete.
        #[arg(long)]
        force: bool,

        /// Keep stored values when a re-load conflicts with them.
        #[arg(long)]
        keep_existing: bool,

        /// External taxonomy YAML overriding the built-in tag table.
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },

    /// Process a single dump file.
    LoadFile {
        /// Dump file to process.
        file: PathBuf,

        /// Destination database path.
        #[arg(short, long, default_value = DEFAULT_DB_FILE)]
        db: PathBuf,

        /// Publish date (YYYYMMDD); default: taken from the filename.
        #[arg(long)]
        date: Option<String>,

        /// Keep stored values when a re-load conflicts with them.
        #[arg(long)]
        keep_existing: bool,

        /// External taxonomy YAML overriding the built-in tag table.
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },

    /// Create destination tables and exit.
    InitDb {
        /// Destination database path.
        #[arg(short, long, default_value = DEFAULT_DB_FILE)]
        db: PathBuf,
    },

    /// Show recent audit log entries.
    Log {
        /// Destination database path.
        #[arg(short, long, default_value = DEFAULT_DB_FILE)]
        db: PathBuf,

        /// Maximum number of entries to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data_dir,
            db,
            force,
            keep_existing,
            taxonomy,
        } => run_command(
            &data_dir,
            &db,
            force,
            policy_for(keep_existing),
            taxonomy.as_deref(),
        ),
        Commands::LoadFile {
            file,
            db,
            date,
            keep_existing,
            taxonomy,
        } => load_file_command(
            &file,
            &db,
            date.as_deref(),
            policy_for(keep_existing),
            taxonomy.as_deref(),
        ),
        Commands::InitDb { db } => init_db_command(&db),
        Commands::Log { db, limit } => log_command(&db, limit),
    }
}

fn policy_for(keep_existing: bool) -> ConflictPolicy {
    if keep_existing {
        ConflictPolicy::KeepExisting
    } else {
        ConflictPolicy::LastWins
    }
}

fn load_taxonomy(path: Option<&Path>) -> Result<Taxonomy> {
    match path {
        Some(path) => Taxonomy::from_yaml_file(path),
        None => Ok(Taxonomy::fbo_nightly()),
    }
}

/// Execute the run command.
fn run_command(
    data_dir: &Path,
    db: &Path,
    force: bool,
    policy: ConflictPolicy,
    taxonomy_path: Option<&Path>,
) -> Result<()> {
    if !data_dir.is_dir() {
        return Err(EtlError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Data directory does not exist: {}", data_dir.display()),
        )));
    }

    let taxonomy = load_taxonomy(taxonomy_path)?;
    let kinds = fbo_nightly_kinds();

    let mut store = Store::open(db)?;
    store.init_schema(&kinds)?;

    let pending = pending_dumps(data_dir, &store, force)?;
    if pending.is_empty() {
        println!("{}", style("Nothing to do; all dumps processed.").green());
        return Ok(());
    }

    println!(
        "{} {} dump(s) from {}",
        style("Processing").bold(),
        style(pending.len()).cyan(),
        style(data_dir.display()).green()
    );
    println!();

    let pb = ProgressBar::new(pending.len() as u64);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.green} {pos}/{len} {msg}")
            .expect("valid template"),
    );

    let mut summaries = Vec::with_capacity(pending.len());
    for (path, date) in pending {
        pb.set_message(format!("{date}"));
        let summary = match process_dump(&path, date, &mut store, &taxonomy, &kinds, policy) {
            Ok(summary) => summary,
            Err(e) => {
                pb.finish_and_clear();
                return Err(e);
            }
        };
        summaries.push(summary);
        pb.inc(1);
    }
    pb.finish_and_clear();

    for summary in &summaries {
        print_summary(summary);
    }

    Ok(())
}

/// Execute the load-file command.
fn load_file_command(
    file: &Path,
    db: &Path,
    date: Option<&str>,
    policy: ConflictPolicy,
    taxonomy_path: Option<&Path>,
) -> Result<()> {
    let date = match date {
        Some(date_str) => validate_dump_date(date_str)?,
        None => date_from_file_name(file)
            .ok_or_else(|| EtlError::UndatedDumpFile(file.to_path_buf()))?,
    };

    let taxonomy = load_taxonomy(taxonomy_path)?;
    let kinds = fbo_nightly_kinds();

    let mut store = Store::open(db)?;
    store.init_schema(&kinds)?;

    let summary = process_dump(file, date, &mut store, &taxonomy, &kinds, policy)?;
    print_summary(&summary);
    Ok(())
}

/// Execute the init-db command.
fn init_db_command(db: &Path) -> Result<()> {
    let store = Store::open(db)?;
    store.init_schema(&fbo_nightly_kinds())?;
    println!(
        "{} {}",
        style("Initialized").green().bold(),
        db.display()
    );
    Ok(())
}

/// Execute the log command.
fn log_command(db: &Path, limit: usize) -> Result<()> {
    let store = Store::open(db)?;
    for entry in store.recent_log(limit)? {
        println!(
            "{}  {}  {}",
            style(&entry.datetime).dim(),
            style(&entry.datatype).cyan(),
            entry.msg
        );
    }
    Ok(())
}

fn print_summary(summary: &DumpSummary) {
    let stats = summary.stats;
    println!(
        "{}  {} inserted, {} updated, {} unchanged, {}",
        style(summary.date).bold(),
        style(stats.inserted).green(),
        style(stats.updated).cyan(),
        stats.unchanged,
        if stats.rejected > 0 {
            style(format!("{} rejected", stats.rejected)).yellow().bold()
        } else {
            style("0 rejected".to_string()).dim()
        },
    );
}
