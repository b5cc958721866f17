//! # chunkvault CLI
//!
//! Command-line interface for the chunkvault backup engine.
//!
//! ## Usage
//! ```bash
//! # Archive a tree (incremental; safe to re-run)
//! chunkvault archive ~/documents /backups/documents
//!
//! # Generate a restore script and data-key sidecar
//! chunkvault restore /backups/documents /tmp/recovered
//!
//! # Drop deletion history older than 90 days
//! chunkvault prune /backups/documents --keep-deleted 90d
//!
//! # Report orphaned chunks (writes a removal proposal, deletes nothing)
//! chunkvault gc /backups/documents
//! ```
//!
//! The archive password comes from `--password` or the
//! `CHUNKVAULT_PASSWORD` environment variable.

use anyhow::{bail, Context};
use chunkvault::{
    find_unused_chunks, format_bytes, write_removal_script, ArchiveWalker, ChunkStore,
    CommandCipher, Document, ExcludeList, IndexStore, ProgressReporter, Restorer, VaultConfig,
};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Environment variable consulted when `--password` is absent
const PASSWORD_ENV: &str = "CHUNKVAULT_PASSWORD";

/// chunkvault - deduplicating, content-addressed, encrypted backups
#[derive(Parser)]
#[command(name = "chunkvault")]
#[command(version)]
#[command(about = "Deduplicating, content-addressed, encrypted backups")]
struct Cli {
    /// Archive password (defaults to $CHUNKVAULT_PASSWORD)
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Store the index as plain JSON (no compression, no encryption)
    #[arg(long, global = true)]
    plain_index: bool,

    /// Do not compress the index artifact
    #[arg(long, global = true)]
    no_index_compress: bool,

    /// Do not encrypt the index artifact
    #[arg(long, global = true)]
    no_index_encrypt: bool,

    /// External cipher program for bulk encryption
    #[arg(long, global = true, default_value = "openssl")]
    cipher_program: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a source tree into a destination archive
    Archive {
        /// Source directory to scan
        source: PathBuf,

        /// Archive location (chunk store + index)
        destination: PathBuf,

        /// Read exclusion globs from a file (one per line, # comments)
        #[arg(long)]
        exclude_from: Option<PathBuf>,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,

        /// Interval between mid-walk index checkpoints (0s disables)
        #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
        checkpoint_interval: Duration,

        /// Interval between progress reports
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        progress_interval: Duration,
    },

    /// Generate a restore script reconstructing archived files
    Restore {
        /// Archive location to restore from
        source: PathBuf,

        /// Destination directory for the script and restored files
        destination: PathBuf,

        /// Restore only paths matching this glob
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Drop tombstoned file versions older than a retention duration
    Prune {
        /// Archive location
        location: PathBuf,

        /// Retention window for deleted versions ("90d", "26w", "1y")
        #[arg(long, value_parser = humantime::parse_duration)]
        keep_deleted: Duration,
    },

    /// Report chunks unreferenced by any current or historical file
    #[command(alias = "gc")]
    GarbageCollect {
        /// Archive location
        location: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let password = match cli.password.clone() {
        Some(p) => p,
        None => match std::env::var(PASSWORD_ENV) {
            Ok(p) => p,
            Err(_) => bail!("no password given (use --password or ${PASSWORD_ENV})"),
        },
    };

    let mut config = VaultConfig {
        password,
        compress_index: !(cli.plain_index || cli.no_index_compress),
        encrypt_index: !(cli.plain_index || cli.no_index_encrypt),
        cipher_program: cli.cipher_program.clone(),
        ..VaultConfig::default()
    };

    match cli.command {
        Commands::Archive {
            source,
            destination,
            exclude_from,
            follow_symlinks,
            checkpoint_interval,
            progress_interval,
        } => {
            config.follow_symlinks = follow_symlinks;
            config.checkpoint_interval = checkpoint_interval;
            cmd_archive(config, source, destination, exclude_from, progress_interval)
        }
        Commands::Restore {
            source,
            destination,
            pattern,
        } => cmd_restore(config, source, destination, pattern),
        Commands::Prune {
            location,
            keep_deleted,
        } => cmd_prune(config, location, keep_deleted),
        Commands::GarbageCollect { location } => cmd_gc(config, location),
    }
}

/// Run one incremental archive scan
fn cmd_archive(
    config: VaultConfig,
    source: PathBuf,
    destination: PathBuf,
    exclude_from: Option<PathBuf>,
    progress_interval: Duration,
) -> anyhow::Result<()> {
    // Configuration problems must surface before any mutation.
    let excludes = match &exclude_from {
        Some(path) => ExcludeList::from_file(path)
            .with_context(|| format!("failed loading exclude file {path:?}"))?,
        None => ExcludeList::empty(),
    };

    std::fs::create_dir_all(&destination)
        .with_context(|| format!("failed creating archive location {destination:?}"))?;
    let source = source
        .canonicalize()
        .with_context(|| format!("source directory {source:?} not accessible"))?;
    let destination = destination.canonicalize()?;

    println!(
        "{} {} {} {}",
        "Archiving".blue().bold(),
        source.display().to_string().cyan(),
        "into".blue().bold(),
        destination.display().to_string().cyan()
    );

    let cipher = Arc::new(CommandCipher::new(&config.cipher_program));
    let index = IndexStore::new(&destination, &config, cipher.clone());
    let mut doc = index.load()?;
    let store = ChunkStore::new(&destination);

    let mut walker = ArchiveWalker::new(source, store, index, cipher, &config, excludes);
    let reporter = ProgressReporter::spawn(walker.counters(), progress_interval);

    let start = Instant::now();
    let result = walker.run(&mut doc);
    reporter.stop();
    let summary = result?;

    println!("{} Archive run complete", "✓".green().bold());
    println!(
        "  Processed: {} files ({})",
        summary.files_processed.to_string().cyan(),
        format_bytes(summary.bytes_processed).cyan()
    );
    println!(
        "  Unchanged: {} files ({})",
        summary.files_skipped.to_string().cyan(),
        format_bytes(summary.bytes_skipped).cyan()
    );
    if summary.files_deleted > 0 {
        println!(
            "  Deleted: {} files tombstoned",
            summary.files_deleted.to_string().yellow()
        );
    }
    println!(
        "  Chunks written: {}",
        summary.chunks_written.to_string().cyan()
    );
    println!(
        "  Time: {}",
        format_duration(round_secs(start.elapsed())).to_string().cyan()
    );

    Ok(())
}

/// Generate the restore script for an archive
fn cmd_restore(
    config: VaultConfig,
    source: PathBuf,
    destination: PathBuf,
    pattern: Option<String>,
) -> anyhow::Result<()> {
    let doc = load_existing(&config, &source)?;

    if let Some(pattern) = &pattern {
        println!(
            "{} {}",
            "Using restore pattern".blue().bold(),
            pattern.cyan()
        );
    }

    let store = ChunkStore::new(&source);
    let mut restorer = Restorer::new(store, &destination, &config);
    if let Some(pattern) = &pattern {
        restorer = restorer.with_pattern(pattern)?;
    }

    let plan = restorer.plan(&doc);
    let script = restorer.write_script(&doc, &plan)?;

    println!("{} Restore script generated", "✓".green().bold());
    println!(
        "  Files: {} of {}",
        plan.files_selected.to_string().cyan(),
        plan.files_total
    );
    println!("  Script: {}", script.display().to_string().cyan());
    println!(
        "\nReview the script, then run it to reconstruct the files.\n{}",
        "The data key sidecar next to it is secret; delete both afterwards."
            .yellow()
    );

    Ok(())
}

/// Prune old deletion history
fn cmd_prune(config: VaultConfig, location: PathBuf, keep_deleted: Duration) -> anyhow::Result<()> {
    let retention = chrono::Duration::from_std(keep_deleted)
        .context("retention duration out of range")?;

    let cipher = Arc::new(CommandCipher::new(&config.cipher_program));
    let index = IndexStore::new(&location, &config, cipher);
    if index.existing_index_path().is_none() {
        bail!("no archive index found at {location:?}");
    }
    let mut doc = index.load()?;

    let removed = doc.prune_deleted(retention, chrono::Utc::now());
    index.save(&mut doc)?;

    println!("{} Prune complete", "✓".green().bold());
    println!(
        "  Removed: {} tombstoned versions",
        removed.to_string().cyan()
    );
    println!(
        "  Remaining deleted paths: {}",
        doc.deleted_count().to_string().cyan()
    );

    Ok(())
}

/// Report unreferenced chunks and write the removal proposal
fn cmd_gc(config: VaultConfig, location: PathBuf) -> anyhow::Result<()> {
    let doc = load_existing(&config, &location)?;
    let store = ChunkStore::new(&location);

    let report = find_unused_chunks(&doc, &store)?;

    println!("{} Garbage collection scan complete", "✓".green().bold());
    println!("  Blobs examined: {}", report.examined.to_string().cyan());
    println!(
        "  Unused: {}",
        report.unused.len().to_string().yellow().bold()
    );

    for path in report.unused.iter().take(10) {
        println!("    - {}", path.dimmed());
    }
    if report.unused.len() > 10 {
        println!("    ... and {} more", report.unused.len() - 10);
    }

    if let Some(script) = write_removal_script(&store, &report)? {
        println!(
            "\nNothing was deleted. Review and run {} to remove the chunks.",
            script.display().to_string().cyan()
        );
    }

    Ok(())
}

// Helper functions

/// Load the index of an existing archive, refusing to invent a new one
fn load_existing(config: &VaultConfig, location: &std::path::Path) -> anyhow::Result<Document> {
    let cipher = Arc::new(CommandCipher::new(&config.cipher_program));
    let index = IndexStore::new(location, config, cipher);

    if index.existing_index_path().is_none() {
        bail!("no archive index found at {location:?}");
    }

    Ok(index.load()?)
}

/// Round a duration to whole seconds for display
fn round_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}
