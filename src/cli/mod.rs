//! # CLI Module
//!
//! Operator command line for the record database.
//!
//! ## Usage
//! ```bash
//! # Fingerprint files or whole directories
//! tagsaver fingerprint ~/Downloads/TagSaver
//!
//! # Would this file be refused as a duplicate?
//! tagsaver check cat.png --threshold 5
//!
//! # Save a file into a pool
//! tagsaver save page2.png --source-url https://site/post/2 --tags artist:ann,cat \
//!     --pool-id comic-1 --pool-index 1
//!
//! # Inspect a pool, back up the database
//! tagsaver pool list comic-1
//! tagsaver export backup.json --output json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagsaver_core::config::Settings;
use tagsaver_core::core::hasher::{HashScheme, MediaRef};
use tagsaver_core::core::pipeline::{SaveOutcome, SavePipeline, SaveRequest};
use tagsaver_core::core::resolver::SimilarityVerdict;
use tagsaver_core::core::store::{export_json, import_json, ImageRecord, RecordStore, SqliteStore};
use tagsaver_core::core::tags::categorize;
use tagsaver_core::error::{Result, TagSaverError};
use walkdir::WalkDir;

/// File extensions picked up when fingerprinting a directory
const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff", "mp4", "webm", "mov", "mkv", "m4v",
];

/// TagSaver - duplicate-aware media records
#[derive(Parser, Debug)]
#[command(name = "tagsaver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Record database path (defaults to the one in settings)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Settings file path
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print fingerprints of media files
    Fingerprint {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Hashing scheme (defaults to the one in settings)
        #[arg(long)]
        scheme: Option<Scheme>,
    },

    /// Check whether a file would be refused as a duplicate
    Check {
        file: PathBuf,

        /// Comparison threshold (lower = stricter)
        #[arg(short, long)]
        threshold: Option<u32>,
    },

    /// Save a file as a new record
    Save {
        file: PathBuf,

        /// Page the media came from
        #[arg(long)]
        source_url: String,

        /// Comma-separated tags, `category:name` allowed
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        #[arg(long)]
        pool_id: Option<String>,

        /// Position in the pool (appends when omitted)
        #[arg(long, requires = "pool_id")]
        pool_index: Option<u32>,
    },

    /// Inspect pools
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },

    /// Suggest stored tags containing a query
    Tags { query: String },

    /// Write all records to a JSON file
    Export { file: PathBuf },

    /// Add records from a JSON export
    Import { file: PathBuf },

    /// Run an integrity check on the record database
    Verify,
}

#[derive(Subcommand, Debug)]
enum PoolAction {
    /// Highest index in use and the suggested next one
    Highest { pool_id: String },
    /// Pool members in order
    List { pool_id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scheme {
    /// DCT hash - robust to resizing and recompression (default)
    Dct,
    /// Mean hash - compatible with records from older versions
    Mean,
}

impl From<Scheme> for HashScheme {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Dct => HashScheme::Dct,
            Scheme::Mean => HashScheme::Mean,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    tagsaver_core::init_tracing();
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path)?;
    if let Some(database) = &cli.database {
        settings.database = database.clone();
    }

    let term = Term::stdout();
    let output = cli.output;

    match cli.command {
        Commands::Fingerprint { paths, scheme } => {
            if let Some(scheme) = scheme {
                settings.hash.scheme = scheme.into();
            }
            run_fingerprint(&term, output, &settings, &paths)
        }
        Commands::Check { file, threshold } => {
            let pipeline = open_pipeline(&settings)?;
            let threshold = threshold.unwrap_or(settings.similarity_threshold);
            run_check(&term, output, &pipeline, &file, threshold)
        }
        Commands::Save {
            file,
            source_url,
            tags,
            pool_id,
            pool_index,
        } => {
            let pipeline = open_pipeline(&settings)?;
            let mut request = SaveRequest::new(source_url, MediaRef::from_path(&file), tags);
            if let Some(pool_id) = pool_id {
                request = request.in_pool(pool_id, pool_index);
            }
            let outcome = pipeline.save(request)?;
            print_save(&term, output, &outcome);
            Ok(())
        }
        Commands::Pool { action } => {
            let pipeline = open_pipeline(&settings)?;
            run_pool(&term, output, &pipeline, action)
        }
        Commands::Tags { query } => {
            let pipeline = open_pipeline(&settings)?;
            let found = pipeline.search_tags(&query)?;
            match output {
                OutputFormat::Pretty => {
                    for tag in found {
                        term.write_line(&tag).ok();
                    }
                }
                OutputFormat::Json => print_json(&serde_json::json!(found)),
            }
            Ok(())
        }
        Commands::Export { file } => {
            let store = open_store(&settings)?;
            let writer = File::create(&file).map_err(|source| TagSaverError::Io {
                path: file.clone(),
                source,
            })?;
            let count = export_json(store.as_ref(), BufWriter::new(writer))?;
            report_count(&term, output, "exported", count, &file);
            Ok(())
        }
        Commands::Import { file } => {
            let store = open_store(&settings)?;
            let reader = File::open(&file).map_err(|source| TagSaverError::Io {
                path: file.clone(),
                source,
            })?;
            let count = import_json(store.as_ref(), BufReader::new(reader))?;
            report_count(&term, output, "imported", count, &file);
            Ok(())
        }
        Commands::Verify => run_verify(&term, output, &settings),
    }
}

fn open_store(settings: &Settings) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&settings.database)?);
    Ok(store)
}

fn open_pipeline(settings: &Settings) -> Result<SavePipeline> {
    let store = open_store(settings)?;
    Ok(SavePipeline::builder(store).settings(settings).build())
}

/// Expand directories into the media files they contain
fn collect_media(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file() && is_media(entry.path()))
                    .map(|entry| entry.into_path()),
            );
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn is_media(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn run_fingerprint(
    term: &Term,
    output: OutputFormat,
    settings: &Settings,
    paths: &[PathBuf],
) -> Result<()> {
    let engine = settings.hasher_config().build();
    let files = collect_media(paths);

    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style(engine.tag()).bold(),
            style(settings.hash.scheme.description()).dim()
        ))
        .ok();
    }

    let progress = if matches!(output, OutputFormat::Pretty) && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        Some(pb)
    } else {
        None
    };

    let mut results = Vec::with_capacity(files.len());
    for file in &files {
        if let Some(pb) = &progress {
            pb.set_message(
                file.file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string(),
            );
        }
        results.push((file, engine.compute_fingerprint(&MediaRef::from_path(file))));
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    match output {
        OutputFormat::Pretty => {
            for (file, result) in &results {
                let line = match result {
                    Ok(fingerprint) => format!("{}  {}", style(fingerprint).cyan(), file.display()),
                    Err(e) => format!("{}  {}", style("unavailable").red(), style(e).dim()),
                };
                term.write_line(&line).ok();
            }
        }
        OutputFormat::Json => {
            let items: Vec<_> = results
                .iter()
                .map(|(file, result)| match result {
                    Ok(fingerprint) => serde_json::json!({
                        "path": file,
                        "fingerprint": fingerprint.to_string(),
                    }),
                    Err(e) => serde_json::json!({
                        "path": file,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            print_json(&serde_json::json!(items));
        }
    }
    Ok(())
}

fn run_check(
    term: &Term,
    output: OutputFormat,
    pipeline: &SavePipeline,
    file: &Path,
    threshold: u32,
) -> Result<()> {
    let fingerprint = pipeline.compute_fingerprint(&MediaRef::from_path(file));
    let verdict = pipeline.check_duplicate_with(fingerprint.as_ref().ok(), threshold)?;

    match output {
        OutputFormat::Pretty => {
            if let Err(e) = &fingerprint {
                term.write_line(&format!(
                    "{} fingerprint unavailable, duplicate check skipped: {}",
                    style("!").yellow().bold(),
                    e
                ))
                .ok();
            }
            print_verdict(term, &verdict);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "fingerprint": fingerprint.as_ref().ok().map(|f| f.to_string()),
            "threshold": threshold,
            "verdict": verdict,
        })),
    }
    Ok(())
}

fn print_verdict(term: &Term, verdict: &SimilarityVerdict) {
    if !verdict.is_duplicate {
        term.write_line(&format!("{} Not a duplicate", style("✓").green().bold()))
            .ok();
        return;
    }

    let kind = if verdict.exact_match {
        "Exact duplicate".to_string()
    } else {
        format!(
            "Near duplicate ({} bits apart)",
            verdict.distance.unwrap_or_default()
        )
    };
    term.write_line(&format!("{} {}", style("✗").red().bold(), style(kind).yellow()))
        .ok();
    if let Some(record) = &verdict.matched_record {
        print_record(term, record);
    }
}

fn print_save(term: &Term, output: OutputFormat, outcome: &SaveOutcome) {
    match output {
        OutputFormat::Json => {
            let value = match outcome {
                SaveOutcome::Saved {
                    record,
                    fingerprint_skipped,
                } => serde_json::json!({
                    "saved": true,
                    "record": record,
                    "fingerprint_skipped": fingerprint_skipped,
                }),
                SaveOutcome::Duplicate(verdict) => serde_json::json!({
                    "saved": false,
                    "verdict": verdict,
                }),
            };
            print_json(&value);
        }
        OutputFormat::Pretty => match outcome {
            SaveOutcome::Saved {
                record,
                fingerprint_skipped,
            } => {
                term.write_line(&format!(
                    "{} Saved record {}",
                    style("✓").green().bold(),
                    style(record.id).cyan()
                ))
                .ok();
                if let Some(reason) = fingerprint_skipped {
                    term.write_line(&format!(
                        "  {} {}",
                        style("no fingerprint:").yellow(),
                        style(reason).dim()
                    ))
                    .ok();
                }
                print_record(term, record);
            }
            SaveOutcome::Duplicate(verdict) => print_verdict(term, verdict),
        },
    }
}

fn print_record(term: &Term, record: &ImageRecord) {
    term.write_line(&format!(
        "  {} {}",
        style(format!("#{}", record.id)).bold(),
        record.source_url
    ))
    .ok();
    term.write_line(&format!("    media: {}", style(&record.media_url).dim()))
        .ok();
    if let Some((pool_id, index)) = record.pool_slot() {
        term.write_line(&format!("    pool:  {} [{}]", pool_id, index)).ok();
    }
    for (category, names) in categorize(&record.tags) {
        term.write_line(&format!(
            "    {}: {}",
            style(category).dim(),
            names.join(", ")
        ))
        .ok();
    }
}

fn run_pool(
    term: &Term,
    output: OutputFormat,
    pipeline: &SavePipeline,
    action: PoolAction,
) -> Result<()> {
    match action {
        PoolAction::Highest { pool_id } => {
            let highest = pipeline.get_highest_pool_index(&pool_id)?;
            let next = pipeline.next_pool_index(&pool_id)?;
            match output {
                OutputFormat::Pretty => {
                    let shown = highest.map_or_else(|| "empty".to_string(), |i| i.to_string());
                    term.write_line(&format!(
                        "{}: highest {}, next {}",
                        style(&pool_id).bold(),
                        style(shown).cyan(),
                        style(next).green()
                    ))
                    .ok();
                }
                OutputFormat::Json => print_json(&serde_json::json!({
                    "pool_id": pool_id,
                    "highest": highest,
                    "next": next,
                })),
            }
        }
        PoolAction::List { pool_id } => {
            let members = pipeline.pool_members(&pool_id)?;
            match output {
                OutputFormat::Pretty => {
                    for record in &members {
                        print_record(term, record);
                    }
                }
                OutputFormat::Json => print_json(&serde_json::json!(members)),
            }
        }
    }
    Ok(())
}

fn run_verify(term: &Term, output: OutputFormat, settings: &Settings) -> Result<()> {
    let store = SqliteStore::open(&settings.database)?;
    let result = store.verify();

    match output {
        OutputFormat::Pretty => {
            let line = match &result {
                Ok(()) => format!("{} {} is intact", style("✓").green().bold(), store.path().display()),
                Err(e) => format!("{} {}", style("✗").red().bold(), e),
            };
            term.write_line(&line).ok();
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "database": store.path(),
            "ok": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.to_string()),
        })),
    }

    Ok(result?)
}

fn report_count(term: &Term, output: OutputFormat, verb: &str, count: usize, file: &Path) {
    match output {
        OutputFormat::Pretty => {
            term.write_line(&format!(
                "{} {} {} records ({})",
                style("✓").green().bold(),
                verb,
                style(count).cyan(),
                file.display()
            ))
            .ok();
        }
        OutputFormat::Json => print_json(&serde_json::json!({ "action": verb, "count": count })),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to render JSON: {e}"),
    }
}
