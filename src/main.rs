//! CLI for wordref - Keep citation labels and bibliographies in sync.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::prelude::*;

use wordref::{
    load_from, load_library, style_names, Config, MarkerHandle, MemoryDocument, MemoryLibrary,
    MemoryOrder, Placement, RefreshOutcome, Style, SyncError, Synchronizer,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Keep citation labels and bibliographies in sync
#[derive(Parser)]
#[command(name = "wordref")]
#[command(version)]
#[command(after_help = "\
Examples:
  wordref refresh paper.txt --library refs.json --style ieee
  wordref insert paper.txt smith2020 --after 2 -l refs.json -o paper.txt
  wordref merge paper.txt --markers 1,2 -l refs.json
  wordref styles")]
struct Cli {
    /// Config file (default: ./wordref.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Citation style (overrides the config file, see 'styles' command)
    #[arg(short, long, global = true)]
    style: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DocArgs {
    /// Document file (use '-' for stdin)
    document: PathBuf,

    /// Library file (JSON object keyed by id, JSON array, or JSONL)
    #[arg(short, long)]
    library: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Renumber every citation and rebuild the bibliography
    #[command(after_help = "\
Marker syntax: {cite:id}, {cite:id|[1]}, {group:a,b|[1,2]}")]
    Refresh {
        #[command(flatten)]
        doc: DocArgs,

        /// Forget the stored order before refreshing
        #[arg(long)]
        reset: bool,
    },

    /// Insert a citation, then refresh
    Insert {
        #[command(flatten)]
        doc: DocArgs,

        /// Entry id to cite
        id: String,

        /// Insert right after the N-th marker (1-based, reading order);
        /// without it the citation goes at the end of the body
        #[arg(long)]
        after: Option<usize>,
    },

    /// Merge the given markers into one grouped citation
    Merge {
        #[command(flatten)]
        doc: DocArgs,

        /// Markers to merge (1-based, reading order)
        #[arg(long, value_delimiter = ',', required = true)]
        markers: Vec<usize>,
    },

    /// Split a grouped citation back into single ones
    Unmerge {
        #[command(flatten)]
        doc: DocArgs,

        /// Grouped marker to split (1-based, reading order)
        #[arg(long)]
        marker: usize,
    },

    /// Merge every run of adjacent citations
    Tidy {
        #[command(flatten)]
        doc: DocArgs,
    },

    /// List available citation styles
    Styles,
}

// ---------------------------------------------------------------------------
// AppError: semantic exit codes
// ---------------------------------------------------------------------------

enum AppError {
    /// Exit 10: document file not found / unreadable
    InputFile(String),
    /// Exit 11: library file not found / invalid
    LibraryFile(String),
    /// Exit 12: unknown citation style
    Style(String),
    /// Exit 13: entry id not found in library
    ReferenceNotFound(String),
    /// Exit 14: a document operation failed
    Document(String),
    /// Exit 15: cannot write output file
    OutputFile(String),
    /// Exit 16: config file invalid
    Config(String),
    /// Exit 17: marker number out of range
    Marker(String),
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            AppError::InputFile(_) => 10,
            AppError::LibraryFile(_) => 11,
            AppError::Style(_) => 12,
            AppError::ReferenceNotFound(_) => 13,
            AppError::Document(_) => 14,
            AppError::OutputFile(_) => 15,
            AppError::Config(_) => 16,
            AppError::Marker(_) => 17,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InputFile(msg) => {
                write!(f, "{}\n  hint: verify the file path is correct", msg)
            }
            AppError::LibraryFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: the file must be a JSON object keyed by id, a JSON array of entries, or JSONL (one entry per line)",
                    msg
                )
            }
            AppError::Style(msg) => {
                write!(
                    f,
                    "{}\n  available styles: {}",
                    msg,
                    style_names().join(", ")
                )
            }
            AppError::ReferenceNotFound(msg) => {
                write!(
                    f,
                    "{}\n  hint: check that this id exists in your library file",
                    msg
                )
            }
            AppError::Document(msg) => write!(f, "{}", msg),
            AppError::OutputFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: check that the output directory exists and is writable",
                    msg
                )
            }
            AppError::Config(msg) => {
                write!(f, "{}\n  hint: check the syntax of your wordref.toml", msg)
            }
            AppError::Marker(msg) => {
                write!(
                    f,
                    "{}\n  hint: markers are numbered from 1 in reading order",
                    msg
                )
            }
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::UnknownEntry(_) => AppError::ReferenceNotFound(e.to_string()),
            _ => AppError::Document(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordref=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let options = (cli.config.as_deref(), cli.style.as_deref());

    match cli.command {
        Commands::Refresh { doc, reset } => {
            let (config, style) = settings(options)?;
            let session = Session::open(&doc, &config)?;
            let outcome = if reset {
                session.sync.reset(style).await?
            } else {
                session.sync.refresh_all(style).await?
            };
            if let RefreshOutcome::Completed(report) = &outcome {
                if report.marker_failures > 0 {
                    eprintln!("{} citation(s) could not be updated", report.marker_failures);
                }
            }
            session.write(&doc)?;
        }
        Commands::Insert { doc, id, after } => {
            let (config, style) = settings(options)?;
            let session = Session::open(&doc, &config)?;
            match after {
                Some(n) => {
                    let handle = session.marker(n)?;
                    session
                        .document()
                        .place_cursor_after(handle)
                        .map_err(|e| AppError::Document(e.to_string()))?;
                }
                None => session.document().place_cursor_at_end(),
            }
            let report = session.sync.insert_citation(&id, style).await?;
            match report.placement {
                Placement::AtSelection(_) => eprintln!("inserted {}", id),
                Placement::AtEnd(_) => eprintln!("inserted {} at the end of the document", id),
                Placement::PlainText => eprintln!("inserted {} as plain text", id),
            }
            session.write(&doc)?;
        }
        Commands::Merge { doc, markers } => {
            let (config, style) = settings(options)?;
            let session = Session::open(&doc, &config)?;
            let handles = markers
                .iter()
                .map(|n| session.marker(*n))
                .collect::<Result<Vec<_>, _>>()?;
            session.document().select(&handles);
            let outcome = session.sync.merge_selection(style).await?;
            eprintln!("{}", outcome.message());
            session.write(&doc)?;
        }
        Commands::Unmerge { doc, marker } => {
            let (config, style) = settings(options)?;
            let session = Session::open(&doc, &config)?;
            let handle = session.marker(marker)?;
            session.document().select(&[handle]);
            let outcome = session.sync.unmerge_selection(style).await?;
            eprintln!("{}", outcome.message());
            session.write(&doc)?;
        }
        Commands::Tidy { doc } => {
            let (config, style) = settings(options)?;
            let session = Session::open(&doc, &config)?;
            let merged = session.sync.tidy(style).await?;
            eprintln!("merged {} run(s) of adjacent citations", merged.len());
            session.write(&doc)?;
        }
        Commands::Styles => styles_command(),
    }

    Ok(())
}

/// Loads the config file and picks the style; `--style` wins over the file.
fn settings((config, style): (Option<&Path>, Option<&str>)) -> Result<(Config, Style), AppError> {
    let config = load_from(config).map_err(|e| AppError::Config(e.to_string()))?;
    let style = match style {
        Some(name) => name
            .parse::<Style>()
            .map_err(|e| AppError::Style(e.to_string()))?,
        None => config.style,
    };
    Ok((config, style))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A document and library loaded from disk.
struct Session {
    sync: Synchronizer<MemoryDocument>,
}

impl Session {
    fn open(args: &DocArgs, config: &Config) -> Result<Self, AppError> {
        let text = read_input(&args.document)?;
        let library = load_library(&args.library)
            .map_err(|e| AppError::LibraryFile(format!("'{}': {}", args.library.display(), e)))?;

        let sync = Synchronizer::new(
            Arc::new(
                MemoryDocument::parse(&text).with_bibliography_heading(&config.bibliography_heading),
            ),
            Arc::new(MemoryLibrary::new(library)),
            Arc::new(MemoryOrder::new()),
            config.sync_settings(),
        );
        Ok(Self { sync })
    }

    fn document(&self) -> &MemoryDocument {
        self.sync.host()
    }

    /// Handle of the `n`-th marker in reading order.
    fn marker(&self, n: usize) -> Result<MarkerHandle, AppError> {
        let handles = self.document().markers_in_order();
        n.checked_sub(1)
            .and_then(|i| handles.get(i).copied())
            .ok_or_else(|| {
                AppError::Marker(format!(
                    "no marker {} (the document has {})",
                    n,
                    handles.len()
                ))
            })
    }

    fn write(&self, args: &DocArgs) -> Result<(), AppError> {
        let result = self.document().to_text();
        if let Some(output_path) = &args.output {
            fs::write(output_path, &result).map_err(|e| {
                AppError::OutputFile(format!("'{}': {}", output_path.display(), e))
            })?;
            eprintln!(
                "{} citation(s), wrote {}",
                self.sync.order().current().len(),
                output_path.display()
            );
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write!(handle, "{}", result)
                .map_err(|e| AppError::OutputFile(format!("stdout: {}", e)))?;
        }
        Ok(())
    }
}

fn read_input(input: &Path) -> Result<String, AppError> {
    if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| AppError::InputFile(format!("failed to read from stdin: {}", e)))?;
        Ok(buf)
    } else {
        fs::read_to_string(input)
            .map_err(|e| AppError::InputFile(format!("'{}': {}", input.display(), e)))
    }
}

/// List available citation styles.
fn styles_command() {
    for name in style_names() {
        let marker = if name.parse::<Style>().map(Style::is_numeric).unwrap_or(false) {
            "numeric"
        } else {
            "author-year"
        };
        println!("{:<10} {}", name, marker);
    }
}
