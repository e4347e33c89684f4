use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use logcrawl::data::{LineNumber, LinesCount};
use logcrawl::index::{ByteSource, Encoding, FileStats, LocalFile, LogReader, MappedFile};
use logcrawl::output;
use logcrawl::search::{FilterSet, PatternSyntax, SearchLimits, SearchPattern, SearchResult};
use logcrawl::utils::AppConfig;
use logcrawl::utils::progress::{ProgressBar, ProgressStyle};
use logcrawl::worker::{IndexEvent, IndexStatus};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "LOGCRAWL_LOG";

#[derive(Parser)]
#[command(name = "logcrawl")]
#[command(about = "Index, search and follow huge log files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read through a memory map instead of a file handle
    #[arg(long, global = true)]
    mmap: bool,

    /// Force an encoding instead of detecting it (utf-8, utf-16le, utf-16be, latin1)
    #[arg(long, global = true)]
    encoding: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a file and report how long it took
    Index {
        file: PathBuf,
    },
    /// Show index statistics
    Stats {
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print lines matching a pattern
    Search {
        file: PathBuf,
        pattern: String,

        /// Case-insensitive match
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat the pattern as a literal string
        #[arg(short = 'F', long)]
        fixed_strings: bool,

        /// Stop after this many matches
        #[arg(short = 'm', long)]
        max_count: Option<usize>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Prefix lines with their line number
        #[arg(short = 'n', long)]
        line_number: bool,

        /// Only print the number of matches
        #[arg(short = 'c', long)]
        count: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
    /// Print lines coloured by a filter set
    Filter {
        file: PathBuf,

        /// Filter set as JSON: {"filters": [{"pattern": ..., "fore_colour": "#RRGGBB", ...}]}
        filters: PathBuf,

        /// First line to print (one-based)
        #[arg(long, default_value_t = 1)]
        first: u32,

        /// Number of lines to print
        #[arg(long)]
        count: Option<u32>,

        /// Prefix lines with their line number
        #[arg(short = 'n', long)]
        line_number: bool,
    },
    /// Print lines as they are appended, optionally only matching ones
    Follow {
        file: PathBuf,
        pattern: Option<String>,

        /// Case-insensitive match
        #[arg(short = 'i', long)]
        ignore_case: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::load()?;
    let forced = cli
        .encoding
        .as_deref()
        .map(|name| Encoding::from_name(name).with_context(|| format!("Unknown encoding: {name}")))
        .transpose()?;

    match cli.command {
        Commands::Index { file } => {
            let reader = open(&file, cli.mmap, &config, forced)?;
            let started = Instant::now();
            index_with_progress(&reader)?;
            println!(
                "Indexed {} lines of {} in {:.2?}",
                reader.line_count(),
                file.display(),
                started.elapsed()
            );
        }
        Commands::Stats { file, json } => {
            let reader = open(&file, cli.mmap, &config, forced)?;
            let started = Instant::now();
            index_with_progress(&reader)?;
            let stats = FileStats::collect(&file, &reader.snapshot(), Some(started.elapsed()));
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{stats}");
            }
        }
        Commands::Search {
            file,
            pattern,
            ignore_case,
            fixed_strings,
            max_count,
            timeout_ms,
            line_number,
            count,
            no_color,
        } => {
            let reader = open(&file, cli.mmap, &config, forced)?;
            index_with_progress(&reader)?;

            let syntax = if fixed_strings {
                PatternSyntax::FixedString
            } else {
                PatternSyntax::Regex
            };
            let pattern = SearchPattern::with_syntax(&pattern, syntax, !ignore_case)?;
            let limits = SearchLimits {
                max_matches: max_count,
                deadline: timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms)),
            };
            let result = reader.search(pattern.clone(), limits).wait()?;

            let mut out = output::stdout(!no_color);
            if count {
                output::print_summary(&mut out, result.len(), result.lines_searched().get(), result.is_complete())?;
            } else {
                print_matches(&reader, &result, &pattern, line_number, &mut out)?;
            }
            if !result.is_complete() {
                tracing::warn!(status = ?result.status(), "search stopped early");
            }
        }
        Commands::Filter {
            file,
            filters,
            first,
            count,
            line_number,
        } => {
            let json = fs::read_to_string(&filters)
                .with_context(|| format!("Failed to read filter set {}", filters.display()))?;
            let filters = FilterSet::from_json(&json).context("Failed to parse filter set")?;

            let reader = open(&file, cli.mmap, &config, forced)?;
            index_with_progress(&reader)?;

            let first = LineNumber::new(first.saturating_sub(1));
            let total = reader.line_count();
            let count = count.unwrap_or(total.get().saturating_sub(first.get()));
            print_filtered(&reader, &filters, first, LinesCount::new(count), line_number, config.search_chunk_lines)?;
        }
        Commands::Follow {
            file,
            pattern,
            ignore_case,
        } => {
            let pattern = pattern
                .map(|p| SearchPattern::new(&p, !ignore_case))
                .transpose()?;
            let reader = open(&file, cli.mmap, &config, forced)?;
            follow(&reader, pattern)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open(path: &Path, mmap: bool, config: &AppConfig, forced: Option<Encoding>) -> Result<LogReader> {
    let source: Arc<dyn ByteSource> = if mmap {
        Arc::new(MappedFile::open(path)?)
    } else {
        Arc::new(LocalFile::open(path)?)
    };
    let reader = LogReader::new(source, config);
    reader.set_forced_encoding(forced);
    Ok(reader)
}

/// Run a full index, drawing a progress bar on stderr
fn index_with_progress(reader: &LogReader) -> Result<()> {
    let events = reader.subscribe();
    reader.start_indexing();

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")?
            .progress_chars("█▓▒░  "),
    );
    pb.set_message("Indexing...");

    for event in events.iter() {
        match event {
            IndexEvent::Progress(percent) => pb.set_position(u64::from(percent)),
            IndexEvent::Finished(status) => {
                pb.finish_and_clear();
                return match status {
                    IndexStatus::Completed { .. } => Ok(()),
                    IndexStatus::Cancelled => bail!("Indexing was cancelled"),
                    IndexStatus::Failed(e) => Err(anyhow::anyhow!("Indexing failed: {e}")),
                };
            }
        }
    }
    pb.finish_and_clear();
    Ok(())
}

fn print_matches(
    reader: &LogReader,
    result: &SearchResult,
    pattern: &SearchPattern,
    line_numbers: bool,
    out: &mut termcolor::StandardStream,
) -> Result<()> {
    for &line in result.matches() {
        let text = reader.line(line)?.unwrap_or_default();
        output::print_match_line(out, line, &text, pattern, line_numbers)?;
    }
    Ok(())
}

fn print_filtered(
    reader: &LogReader,
    filters: &FilterSet,
    first: LineNumber,
    count: LinesCount,
    line_numbers: bool,
    page_lines: usize,
) -> Result<()> {
    let mut out = output::stdout(true);
    let page = LinesCount::from_len(page_lines.max(1));
    let end = first + count;
    let mut at = first;

    while at < end {
        let take = page.min(LinesCount::new(end.get() - at.get()));
        let colours = reader.colourise(filters, at, take)?;
        let lines = reader.lines(at, take)?;
        if lines.is_empty() {
            break;
        }
        for (i, (text, colour)) in lines.iter().zip(colours).enumerate() {
            output::print_filtered_line(&mut out, at + LinesCount::from_len(i), text, colour, line_numbers)?;
        }
        at += take;
    }
    out.flush()?;
    Ok(())
}

/// Print complete lines as they arrive until interrupted
fn follow(reader: &LogReader, pattern: Option<SearchPattern>) -> Result<()> {
    let events = reader.subscribe();
    let _follow = reader.follow();
    let mut out = output::stdout(true);

    let mut printed = LineNumber::new(0);
    let mut lineage = None;
    let mut previous: Option<SearchResult> = None;

    for event in events.iter() {
        let IndexEvent::Finished(status) = event else {
            continue;
        };
        match status {
            IndexStatus::Completed { .. } => {}
            IndexStatus::Cancelled => continue,
            IndexStatus::Failed(e) => {
                tracing::warn!(error = %e, "indexing failed while following");
                continue;
            }
        }

        let snapshot = reader.snapshot();
        if lineage.is_some_and(|l| l != snapshot.lineage()) {
            writeln!(out, "--- {} was truncated or replaced ---", reader.source().path().display())?;
            printed = LineNumber::new(0);
            previous = None;
        }
        lineage = Some(snapshot.lineage());

        // A last line without its terminator may still grow
        let complete = if snapshot.is_last_line_terminated() {
            snapshot.line_count()
        } else {
            snapshot.line_count() - LinesCount::new(1)
        };
        let complete_end = complete.end_line();
        if complete_end <= printed {
            continue;
        }

        match &pattern {
            None => {
                let lines = reader.lines(printed, LinesCount::new(complete_end.get() - printed.get()))?;
                for line in lines {
                    writeln!(out, "{line}")?;
                }
            }
            Some(pattern) => {
                let task = match previous.take() {
                    Some(previous) => reader.refresh_search(previous, SearchLimits::none()),
                    None => reader.search(pattern.clone(), SearchLimits::none()),
                };
                let result = task.wait()?;
                for &line in result.matches() {
                    if line >= printed && line < complete_end {
                        let text = reader.line(line)?.unwrap_or_default();
                        output::print_match_line(&mut out, line, &text, pattern, true)?;
                    }
                }
                previous = Some(result);
            }
        }
        out.flush()?;
        printed = complete_end;
    }
    Ok(())
}
