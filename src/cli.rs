//! CLI parsing and orchestration. Parses args, runs one source pipeline or all of them, maps
//! errors to exit codes.

use crate::config::{self, Config, ConfigError, Source};
use crate::driver::{self, Driver};
use crate::pipeline::{collect_chapters, run_source, PipelineError};
use crate::scraper::{FeedClient, ScraperError};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {total} source(s) failed")]
    SourcesFailed { failed: usize, total: usize },
}

impl CliRunError {
    /// Every failure exits 1; the multi-source runner only distinguishes zero from non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_)
            | CliRunError::Config(_)
            | CliRunError::Pipeline(_)
            | CliRunError::OutputDir { .. }
            | CliRunError::SourcesFailed { .. } => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mangarss")]
#[command(about = "Scrape manga chapter lists and write RSS 2.0 feeds")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, timeout_secs, source_timeout_secs, [[sources]]) are documented in the README. CLI flags override config."
)]
pub struct Args {
    /// Config file (default: ./mangarss.toml, then the user config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory feeds are written to (overrides config; default ./output).
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Page fetch timeout in seconds (overrides config; default 10).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Suppress progress output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug logging and full error chain.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape one source and write its feed.
    Run {
        /// Source name from the config. Default: the first configured source.
        source: Option<String>,

        /// Output file (overrides <output_dir>/<source>.xml).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch and extract only; print the chapters as JSON instead of writing the feed.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run every configured source as a separate process and summarize.
    All,
    /// List configured sources.
    List,
}

impl Args {
    /// Log filter implied by --quiet / --verbose. RUST_LOG still wins.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Global flags to hand to child processes in `all`.
    fn forwarded_args(&self) -> Vec<std::ffi::OsString> {
        let mut out: Vec<std::ffi::OsString> = Vec::new();
        if let Some(ref c) = self.config {
            out.push("--config".into());
            out.push(c.clone().into_os_string());
        }
        if let Some(ref d) = self.output_dir {
            out.push("--output-dir".into());
            out.push(d.clone().into_os_string());
        }
        if let Some(t) = self.timeout {
            out.push("--timeout".into());
            out.push(t.to_string().into());
        }
        if let Some(ref ua) = self.user_agent {
            out.push("--user-agent".into());
            out.push(ua.into());
        }
        if self.quiet {
            out.push("--quiet".into());
        }
        if self.verbose {
            out.push("--verbose".into());
        }
        out
    }
}

/// Config with CLI overrides applied.
fn effective_config(args: &Args) -> Result<Config, CliRunError> {
    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(ref d) = args.output_dir {
        config.output_dir = Some(d.clone());
    }
    if let Some(t) = args.timeout {
        config.timeout_secs = Some(t);
    }
    if let Some(ref ua) = args.user_agent {
        config.user_agent = Some(ua.clone());
    }
    Ok(config)
}

fn build_client(config: &Config) -> Result<FeedClient, CliRunError> {
    FeedClient::builder()
        .user_agent(config.user_agent())
        .timeout_secs(config.timeout_secs())
        .build()
        .map_err(|e: ScraperError| CliRunError::InvalidInput(e.to_string()))
}

fn ensure_output_dir(source: &Source) -> Result<(), CliRunError> {
    if let Some(parent) = source.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CliRunError::OutputDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn run_one(
    config: &Config,
    name: Option<&str>,
    output: Option<&PathBuf>,
    dry_run: bool,
) -> Result<(), CliRunError> {
    let mut source = config.source(name)?;
    if let Some(path) = output {
        source.output_path = path.clone();
    }
    let client = build_client(config)?;

    if dry_run {
        let extraction = collect_chapters(&source, &client)?;
        let json = serde_json::to_string_pretty(&extraction.chapters)
            .map_err(|e| CliRunError::InvalidInput(format!("Failed to write JSON: {}", e)))?;
        println!("{}", json);
        eprintln!("Output (not written): {}", source.output_path.display());
        return Ok(());
    }

    ensure_output_dir(&source)?;
    run_source(&source, &client)?;
    Ok(())
}

fn run_all(args: &Args, config: &Config) -> Result<(), CliRunError> {
    let sources = config.resolve_sources()?;
    let exe = std::env::current_exe().map_err(|e| {
        CliRunError::InvalidInput(format!("Cannot locate the mangarss executable: {}", e))
    })?;
    let runner = args.forwarded_args().into_iter().fold(
        Driver::new(exe, Duration::from_secs(config.source_timeout_secs())),
        |d, arg| d.arg(arg),
    );

    println!("Found {} source(s):", sources.len());
    for s in &sources {
        println!("  - {}", s.name);
    }

    let mut runs = Vec::with_capacity(sources.len());
    for s in &sources {
        println!("{}", driver::format_header(&s.name));
        let run = runner.run_source(&s.name);
        print!("{}", run.stdout);
        eprint!("{}", run.stderr);
        println!("{}", driver::format_status(&run));
        runs.push(run);
    }

    let feeds = driver::list_feeds(&config.output_dir()).unwrap_or_else(|e| {
        log::warn!(
            "Cannot list feeds in {}: {}",
            config.output_dir().display(),
            e
        );
        Vec::new()
    });
    print!("{}", driver::format_summary(&runs, &feeds));

    let failed = runs.iter().filter(|r| !r.outcome.is_success()).count();
    if failed > 0 {
        return Err(CliRunError::SourcesFailed {
            failed,
            total: runs.len(),
        });
    }
    Ok(())
}

fn list_sources(config: &Config) -> Result<(), CliRunError> {
    for s in config.resolve_sources()? {
        println!("{}\t{}\t{}", s.name, s.url, s.output_path.display());
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = effective_config(args)?;
    match &args.command {
        Command::Run {
            source,
            output,
            dry_run,
        } => run_one(&config, source.as_deref(), output.as_ref(), *dry_run),
        Command::All => run_all(args, &config),
        Command::List => list_sources(&config),
    }
}
