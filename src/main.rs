//! lsync - directory synchronization between local and remote hosts.
//!
//! Usage:
//!   lsync [OPTIONS] SOURCE DESTINATION   Sync SOURCE into DESTINATION
//!   lsync log DESTINATION                Show past sync records
//!   lsync unlock DESTINATION             Remove a stale lease
//!   lsync --help                         Show help

mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lsync_core::{Destination, SyncConfig, SyncError};
use lsync_ops::{Journal, Lease, SessionOutcome, SyncSession, Transport, connect};
use lsync_report::{Summarize, render_plan, render_record};

use settings::{Settings, Target};

const EXIT_FAILURES: u8 = 1;
const EXIT_ABORTED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "lsync",
    version,
    about = "Sync directories between local and remote hosts",
    long_about = "lsync copies a local directory tree to a local or remote destination,\n\
                  honoring per-directory .lsyncignore and .gitignore files.\n\n\
                  DESTINATION is a path, `host:path`, or `@server` from lsync.toml.",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(flatten)]
    sync: SyncArgs,

    /// Raise diagnostic log level (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args)]
struct SyncArgs {
    /// Local directory to sync from
    #[arg(required = true)]
    source: Option<String>,

    /// Path, host:path or @server to sync to
    #[arg(required = true)]
    destination: Option<String>,

    /// Plan and report only; nothing is written
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Delete destination entries absent from source
    #[arg(short, long)]
    delete: bool,

    /// Extra root-scoped ignore file (repeatable, must exist)
    #[arg(short, long = "ignore-file", value_name = "PATH")]
    ignore_file: Vec<PathBuf>,

    /// Compare content fingerprints instead of size and mtime
    #[arg(short, long)]
    checksum: bool,

    /// Include version-control metadata directories (.git, .hg, .svn)
    #[arg(short, long)]
    git: bool,

    /// Do not honor per-directory .gitignore files
    #[arg(long)]
    no_gitignore: bool,

    /// Modification time tolerance in seconds (default 0 local, 1 remote)
    #[arg(long, value_name = "SECS")]
    modify_window: Option<u64>,

    /// Per-action retry bound
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Per remote-operation timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Summary output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Show past sync records of a destination
    Log {
        /// Path, host:path or @server
        destination: String,

        /// Number of records to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Remove a stale lease left by an interrupted run
    Unlock {
        /// Path, host:path or @server
        destination: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("lsync: {err}");
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Some(Command::Log {
            destination,
            count,
            format,
        }) => run_log(&destination, count, format).await,
        Some(Command::Unlock { destination }) => run_unlock(&destination).await,
        None => run_sync(cli.sync).await,
    };

    match result {
        Ok(code) => code,
        Err(report) => {
            eprintln!("Error: {report:?}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let layer = fmt::layer().compact().with_target(false).with_writer(std::io::stderr);
    tracing_subscriber::registry().with(layer).with(filter).init();
}

/// Cancel `token` on the first Ctrl-C; exit on the second.
fn install_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Interrupted, finishing the current action (Ctrl-C again to abort)");
        token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });
}

async fn run_sync(args: SyncArgs) -> Result<ExitCode> {
    let (Some(source), Some(destination)) = (args.source.as_deref(), args.destination.as_deref())
    else {
        return Err(eyre!("SOURCE and DESTINATION are required"));
    };

    if Destination::parse(source)?.is_remote() {
        return Err(SyncError::config(format!(
            "remote source '{source}' is not supported; run lsync on that host instead"
        )))
        .wrap_err("Invalid source");
    }
    let source = resolve_source(Path::new(source));

    let dir = settings::settings_dir();
    let settings = Settings::load(&dir).wrap_err("Failed to load settings")?;
    let targets = settings.resolve(destination, &source)?;

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    if args.delete && !args.dry_run {
        eprintln!("Delete is enabled: destination entries absent from the source will be removed");
    }

    let mut code = 0u8;
    for target in targets {
        let label = target.destination.to_string();
        let config = build_config(&args, &settings, &dir, &source, target)
            .wrap_err_with(|| format!("Invalid configuration for {label}"))?;

        let session = SyncSession::new(config).with_cancellation(cancel.clone());
        if matches!(args.format, OutputFormat::Text) {
            print_last_sync(session.transport()).await;
        }

        let outcome = match session.run().await {
            Ok(outcome) => outcome,
            Err(SyncError::Interrupted) => {
                eprintln!("{label}: interrupted before any action");
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            Err(err) => {
                eprintln!("lsync: {label}: {err}");
                code = code.max(EXIT_ABORTED);
                continue;
            }
        };

        print_outcome(&label, &outcome, args.format)?;

        if let Some(report) = outcome.report() {
            if report.interrupted {
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            if !report.is_success() {
                code = code.max(EXIT_FAILURES);
            }
        }
    }

    Ok(ExitCode::from(code))
}

/// Canonical source path when it exists, so `.` gets a directory name.
fn resolve_source(source: &Path) -> PathBuf {
    std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf())
}

fn build_config(
    args: &SyncArgs,
    settings: &Settings,
    dir: &Path,
    source: &Path,
    target: Target,
) -> Result<SyncConfig> {
    let modify_window = args
        .modify_window
        .unwrap_or(if target.destination.is_remote() { 1 } else { 0 });

    let mut ignore_filenames = vec![lsync_core::LSYNC_IGNORE_FILE.to_string()];
    if !args.no_gitignore {
        ignore_filenames.push(".gitignore".to_string());
    }

    let config = SyncConfig::builder()
        .source(source)
        .destination(target.destination)
        .dry_run(args.dry_run)
        .delete(args.delete)
        .ignore_files(args.ignore_file.clone())
        .global_ignore(Some(settings::global_ignore(dir)))
        .ignore_filenames(ignore_filenames)
        .checksum(args.checksum)
        .include_vcs(args.git)
        .modify_window(Duration::from_secs(modify_window))
        .max_retries(args.retries.unwrap_or(settings.defaults.retries))
        .remote_timeout(Duration::from_secs(
            args.timeout.unwrap_or(settings.defaults.timeout_secs),
        ))
        .ssh_args(target.ssh_args)
        .build()?;

    debug!(?config, "resolved configuration");
    Ok(config)
}

async fn print_last_sync(transport: Arc<dyn Transport>) {
    match Journal::new(transport).last().await {
        Ok(Some(record)) => {
            println!("Last Sync: {}", render_record(&record));
        }
        Ok(None) => {}
        Err(err) => debug!("no previous sync record: {err}"),
    }
}

fn print_outcome(label: &str, outcome: &SessionOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {label}");
            println!("{}", "─".repeat(60));
            match outcome {
                SessionOutcome::Planned(plan) => {
                    print!("{}", render_plan(plan));
                    print!("{}", plan.summarize());
                }
                SessionOutcome::Executed { report, .. } => print!("{}", report.summarize()),
            }
        }
        OutputFormat::Json => {
            let value = match outcome {
                SessionOutcome::Planned(plan) => json!({
                    "destination": label,
                    "summary": plan.summarize(),
                    "actions": plan.actions(),
                }),
                SessionOutcome::Executed { report, .. } => json!({
                    "destination": label,
                    "summary": report.summarize(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

/// Targets for `log` and `unlock`; `@server` uses the working directory name.
fn admin_targets(destination: &str) -> Result<Vec<(String, Arc<dyn Transport>)>> {
    let dir = settings::settings_dir();
    let settings = Settings::load(&dir).wrap_err("Failed to load settings")?;
    let cwd = std::env::current_dir().wrap_err("Cannot read working directory")?;
    let timeout = Duration::from_secs(settings.defaults.timeout_secs);

    Ok(settings
        .resolve(destination, &cwd)?
        .into_iter()
        .map(|target| {
            let transport = connect(&target.destination, &target.ssh_args, timeout);
            (target.destination.to_string(), transport)
        })
        .collect())
}

async fn run_log(destination: &str, count: usize, format: OutputFormat) -> Result<ExitCode> {
    let mut code = 0u8;
    for (label, transport) in admin_targets(destination)? {
        let records = match Journal::new(transport).read(count).await {
            Ok(records) => records,
            Err(err) => {
                eprintln!("lsync: {label}: {err}");
                code = EXIT_ABORTED;
                continue;
            }
        };

        match format {
            OutputFormat::Text => {
                println!("{label}:");
                if records.is_empty() {
                    println!("  no sync records");
                }
                for record in &records {
                    println!("  {}", render_record(record));
                }
            }
            OutputFormat::Json => {
                let value = json!({ "destination": label, "records": records });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
    }
    Ok(ExitCode::from(code))
}

async fn run_unlock(destination: &str) -> Result<ExitCode> {
    let mut code = 0u8;
    for (label, transport) in admin_targets(destination)? {
        match Lease::break_lease(transport.as_ref()).await {
            Ok(Some(holder)) => println!("{label}: removed lease held by {holder}"),
            Ok(None) => println!("{label}: no lease to remove"),
            Err(err) => {
                warn!("cannot unlock {label}: {err}");
                eprintln!("lsync: {label}: {err}");
                code = EXIT_ABORTED;
            }
        }
    }
    Ok(ExitCode::from(code))
}
