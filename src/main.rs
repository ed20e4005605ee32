//! caravan - recursive copy, move, trash and undo from the command line.
//!
//! Usage:
//!   caravan copy SRC... DEST      Copy entries into a directory
//!   caravan move SRC... DEST      Move entries into a directory
//!   caravan trash PATH...         Move entries to the trash
//!   caravan restore TRASH_REF...  Put trashed entries back
//!   caravan plan move SRC... DEST Show the steps without running them
//!   caravan --help                Show help

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use caravan_core::{ConflictPolicy, EngineConfig, FileRef};
use caravan_ops::{
    Conflict, ConflictDecision, Engine, FailurePolicy, FileOperation, OperationEvent,
    OperationOptions, OperationQueue, OperationResult, ProgressUpdate, StepOutcome, UndoAction,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "caravan",
    version,
    about = "Recursive copy, move, trash and restore with conflict handling",
    long_about = "caravan plans every operation before touching the disk, settles \
                  name conflicts up front and reports the outcome of every entry."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Stage trashed entries in this directory instead of the system trash
    #[arg(long, global = true)]
    trash_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy entries into a directory
    Copy(TransferArgs),

    /// Move entries into a directory
    Move(TransferArgs),

    /// Permanently delete entries
    Delete {
        #[arg(required = true)]
        targets: Vec<PathBuf>,

        #[command(flatten)]
        failure: FailureArgs,
    },

    /// Move entries to the trash
    Trash {
        #[arg(required = true)]
        targets: Vec<PathBuf>,

        #[command(flatten)]
        failure: FailureArgs,
    },

    /// Restore trashed entries to where they came from
    Restore {
        /// Trash references as printed by `trash` (trash:///...)
        #[arg(required = true)]
        trash_refs: Vec<String>,
    },

    /// Rename an entry in place
    Rename { source: PathBuf, new_name: String },

    /// Create symbolic links to entries inside a directory
    Link(TransferArgs),

    /// Create an empty directory
    Mkdir { path: PathBuf },

    /// Create an empty file
    Touch { path: PathBuf },

    /// Show the plan for a copy or move without running it
    Plan {
        mode: PlanMode,

        #[command(flatten)]
        transfer: TransferArgs,
    },
}

#[derive(Args)]
struct TransferArgs {
    /// Entries followed by the destination directory
    #[arg(required = true, num_args = 2..)]
    paths: Vec<PathBuf>,

    /// How to settle name conflicts
    #[arg(short, long)]
    conflict: Option<ConflictArg>,

    /// Rename colliding directories instead of merging them
    #[arg(long)]
    strict: bool,

    #[command(flatten)]
    failure: FailureArgs,
}

#[derive(Args)]
struct FailureArgs {
    /// Carry on after a failed entry
    #[arg(short = 'k', long, conflicts_with = "abort")]
    keep_going: bool,

    /// Stop at the first failed entry
    #[arg(long)]
    abort: bool,
}

impl FailureArgs {
    fn policy(&self) -> Option<FailurePolicy> {
        if self.keep_going {
            Some(FailurePolicy::Continue)
        } else if self.abort {
            Some(FailurePolicy::Abort)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictArg {
    Ask,
    Skip,
    Overwrite,
    Rename,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Ask => Self::Ask,
            ConflictArg::Skip => Self::Skip,
            ConflictArg::Overwrite => Self::Overwrite,
            ConflictArg::Rename => Self::Rename,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlanMode {
    Copy,
    Move,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).context("Invalid configuration")?,
        None => EngineConfig::load_or_default().context("Invalid configuration")?,
    };
    if let Some(dir) = &cli.trash_dir {
        config.trash_dir = Some(absolute(dir)?);
    }
    tracing::debug!(?config, "configuration loaded");
    let engine = Arc::new(Engine::local(config));

    if let Command::Plan { mode, transfer } = &cli.command {
        return show_plan(&engine, *mode, transfer, cli.json);
    }

    let (operation, options) = build(cli.command)?;
    let queue = OperationQueue::new(Arc::clone(&engine));
    let result = run(&queue, operation, options, cli.json).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if let Err(e) = subscriber.try_init() {
        eprintln!("Failed to init logging: {e}");
    }
}

/// Turn a subcommand into an operation and its options.
fn build(command: Command) -> Result<(FileOperation, OperationOptions)> {
    let mut options = OperationOptions::new();
    let operation = match command {
        Command::Copy(args) => {
            let (sources, destination) = split_transfer(&args)?;
            options = transfer_options(&args);
            FileOperation::copy(sources, destination)
        }
        Command::Move(args) => {
            let (sources, destination) = split_transfer(&args)?;
            options = transfer_options(&args);
            FileOperation::move_to(sources, destination)
        }
        Command::Link(args) => {
            let (sources, destination) = split_transfer(&args)?;
            options = transfer_options(&args);
            FileOperation::link(sources, destination)
        }
        Command::Delete { targets, failure } => {
            if let Some(policy) = failure.policy() {
                options = options.with_failure_policy(policy);
            }
            FileOperation::delete(locations(&targets)?)
        }
        Command::Trash { targets, failure } => {
            if let Some(policy) = failure.policy() {
                options = options.with_failure_policy(policy);
            }
            FileOperation::trash(locations(&targets)?)
        }
        Command::Restore { trash_refs } => {
            FileOperation::restore(trash_refs.iter().map(|r| FileRef::parse(r)).collect())
        }
        Command::Rename { source, new_name } => {
            FileOperation::rename(location(&source)?, new_name)
        }
        Command::Mkdir { path } => FileOperation::create_directory(location(&path)?),
        Command::Touch { path } => FileOperation::create_file(location(&path)?),
        Command::Plan { .. } => bail!("Plans are shown, not run"),
    };
    Ok((operation, options))
}

fn transfer_options(args: &TransferArgs) -> OperationOptions {
    let mut options = OperationOptions::new().with_handler(PromptHandler);
    if let Some(conflict) = args.conflict {
        options = options.with_policy(conflict.into());
    }
    if args.strict {
        options = options.strict();
    }
    if let Some(policy) = args.failure.policy() {
        options = options.with_failure_policy(policy);
    }
    options
}

fn split_transfer(args: &TransferArgs) -> Result<(Vec<FileRef>, FileRef)> {
    let Some((destination, sources)) = args.paths.split_last() else {
        bail!("Need at least one source and a destination");
    };
    Ok((locations(sources)?, location(destination)?))
}

fn locations(paths: &[PathBuf]) -> Result<Vec<FileRef>> {
    paths.iter().map(|p| location(p)).collect()
}

fn location(path: &Path) -> Result<FileRef> {
    Ok(FileRef::local(absolute(path)?))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

/// Submit `operation` and follow it to the end, drawing progress on stderr.
async fn run(
    queue: &OperationQueue,
    operation: FileOperation,
    options: OperationOptions,
    quiet: bool,
) -> Result<OperationResult> {
    let mut handle = queue.submit(operation, options);
    let cancel = handle.cancel_token().clone();
    let mut result = None;

    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(OperationEvent::Progress(update)) if !quiet => draw_progress(&update),
                Some(OperationEvent::Progress(_)) => {}
                Some(OperationEvent::Complete(done)) => result = Some(done),
                Some(OperationEvent::Failed(e)) => return Err(e).context("Operation rejected"),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                eprintln!("\nCancelling after the current entry...");
                cancel.request_cancel();
            }
        }
    }

    match result {
        Some(result) => Ok(result),
        None => bail!("Operation queue stopped unexpectedly"),
    }
}

fn draw_progress(update: &ProgressUpdate) {
    let item = update
        .current_item
        .as_ref()
        .map(|r| r.name_lossy())
        .unwrap_or_default();
    eprint!(
        "\r{:>5.1}%  {}/{}  {}  {:<40}",
        update.percentage(),
        format_size(update.bytes_done),
        format_size(update.bytes_total),
        update.operation,
        truncate(&item, 40)
    );
    if update.finished {
        eprintln!();
    }
}

fn print_result(result: &OperationResult) {
    println!("{}", result.summary());
    for entry in result.failed.iter().chain(&result.partial) {
        println!("  {} ({}): {}", entry.location, entry.kind, entry.message);
    }
    for entry in &result.warnings {
        println!("  warning: {}: {}", entry.location, entry.message);
    }
    let not_attempted = result
        .outcomes
        .iter()
        .filter(|o| **o == StepOutcome::NotAttempted)
        .count();
    if not_attempted > 0 {
        println!("  {not_attempted} steps not attempted");
    }
    // Trash references are what `restore` needs later.
    let trashed = result.undo_record().into_iter().flat_map(|r| &r.actions);
    for action in trashed {
        if let UndoAction::Trashed { original, trash } = action {
            println!("  {original} -> {trash}");
        }
    }
}

fn show_plan(engine: &Engine, mode: PlanMode, args: &TransferArgs, json: bool) -> Result<()> {
    let (sources, destination) = split_transfer(args)?;
    let operation = match mode {
        PlanMode::Copy => FileOperation::copy(sources, destination),
        PlanMode::Move => FileOperation::move_to(sources, destination),
    };
    let mut options = transfer_options(args);
    let plan = engine.plan(&operation, &mut options).context("Planning failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", "─".repeat(70));
    println!(
        " {} plan: {} steps, {}",
        plan.operation,
        plan.len(),
        format_size(plan.total_bytes)
    );
    println!("{}", "─".repeat(70));
    for step in &plan.steps {
        match &step.source {
            Some(source) => println!(" {:<14} {} -> {}", step.kind, source, step.destination),
            None => println!(" {:<14} {}", step.kind, step.destination),
        }
    }
    for skipped in &plan.skipped {
        println!(" {:<14} {}", "Skip", skipped);
    }
    Ok(())
}

/// Asks on the terminal how to settle each conflict.
struct PromptHandler;

impl caravan_ops::ConflictHandler for PromptHandler {
    fn decide(&mut self, conflict: &Conflict, suggested_name: Option<&str>) -> ConflictDecision {
        let suggestion = suggested_name.unwrap_or_default();
        let stdin = std::io::stdin();
        loop {
            eprint!(
                "{} already exists ({} over {}).\n\
                 [s]kip, skip [a]ll, [o]verwrite, overwrite a[l]l, [r]ename to '{}', [c]ancel: ",
                conflict.destination, conflict.source_kind, conflict.existing_kind, suggestion
            );
            let _ = std::io::stderr().flush();

            let mut answer = String::new();
            match stdin.lock().read_line(&mut answer) {
                Ok(0) | Err(_) => return ConflictDecision::Cancel,
                Ok(_) => {}
            }
            match answer.trim() {
                "s" => return ConflictDecision::Skip,
                "a" => return ConflictDecision::SkipAll,
                "o" => return ConflictDecision::Overwrite,
                "l" => return ConflictDecision::OverwriteAll,
                "r" if !suggestion.is_empty() => {
                    return ConflictDecision::Rename(suggestion.to_string());
                }
                "c" => return ConflictDecision::Cancel,
                _ => eprintln!("Please answer s, a, o, l, r or c."),
            }
        }
    }
}

/// Format a byte size for display.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
