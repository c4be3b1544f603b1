//! panesize - two-pane directory sizes that converge without blocking.
//!
//! Usage:
//!   panesize [LEFT] [RIGHT]   Size both panes and print their rows
//!   panesize size PATH        One-shot recursive size of PATH
//!   panesize --help           Show help

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use panesize_core::{SortDirection, SortKey, ViewOptions};
use panesize_engine::{EpochPhase, Pane, PaneHandle, PaneView, Row, Settings, format_bytes};
use panesize_scan::{ScanCoordinator, SizeCache, dir_size};

#[derive(Parser)]
#[command(
    name = "panesize",
    version,
    about = "Two-pane directory browser core with incremental, cached directory sizes",
    long_about = "panesize lists one directory per pane, shows cached sizes at once and \
                  fills in the rest from background scans.\n\n\
                  Run `panesize [LEFT] [RIGHT]` to size two directories side by side, \
                  or `panesize size PATH` for a single recursive total."
)]
struct Cli {
    /// Left pane directory (defaults to current directory)
    #[arg(default_value = ".")]
    left: PathBuf,

    /// Right pane directory (defaults to the left one)
    right: Option<PathBuf>,

    #[command(flatten)]
    view: ViewArgs,

    /// Write the effective view options to the settings file
    #[arg(long)]
    save_settings: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Recursive size of a directory
    Size {
        /// Directory to size
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(Args, Clone, Default)]
struct ViewArgs {
    /// Include hidden entries
    #[arg(short = 'a', long)]
    hidden: bool,

    /// Glob pattern of names to skip (repeatable)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Sort column
    #[arg(short, long)]
    sort: Option<SortArg>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Mix directories and files when sorting
    #[arg(long)]
    no_dirs_first: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Name,
    Size,
    Modified,
    Extension,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortKey::Name,
            SortArg::Size => SortKey::Size,
            SortArg::Modified => SortKey::Modified,
            SortArg::Extension => SortKey::Extension,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl ViewArgs {
    /// Apply flags on top of saved defaults.
    fn apply(&self, mut options: ViewOptions) -> ViewOptions {
        if self.hidden {
            options.show_hidden = true;
        }
        if !self.ignore.is_empty() {
            options.ignore_patterns = self.ignore.clone();
        }
        if let Some(sort) = self.sort {
            options.sort.key = sort.into();
        }
        if self.desc {
            options.sort.direction = SortDirection::Descending;
        }
        if self.no_dirs_first {
            options.sort.directories_first = false;
        }
        options
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load();

    match cli.command {
        Some(Command::Size { path, view }) => {
            let options = view.apply(settings.view.clone());
            run_size(&path, options, &settings, view.format).await?;
        }
        None => {
            let options = cli.view.apply(settings.view.clone());
            if cli.save_settings {
                let updated = Settings {
                    view: options.clone(),
                    ..settings.clone()
                };
                updated.save().context("Failed to save settings")?;
            }
            let right = cli.right.clone().unwrap_or_else(|| cli.left.clone());
            run_panes(&cli.left, &right, options, &settings, cli.view.format).await?;
        }
    }

    Ok(())
}

/// Size two panes over one shared coordinator and print the settled rows.
async fn run_panes(
    left: &Path,
    right: &Path,
    options: ViewOptions,
    settings: &Settings,
    format: OutputFormat,
) -> Result<()> {
    let left = left
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", left.display()))?;
    let right = right
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", right.display()))?;

    tracing::debug!(left = %left.display(), right = %right.display(), "opening panes");

    let coordinator = ScanCoordinator::with_cache(settings.scan.clone(), SizeCache::new());
    let left_pane = Pane::new(coordinator.clone(), options.clone(), settings.engine.clone())
        .context("Invalid view options")?
        .spawn();
    let right_pane = Pane::new(coordinator.clone(), options.clone(), settings.engine.clone())
        .context("Invalid view options")?
        .spawn();

    left_pane.navigate(&left).await?;
    right_pane.navigate(&right).await?;

    let progress = tokio::spawn(report_progress(left_pane.view(), right_pane.view()));
    let (left_view, right_view) = tokio::try_join!(left_pane.wait_settled(), right_pane.wait_settled())?;
    progress.abort();
    eprint!("\r\x1b[2K");

    match format {
        OutputFormat::Text => {
            print_pane(&left_view, &options);
            if right != left {
                println!();
                print_pane(&right_view, &options);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&[&left_view, &right_view])?);
        }
    }

    shutdown(left_pane, right_pane).await;

    for view in [&left_view, &right_view] {
        if let Some(error) = &view.error {
            return Err(eyre!("{error}"));
        }
    }
    Ok(())
}

async fn shutdown(left: PaneHandle, right: PaneHandle) {
    left.shutdown().await;
    right.shutdown().await;
}

/// Keep one status line on stderr while either pane is scanning.
async fn report_progress(mut left: watch::Receiver<PaneView>, mut right: watch::Receiver<PaneView>) {
    loop {
        {
            let l = left.borrow_and_update();
            let r = right.borrow_and_update();
            if l.phase == EpochPhase::Scanning || r.phase == EpochPhase::Scanning {
                eprint!(
                    "\r\x1b[2Kscanning… {} | {}",
                    status(&l),
                    status(&r)
                );
            }
        }
        tokio::select! {
            changed = left.changed() => if changed.is_err() { break },
            changed = right.changed() => if changed.is_err() { break },
        }
    }
}

fn status(view: &PaneView) -> String {
    let pending = if view.scanning > 0 {
        format!(" ({} pending)", view.scanning)
    } else {
        String::new()
    };
    format!("{}{}", format_bytes(view.total_bytes), pending)
}

/// Print one pane's rows.
fn print_pane(view: &PaneView, options: &ViewOptions) {
    let path = view
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    println!("{}", "─".repeat(60));
    match &view.error {
        Some(error) => println!(" {path} - {error}"),
        None => {
            let items = view
                .item_count
                .map(|n| format!(", {n} files"))
                .unwrap_or_default();
            println!(
                " {} - {}{} [{}]",
                path,
                format_bytes(view.total_bytes),
                items,
                options.sort.short_label()
            );
        }
    }
    println!("{}", "─".repeat(60));

    for row in &view.rows {
        print_row(row);
    }
}

fn print_row(row: &Row) {
    if row.is_parent {
        println!("  {}", row.name);
        return;
    }
    let name = if row.is_dir {
        format!("{}/", row.name)
    } else {
        row.name.to_string()
    };
    println!(
        "  {:<40} {:>22}  {}",
        truncate(&name, 40),
        row.label,
        format_modified(row.modified)
    );
}

/// One-shot recursive size.
async fn run_size(path: &Path, options: ViewOptions, settings: &Settings, format: OutputFormat) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", path.display()))?;

    eprintln!("Sizing {}...", path.display());

    let config = settings.scan.clone();
    let target = path.clone();
    let totals = tokio::task::spawn_blocking(move || dir_size(&target, &options, &config))
        .await
        .context("Size task failed")?
        .context("Size failed")?;

    match format {
        OutputFormat::Text => {
            println!(
                "{}  {} ({} files)",
                format_bytes(totals.bytes),
                path.display(),
                totals.files
            );
            if !totals.warnings.is_empty() {
                println!("{} warning(s) during scan", totals.warnings.len());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }

    Ok(())
}

fn format_modified(modified: Option<SystemTime>) -> String {
    modified
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
