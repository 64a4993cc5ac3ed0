use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use xwordsync::{DataKind, SyncOptions, SyncReport, Variant};

#[derive(Parser)]
#[command(name = "xwordsync", about = "Retrieves crossword puzzles and solve stats")]
struct Cli {
    /// Where data is read from and stored
    data_dir: PathBuf,

    /// Path to the API config file
    #[arg(short, long, default_value = "api-config.yaml")]
    config: PathBuf,

    /// Path to a JSON file holding the session cookie
    #[arg(short = 'n', long, default_value = "cookie.json")]
    cookie: PathBuf,

    /// Start date (YYYY-MM-DD). Data before this date is ignored.
    #[arg(short, long, default_value = "2020-01-01", value_parser = parse_begin)]
    begin: NaiveDate,

    /// Retrieve daily puzzle data
    #[arg(short, long, overrides_with = "no_daily")]
    daily: bool,
    #[arg(long, overrides_with = "daily", hide = true)]
    no_daily: bool,

    /// Retrieve mini puzzle data
    #[arg(short, long, overrides_with = "no_mini")]
    mini: bool,
    #[arg(long, overrides_with = "mini", hide = true)]
    no_mini: bool,

    /// Retrieve puzzle bodies
    #[arg(short, long, overrides_with = "no_puzzle")]
    puzzle: bool,
    #[arg(long, overrides_with = "puzzle", hide = true)]
    no_puzzle: bool,

    /// Retrieve the summary stats ledger
    #[arg(short, long, overrides_with = "no_stats")]
    stats: bool,
    #[arg(long, overrides_with = "stats", hide = true)]
    no_stats: bool,

    /// Retrieve full stats JSON
    #[arg(short, long, overrides_with = "no_full_stats")]
    full_stats: bool,
    #[arg(long, overrides_with = "full_stats", hide = true)]
    no_full_stats: bool,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl xwordsync::SyncProgress for StderrProgress {
    fn on_stage_start(&self, stage: &str, items: usize) {
        eprintln!("{stage}: {items} missing days");
    }

    fn on_chunk(&self, stage: &str, range: &xwordsync::DateRange, index: usize, total: usize) {
        eprint!(
            "\r  {stage}: window {}/{} ({} - {})   ",
            index + 1,
            total,
            range.start,
            range.end
        );
        if index + 1 == total {
            eprintln!();
        }
    }

    fn on_fetch_progress(&self, stage: &str, done: usize, total: usize) {
        if done == total {
            eprint!("\r  {stage}: fetched {done}/{total}   \n");
        } else {
            eprint!("\r  {stage}: fetched {done}/{total}   ");
        }
    }
}

/// Resolve a `--x` / `--no-x` pair; on by default, last flag wins.
fn toggle(on: bool, off: bool) -> bool {
    on || !off
}

fn parse_begin(s: &str) -> Result<NaiveDate, String> {
    xwordsync::date_util::parse_date(s).map_err(|e| e.to_string())
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Use `path` if it exists, otherwise a file of the same name next to the
/// executable.
fn locate_config(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }
    let name = path.file_name()?;
    let beside_exe = std::env::current_exe().ok()?.parent()?.join(name);
    beside_exe.exists().then_some(beside_exe)
}

fn fail(kind: ErrorKind, message: String) -> ! {
    Cli::command().error(kind, message).exit()
}

fn print_sync_report(report: &SyncReport) {
    println!("Sync: {}", report.stage);
    println!("  Status:  {:?}", report.status);
    println!("  Synced:  {} items", report.items_synced);
    println!("  Failed:  {} items", report.items_failed);
    if report.batches_total > 0 {
        println!(
            "  Batches: {}/{}",
            report.batches_completed, report.batches_total
        );
    }
    if let Some(ref err) = report.error {
        println!("  Error:   {err}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let variants: Vec<Variant> = [
        (Variant::Mini, toggle(cli.mini, cli.no_mini)),
        (Variant::Daily, toggle(cli.daily, cli.no_daily)),
    ]
    .into_iter()
    .filter(|(_, on)| *on)
    .map(|(v, _)| v)
    .collect();
    if variants.is_empty() {
        fail(
            ErrorKind::MissingRequiredArgument,
            "Need to specify at least one of daily | mini".into(),
        );
    }

    let stat_kinds: Vec<DataKind> = [
        (DataKind::Stats, toggle(cli.stats, cli.no_stats)),
        (DataKind::FullStats, toggle(cli.full_stats, cli.no_full_stats)),
    ]
    .into_iter()
    .filter(|(_, on)| *on)
    .map(|(k, _)| k)
    .collect();
    let puzzles = toggle(cli.puzzle, cli.no_puzzle);
    if !puzzles && stat_kinds.is_empty() {
        fail(
            ErrorKind::MissingRequiredArgument,
            "Need to specify at least one of full-stats | puzzle | stats".into(),
        );
    }

    let cookie = expand_home(&cli.cookie);
    if !cookie.exists() {
        fail(
            ErrorKind::InvalidValue,
            format!(
                "Can't find {}; export your session cookie to it first",
                cookie.display()
            ),
        );
    }
    let config = match locate_config(&expand_home(&cli.config)) {
        Some(path) => path,
        None => fail(
            ErrorKind::InvalidValue,
            format!("Can't locate {}", cli.config.display()),
        ),
    };

    let options = SyncOptions {
        begin: cli.begin,
        end: chrono::Local::now().date_naive(),
        variants,
        puzzles,
        stat_kinds,
    };

    let app = xwordsync::XwordSync::from_files(&config, &cookie).await?;
    let reports = app
        .sync(expand_home(&cli.data_dir), &options, &StderrProgress)
        .await?;
    for report in &reports {
        print_sync_report(report);
        println!();
    }
    Ok(())
}
