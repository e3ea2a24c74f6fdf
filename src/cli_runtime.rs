use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::LevelFilter;

use btrborg::backup::{RunOptions, run_backup};
use btrborg::exec::SystemRunner;
use btrborg::model::{BackupConfig, RunReport};
use btrborg::stamp::now_local;

#[derive(Parser)]
#[command(name = "btrborg")]
#[command(about = "Backup with btrfs snapshots and borg repositories", long_about = None)]
pub(crate) struct Cli {
    /// YAML (or .json) config file
    config: PathBuf,

    /// Skip btrfs, borg and mount commands that change anything; still query them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Do not make a new snapshot, only prune and run borg
    #[arg(short = 's', long)]
    skip_snapshot: bool,

    /// Only log errors; output of btrfs and borg is still shown
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

pub(crate) fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.quiet);

    let cfg = BackupConfig::load(&cli.config)?;
    let opts = RunOptions {
        dry_run: cli.dry_run,
        skip_snapshot: cli.skip_snapshot,
    };
    let report = run_backup(&cfg, &opts, &SystemRunner, now_local())?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize run report")?
        );
    } else if !cli.quiet {
        print_summary(&report);
    }
    Ok(())
}

fn init_logger(quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    // RUST_LOG still wins when set.
    Builder::new()
        .filter_level(level)
        .parse_env(Env::default())
        .format_timestamp_secs()
        .init();
}

fn print_summary(report: &RunReport) {
    if report.dry_run {
        println!("dry run, nothing was changed");
    }
    if let Some(snapshot) = &report.new_snapshot {
        println!("snapshot: {}", snapshot);
    }
    println!(
        "snapshots: kept={} pruned={}",
        report.kept_snapshots.len(),
        report.pruned_snapshots.len()
    );
    for repo in &report.repositories {
        if !repo.accessible {
            println!("{}: not accessible", repo.repository);
            continue;
        }
        println!(
            "{}: created={} deleted={}{}",
            repo.repository,
            repo.created_archives.len(),
            repo.deleted_archives.len(),
            if repo.compacted { " (compacted)" } else { "" }
        );
    }
}
