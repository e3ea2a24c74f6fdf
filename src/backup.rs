//! One backup run: snapshot, prune, then mirror the surviving snapshots into
//! every reachable Borg repository.

use anyhow::Result;
use log::info;
use time::PrimitiveDateTime;

use crate::borg::BorgRepository;
use crate::btrfs::{Btrfs, Snapshots};
use crate::exec::{Executor, Runner};
use crate::model::{BackupConfig, RepositoryReport, RunReport};

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Only run commands that read state.
    pub dry_run: bool,
    /// Reuse the existing snapshots, e.g. to retry after a failed borg run.
    pub skip_snapshot: bool,
}

pub fn run_backup(
    cfg: &BackupConfig,
    opts: &RunOptions,
    runner: &dyn Runner,
    now: PrimitiveDateTime,
) -> Result<RunReport> {
    let stamp = cfg.stamp_format()?;
    let exec = Executor::new(runner, opts.dry_run);
    let btrfs = Btrfs::new(&cfg.btrfs, &stamp, &exec);

    let new_snapshot = if opts.skip_snapshot {
        None
    } else {
        Some(btrfs.create_snapshot(now)?)
    };
    let pruned = btrfs.prune_snapshots(&cfg.retention, new_snapshot.as_deref())?;

    let mut report = RunReport {
        dry_run: opts.dry_run,
        new_snapshot,
        kept_snapshots: pruned.kept.values().cloned().collect(),
        pruned_snapshots: pruned.pruned,
        repositories: Vec::with_capacity(cfg.borg.repositories.len()),
    };

    for repository in &cfg.borg.repositories {
        let repo = BorgRepository::new(repository, &cfg.borg, &stamp, &exec);
        report
            .repositories
            .push(sync_repository(&repo, &btrfs, &pruned.kept)?);
    }

    Ok(report)
}

/// Archives every kept snapshot that has no archive yet, then deletes the
/// archives whose snapshot is gone.
fn sync_repository(
    repo: &BorgRepository<'_>,
    btrfs: &Btrfs<'_>,
    snapshots: &Snapshots,
) -> Result<RepositoryReport> {
    let mut report = RepositoryReport {
        repository: repo.repository().to_string(),
        ..RepositoryReport::default()
    };
    if !repo.is_accessible()? {
        info!("Could not access {}", repo.repository());
        return Ok(report);
    }
    report.accessible = true;

    let archives = repo.list_archives()?;

    info!("Creating new borg archives ({})", repo.repository());
    for (dt, subvol) in snapshots {
        if archives.contains_key(dt) {
            continue;
        }
        let suffix = btrfs.suffix(subvol);
        let name = btrfs.with_mounted(subvol, |dir| repo.create_archive(suffix, *dt, dir))?;
        report.created_archives.push(name);
    }

    info!("Removing old borg archives ({})", repo.repository());
    for (dt, archive) in &archives {
        if snapshots.contains_key(dt) {
            continue;
        }
        repo.delete_archive(archive)?;
        report.deleted_archives.push(archive.clone());
    }

    if !report.deleted_archives.is_empty() {
        repo.compact()?;
        report.compacted = true;
    }

    Ok(report)
}
