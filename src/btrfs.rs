use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use time::PrimitiveDateTime;

use crate::exec::{Executor, Invocation, first_error};
use crate::model::{BtrfsConfig, RetentionConfig};
use crate::retention::grandfather_father_son;
use crate::stamp::StampFormat;

/// Snapshots by timestamp, oldest first.
pub type Snapshots = BTreeMap<PrimitiveDateTime, String>;

#[derive(Clone, Debug, Default)]
pub struct PruneOutcome {
    pub kept: Snapshots,
    pub pruned: Vec<String>,
}

pub struct Btrfs<'a> {
    cfg: &'a BtrfsConfig,
    stamp: &'a StampFormat,
    exec: &'a Executor<'a>,
}

impl<'a> Btrfs<'a> {
    pub fn new(cfg: &'a BtrfsConfig, stamp: &'a StampFormat, exec: &'a Executor<'a>) -> Self {
        Self { cfg, stamp, exec }
    }

    pub fn subvolume_path(&self, subvol: &str) -> PathBuf {
        self.cfg.mount.join(subvol)
    }

    /// Directory where snapshots are mounted while Borg reads them.
    pub fn mount_dir(&self) -> PathBuf {
        self.cfg.mount.join(format!("{}current", self.cfg.prefix))
    }

    /// Timestamp suffix of a snapshot subvolume path.
    pub fn suffix<'s>(&self, subvol: &'s str) -> &'s str {
        subvol.strip_prefix(&self.cfg.prefix).unwrap_or(subvol)
    }

    /// Takes a read-only snapshot of the source subvolume, wrapped in the
    /// configured pre and post hooks. Post hooks run even when the snapshot
    /// fails. Returns the new subvolume path relative to the mount.
    pub fn create_snapshot(&self, now: PrimitiveDateTime) -> Result<String> {
        info!("Preparing for snapshot");
        let result = self.run_hooks(&self.cfg.pre).and_then(|()| {
            info!("Making a new snapshot");
            let subvol = format!("{}{}", self.cfg.prefix, self.stamp.format(now)?);
            self.exec.run(
                &Invocation::new("btrfs")
                    .args(["subvolume", "snapshot", "-r"])
                    .path_arg(&self.subvolume_path(&self.cfg.source))
                    .path_arg(&self.subvolume_path(&subvol)),
            )?;
            Ok(subvol)
        });

        info!("Cleaning after snapshot");
        let cleanup = self.run_hooks(&self.cfg.post);
        first_error(result, cleanup)
    }

    pub fn list_snapshots(&self) -> Result<Snapshots> {
        let output = self.exec.query(
            &Invocation::new("btrfs")
                .args(["subvolume", "list"])
                .path_arg(&self.cfg.mount),
        )?;
        Ok(parse_subvolume_list(&output, &self.cfg.prefix, self.stamp))
    }

    /// Deletes the snapshots the retention policy drops and returns the rest.
    ///
    /// In dry run the new snapshot was never created, so it is added to the
    /// listing to get the same plan a real run would compute.
    pub fn prune_snapshots(
        &self,
        policy: &RetentionConfig,
        new_snapshot: Option<&str>,
    ) -> Result<PruneOutcome> {
        info!("Pruning old snapshots");
        let mut snapshots = self.list_snapshots()?;
        if self.exec.dry_run()
            && let Some(subvol) = new_snapshot
        {
            let dt = self.stamp.parse(self.suffix(subvol))?;
            snapshots.insert(dt, subvol.to_string());
        }

        let dts: Vec<PrimitiveDateTime> = snapshots.keys().copied().collect();
        let plan = grandfather_father_son(&dts, policy);

        let mut pruned = Vec::with_capacity(plan.prune.len());
        for dt in plan.prune {
            let Some(subvol) = snapshots.remove(&dt) else {
                continue;
            };
            self.exec.run(
                &Invocation::new("btrfs")
                    .args(["subvolume", "delete"])
                    .path_arg(&self.subvolume_path(&subvol)),
            )?;
            pruned.push(subvol);
        }

        Ok(PruneOutcome {
            kept: snapshots,
            pruned,
        })
    }

    /// Mounts a snapshot on [`Btrfs::mount_dir`], runs `f` on it and always
    /// unmounts and removes the directory afterwards.
    pub fn with_mounted<T>(&self, subvol: &str, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        let dir = self.mount_dir();
        if dir.is_dir() {
            // Left over from an interrupted run.
            self.exec
                .run_unchecked(&Invocation::new("umount").path_arg(&dir))?;
        } else if self.exec.dry_run() {
            info!("Skipping creation of {}", dir.display());
        } else {
            info!("Creating {}", dir.display());
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }

        let mounted = self.exec.run(
            &Invocation::new("mount")
                .arg(format!("UUID={}", self.cfg.uuid))
                .path_arg(&dir)
                .arg("-o")
                .arg(format!("subvol={},noatime", subvol)),
        );
        if let Err(err) = mounted {
            if let Err(cleanup_err) = self.remove_mount_dir(&dir) {
                warn!("{:#}", cleanup_err);
            }
            return Err(err);
        }

        let result = f(&dir);
        let cleanup = self
            .exec
            .run(&Invocation::new("umount").path_arg(&dir))
            .and_then(|()| self.remove_mount_dir(&dir));
        first_error(result, cleanup)
    }

    fn remove_mount_dir(&self, dir: &Path) -> Result<()> {
        if self.exec.dry_run() {
            info!("Skipping removal of {}", dir.display());
            return Ok(());
        }
        info!("Removing {}", dir.display());
        fs::remove_dir(dir).with_context(|| format!("remove {}", dir.display()))
    }

    fn run_hooks(&self, hooks: &[Vec<String>]) -> Result<()> {
        for argv in hooks {
            self.exec.run(&Invocation::from_argv(argv)?)?;
        }
        Ok(())
    }
}

/// Extracts prefixed snapshots from `btrfs subvolume list` output. The path
/// is the last column; entries whose suffix is not a timestamp are skipped.
pub fn parse_subvolume_list(output: &str, prefix: &str, stamp: &StampFormat) -> Snapshots {
    let mut snapshots = Snapshots::new();
    for line in output.lines() {
        let Some(subvol) = line.split_whitespace().last() else {
            continue;
        };
        let Some(suffix) = subvol.strip_prefix(prefix) else {
            continue;
        };
        match stamp.parse(suffix) {
            Ok(dt) => {
                if let Some(previous) = snapshots.insert(dt, subvol.to_string()) {
                    warn!("{} and {} share a timestamp, ignoring {}", previous, subvol, previous);
                }
            }
            Err(err) => warn!("Ignoring subvolume {}: {:#}", subvol, err),
        }
    }
    snapshots
}

#[cfg(test)]
#[path = "tests/btrfs_tests.rs"]
mod tests;
