use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::info;
use time::PrimitiveDateTime;

use crate::exec::{Executor, Invocation};
use crate::model::BorgConfig;
use crate::stamp::{StampFormat, iso_timestamp};

/// Archive names by timestamp, oldest first.
pub type Archives = BTreeMap<PrimitiveDateTime, String>;

/// One Borg repository. Every command gets `borg.env` on top of the
/// inherited environment.
pub struct BorgRepository<'a> {
    repository: &'a str,
    cfg: &'a BorgConfig,
    stamp: &'a StampFormat,
    exec: &'a Executor<'a>,
}

impl<'a> BorgRepository<'a> {
    pub fn new(
        repository: &'a str,
        cfg: &'a BorgConfig,
        stamp: &'a StampFormat,
        exec: &'a Executor<'a>,
    ) -> Self {
        Self {
            repository,
            cfg,
            stamp,
            exec,
        }
    }

    pub fn repository(&self) -> &str {
        self.repository
    }

    pub fn archive_name(&self, suffix: &str) -> String {
        format!("{}{}", self.cfg.prefix, suffix)
    }

    pub fn is_accessible(&self) -> Result<bool> {
        self.exec.succeeds(&self.borg("info").arg(self.repository))
    }

    pub fn list_archives(&self) -> Result<Archives> {
        info!("Getting a list of borg archives ({})", self.repository);
        let output = self.exec.query(&self.borg("list").arg(self.repository))?;
        parse_archive_list(&output, &self.cfg.prefix, self.stamp)
            .with_context(|| format!("list archives of {}", self.repository))
    }

    /// Backs up the configured paths of a mounted snapshot. The archive is
    /// named after the snapshot suffix and stamped with its time.
    pub fn create_archive(
        &self,
        suffix: &str,
        dt: PrimitiveDateTime,
        source_dir: &Path,
    ) -> Result<String> {
        let name = self.archive_name(suffix);
        let paths = existing_paths(source_dir, &self.cfg.paths, self.exec.dry_run());
        self.exec.run(
            &self
                .borg("create")
                .args(["--verbose", "--stats", "--show-rc", "--timestamp"])
                .arg(iso_timestamp(dt)?)
                .args(self.cfg.extra.iter().cloned())
                .arg(format!("{}::{}", self.repository, name))
                .args(paths)
                .current_dir(source_dir),
        )?;
        Ok(name)
    }

    pub fn delete_archive(&self, name: &str) -> Result<()> {
        self.exec
            .run(&self.borg("delete").arg(format!("{}::{}", self.repository, name)))
    }

    /// Frees the space of deleted archives.
    pub fn compact(&self) -> Result<()> {
        info!(
            "Compacting repository after removing old archives ({})",
            self.repository
        );
        self.exec.run(&self.borg("compact").arg(self.repository))
    }

    fn borg(&self, subcommand: &str) -> Invocation {
        Invocation::new("borg")
            .arg(subcommand)
            .envs(&self.cfg.env)
    }
}

/// Parses `borg list` output: the archive name is the first column. Every
/// archive must carry the configured prefix followed by a timestamp.
pub fn parse_archive_list(output: &str, prefix: &str, stamp: &StampFormat) -> Result<Archives> {
    let mut archives = Archives::new();
    for line in output.lines() {
        let Some(name) = line.split_whitespace().next() else {
            continue;
        };
        let suffix = name.strip_prefix(prefix).ok_or_else(|| {
            anyhow!(
                "archive {:?} has the wrong prefix, expected {:?}",
                name,
                prefix
            )
        })?;
        let dt = stamp
            .parse(suffix)
            .with_context(|| format!("archive {:?}", name))?;
        archives.insert(dt, name.to_string());
    }
    Ok(archives)
}

/// Paths that exist below `root`. Missing ones are logged and dropped,
/// unless `keep_all` is set (dry run, nothing is mounted).
pub fn existing_paths(root: &Path, paths: &[String], keep_all: bool) -> Vec<String> {
    if keep_all {
        return paths.to_vec();
    }
    paths
        .iter()
        .filter(|path| {
            let present = root.join(path).exists();
            if !present {
                info!("Ignoring missing path {}", path);
            }
            present
        })
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "tests/borg_tests.rs"]
mod tests;
