use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::stamp::StampFormat;

pub const DEFAULT_DATETIME_FORMAT: &str = "%Y_%m_%d__%H_%M_%S";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Format of the timestamp suffix of snapshots and archives.
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,

    #[serde(flatten)]
    pub retention: RetentionConfig,

    pub btrfs: BtrfsConfig,

    #[serde(default)]
    pub borg: BorgConfig,
}

/// Number of snapshots kept per time bucket. Zero disables a bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub keep_tenminutely: u32,
    #[serde(default)]
    pub keep_hourly: u32,
    #[serde(default)]
    pub keep_daily: u32,
    #[serde(default)]
    pub keep_weekly: u32,
    #[serde(default)]
    pub keep_monthly: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BtrfsConfig {
    /// UUID of the btrfs filesystem, used to mount snapshots for Borg.
    #[serde(default)]
    pub uuid: String,

    /// Mount point of the btrfs root volume.
    pub mount: PathBuf,

    /// Subvolume to snapshot, relative to `mount`.
    #[serde(default)]
    pub source: String,

    /// Prefix of snapshot subvolume paths, relative to `mount`.
    pub prefix: String,

    /// Commands run before a snapshot. Each command is an argv list, no shell.
    #[serde(default)]
    pub pre: Vec<Vec<String>>,

    /// Commands run after a snapshot, also when taking it failed.
    #[serde(default)]
    pub post: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BorgConfig {
    #[serde(default)]
    pub prefix: String,

    /// Extra environment for every borg command (passphrase, rsh, ...).
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Extra arguments for `borg create`.
    #[serde(default)]
    pub extra: Vec<String>,

    /// Paths inside the snapshot to back up.
    #[serde(default)]
    pub paths: Vec<String>,

    /// Leave empty to skip Borg entirely.
    #[serde(default)]
    pub repositories: Vec<String>,
}

fn default_datetime_format() -> String {
    DEFAULT_DATETIME_FORMAT.to_string()
}

impl BackupConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let cfg: BackupConfig = if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("parse config {}", path.display()))?
        } else {
            Self::from_yaml(&text).with_context(|| format!("parse config {}", path.display()))?
        };
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parse yaml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.btrfs.prefix.is_empty() {
            return Err(anyhow!("btrfs.prefix must not be empty"));
        }
        if self.btrfs.mount.as_os_str().is_empty() {
            return Err(anyhow!("btrfs.mount must not be empty"));
        }
        if !self.borg.repositories.is_empty() && self.btrfs.uuid.is_empty() {
            return Err(anyhow!(
                "btrfs.uuid is required to mount snapshots for borg repositories"
            ));
        }
        for (name, hooks) in [("pre", &self.btrfs.pre), ("post", &self.btrfs.post)] {
            if let Some(idx) = hooks.iter().position(|argv| argv.is_empty()) {
                return Err(anyhow!("btrfs.{}[{}] is an empty command", name, idx));
            }
        }
        self.stamp_format()?.check_roundtrip()?;
        Ok(())
    }

    pub fn stamp_format(&self) -> Result<StampFormat> {
        StampFormat::new(&self.datetime_format)
            .with_context(|| format!("datetime_format {:?}", self.datetime_format))
    }
}

#[cfg(test)]
#[path = "../tests/model/config_tests.rs"]
mod tests;
