#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use btrborg::exec::{Capture, Invocation, Outcome, Runner};
use btrborg::model::{BackupConfig, BorgConfig, BtrfsConfig, RetentionConfig};

type Hook = Box<dyn Fn(&Invocation)>;

/// Records every invocation instead of running it. Responses are matched by
/// prefix of the displayed command line, first match wins; anything else
/// succeeds with empty output.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<Invocation>>,
    responses: Vec<(String, Outcome)>,
    unavailable: Vec<String>,
    hooks: Vec<Hook>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            Outcome {
                code: Some(0),
                stdout: stdout.to_string(),
            },
        ));
        self
    }

    pub fn fail(mut self, prefix: &str, code: i32) -> Self {
        self.responses.push((
            prefix.to_string(),
            Outcome {
                code: Some(code),
                stdout: String::new(),
            },
        ));
        self
    }

    /// Commands starting with `prefix` fail to start, like a missing binary.
    pub fn unavailable(mut self, prefix: &str) -> Self {
        self.unavailable.push(prefix.to_string());
        self
    }

    /// Called for every invocation before the response is picked.
    pub fn hook(mut self, hook: impl Fn(&Invocation) + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Makes `mount` populate the mount point with `dirs` and `umount` empty
    /// it again, like a real snapshot mount would.
    pub fn simulate_mounts(self, dirs: &'static [&'static str]) -> Self {
        self.hook(move |inv| match inv.program.as_str() {
            "mount" => {
                let target = PathBuf::from(&inv.args[1]);
                for dir in dirs {
                    std::fs::create_dir_all(target.join(dir)).expect("populate mount");
                }
            }
            "umount" => {
                let target = PathBuf::from(&inv.args[0]);
                for dir in dirs {
                    let _ = std::fs::remove_dir_all(target.join(dir));
                }
            }
            _ => {}
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }
}

impl Runner for FakeRunner {
    fn run(&self, invocation: &Invocation, _capture: Capture) -> Result<Outcome> {
        self.calls.borrow_mut().push(invocation.clone());
        for hook in &self.hooks {
            hook(invocation);
        }
        let line = invocation.to_string();
        if self
            .unavailable
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
        {
            return Err(anyhow!("spawn {}: No such file or directory", invocation.program));
        }
        let outcome = self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(Outcome {
                code: Some(0),
                stdout: String::new(),
            });
        Ok(outcome)
    }
}

pub const PREFIX: &str = "snapshots/home_";
pub const REPO: &str = "/srv/borg/home";

pub fn config(mount: &Path) -> BackupConfig {
    let mut env = std::collections::BTreeMap::new();
    env.insert("BORG_PASSPHRASE".to_string(), "correct horse".to_string());
    BackupConfig {
        datetime_format: "%Y_%m_%d__%H_%M_%S".to_string(),
        retention: RetentionConfig {
            keep_daily: 2,
            ..RetentionConfig::default()
        },
        btrfs: BtrfsConfig {
            uuid: "2f6a1c4e".to_string(),
            mount: mount.to_path_buf(),
            source: "@home".to_string(),
            prefix: PREFIX.to_string(),
            pre: vec![vec!["pre-hook".to_string()]],
            post: vec![vec!["post-hook".to_string(), "--done".to_string()]],
        },
        borg: BorgConfig {
            prefix: "home-".to_string(),
            env,
            extra: vec!["--compression".to_string(), "zstd".to_string()],
            paths: vec!["home".to_string(), "var/missing".to_string()],
            repositories: vec![REPO.to_string()],
        },
    }
}

/// A line of `btrfs subvolume list` output for a snapshot suffix.
pub fn subvolume_line(id: u32, suffix: &str) -> String {
    format!("ID {} gen {} top level 5 path {}{}\n", id, id * 10, PREFIX, suffix)
}

/// A line of `borg list` output for a snapshot suffix.
pub fn archive_line(suffix: &str) -> String {
    format!("home-{}    Thu, 2022-05-05 12:00:00 [0123abcd]\n", suffix)
}

pub fn path_str(path: &Path) -> String {
    path.display().to_string()
}
