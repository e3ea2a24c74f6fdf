//! External command invocation.
//!
//! Everything this tool does to the system goes through a [`Runner`].
//! [`Executor`] layers dry-run handling and exit-status checks on top, so the
//! btrfs and borg modules only describe *what* to run.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment. Never displayed.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Builds an invocation from a config argv list (`[program, args...]`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    /// Stdout goes to our own stdout.
    Inherit,
    /// Stdout is collected into [`Outcome::stdout`].
    Stdout,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait Runner {
    fn run(&self, invocation: &Invocation, capture: Capture) -> Result<Outcome>;
}

/// Runs commands as child processes with stdin closed and stderr inherited.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, invocation: &Invocation, capture: Capture) -> Result<Outcome> {
        // Keep our own output ordered before the child's.
        let _ = std::io::stdout().flush();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        match capture {
            Capture::Inherit => {
                let status = cmd
                    .stdout(Stdio::inherit())
                    .status()
                    .with_context(|| format!("spawn {}", invocation.program))?;
                Ok(Outcome {
                    code: status.code(),
                    stdout: String::new(),
                })
            }
            Capture::Stdout => {
                let output = cmd
                    .stdout(Stdio::piped())
                    .output()
                    .with_context(|| format!("spawn {}", invocation.program))?;
                let stdout = String::from_utf8(output.stdout)
                    .with_context(|| format!("decode stdout of {}", invocation))?;
                Ok(Outcome {
                    code: output.status.code(),
                    stdout,
                })
            }
        }
    }
}

pub struct Executor<'a> {
    runner: &'a dyn Runner,
    dry_run: bool,
}

impl<'a> Executor<'a> {
    pub fn new(runner: &'a dyn Runner, dry_run: bool) -> Self {
        Self { runner, dry_run }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs a command that changes something. Skipped in dry run.
    pub fn run(&self, invocation: &Invocation) -> Result<()> {
        if self.dry_run {
            info!("Skipping {}", invocation);
            return Ok(());
        }
        info!("Running {}", invocation);
        let outcome = self.runner.run(invocation, Capture::Inherit)?;
        check_outcome(invocation, &outcome)
    }

    /// Like [`Executor::run`], but a non-zero exit status is not an error.
    pub fn run_unchecked(&self, invocation: &Invocation) -> Result<()> {
        if self.dry_run {
            info!("Skipping {}", invocation);
            return Ok(());
        }
        info!("Running {}", invocation);
        let outcome = self.runner.run(invocation, Capture::Inherit)?;
        if !outcome.success() {
            debug!("ignoring {}: {}", describe_exit(outcome.code), invocation);
        }
        Ok(())
    }

    /// Runs a read-only command, also in dry run, and returns its stdout.
    pub fn query(&self, invocation: &Invocation) -> Result<String> {
        info!("Running {}", invocation);
        let outcome = self.runner.run(invocation, Capture::Stdout)?;
        check_outcome(invocation, &outcome)?;
        Ok(outcome.stdout)
    }

    /// Runs a read-only command, also in dry run, and reports whether it
    /// exited successfully. Failing to start it at all is an error.
    pub fn succeeds(&self, invocation: &Invocation) -> Result<bool> {
        info!("Running {}", invocation);
        let outcome = self.runner.run(invocation, Capture::Inherit)?;
        Ok(outcome.success())
    }
}

/// Combines the result of a step with the result of its cleanup. The step's
/// error wins; a cleanup error behind it is only logged.
pub fn first_error<T>(result: Result<T>, cleanup: Result<()>) -> Result<T> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!("cleanup failed as well: {:#}", cleanup_err);
            Err(err)
        }
    }
}

fn check_outcome(invocation: &Invocation, outcome: &Outcome) -> Result<()> {
    if outcome.success() {
        return Ok(());
    }
    Err(anyhow!(
        "command failed ({}): {}",
        describe_exit(outcome.code),
        invocation
    ))
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
#[path = "tests/exec_tests.rs"]
mod tests;
