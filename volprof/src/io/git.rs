//! Git adapter for fetching the profile tooling repository.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::{CommandOutput, CommandRunner, Invocation, run_checked};

/// Wrapper for executing git commands in a working directory.
pub struct Git<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    workdir: PathBuf,
}

impl<'a, R: CommandRunner + ?Sized> Git<'a, R> {
    pub fn new(runner: &'a R, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    /// `git clone --depth 1 <url> <dest>`. The destination must not exist.
    #[instrument(skip_all, fields(url = %url, dest = %dest.display()))]
    pub fn clone_shallow(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Err(anyhow!("clone destination {} already exists", dest.display()));
        }
        let dest_arg = dest.to_string_lossy().to_string();
        debug!("cloning");
        self.run_checked(&["clone", "--depth", "1", url, &dest_arg])
            .with_context(|| format!("clone {url}"))?;
        Ok(())
    }

    /// Short SHA of `HEAD` in `repo`.
    pub fn head_short_sha(&self, repo: &Path, len: usize) -> Result<String> {
        let arg = format!("--short={len}");
        let repo_arg = repo.to_string_lossy().to_string();
        let out = self.run_capture(&["-C", &repo_arg, "rev-parse", &arg, "HEAD"])?;
        Ok(out.trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout_text())
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let invocation = Invocation::new("git")
            .args(args.iter().copied())
            .current_dir(&self.workdir);
        run_checked(self.runner, &invocation)
    }
}
