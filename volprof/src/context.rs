//! Execution context threaded through every pipeline step.
//!
//! Holds what the steps share: configuration, the process runner, the run log,
//! resolved host facts and the memoized package-cache flag. Steps receive it by
//! `&mut` reference; nothing is process-global.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::core::types::Artifact;
use crate::io::config::ProfilerConfig;
use crate::io::host::HostFacts;
use crate::io::packages::PackageManager;
use crate::io::process::{CommandRunner, Invocation};
use crate::io::run_log::RunLog;

/// Caller choices that change pipeline policy, not paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Promote warnings to fatal outcomes.
    pub strict: bool,
    /// Skip the clone when the destination already exists.
    pub reuse_clone: bool,
}

pub struct ExecContext<'a, R: CommandRunner + ?Sized> {
    pub config: &'a ProfilerConfig,
    pub runner: &'a R,
    pub workdir: PathBuf,
    pub options: RunOptions,
    pub log: RunLog,
    pub facts: Option<HostFacts>,
    pub profile_name: Option<String>,
    pub artifact: Option<Artifact>,
    cache_updated: bool,
}

impl<'a, R: CommandRunner + ?Sized> ExecContext<'a, R> {
    pub fn new(
        config: &'a ProfilerConfig,
        runner: &'a R,
        workdir: impl Into<PathBuf>,
        options: RunOptions,
        log: RunLog,
    ) -> Self {
        Self {
            config,
            runner,
            workdir: workdir.into(),
            options,
            log,
            facts: None,
            profile_name: None,
            artifact: None,
            cache_updated: false,
        }
    }

    /// Append to the run log and mirror to tracing. A log write failure is
    /// reported on stderr but never stops the run.
    pub fn note(&mut self, message: &str) {
        info!("{message}");
        if let Err(err) = self.log.record(message) {
            warn!(err = %err, "failed to write run log");
        }
    }

    /// Refresh the package index once per run. Returns `true` if this call ran it.
    pub fn ensure_cache_updated(&mut self) -> Result<bool> {
        if self.cache_updated {
            return Ok(false);
        }
        self.note("updating package cache");
        self.packages().update()?;
        self.cache_updated = true;
        Ok(true)
    }

    pub fn install_package(&mut self, package: &str) -> Result<()> {
        self.note(&format!("installing package {package}"));
        self.packages().install(package)
    }

    fn packages(&self) -> PackageManager<'a, R> {
        PackageManager::new(self.runner, &self.config.package_manager, self.elevation())
    }

    pub fn facts(&self) -> Result<&HostFacts> {
        self.facts
            .as_ref()
            .ok_or_else(|| anyhow!("host facts not resolved"))
    }

    pub fn kernel(&self) -> Result<&str> {
        Ok(&self.facts()?.kernel_release)
    }

    /// Elevation prefix for privileged commands; empty when running as root.
    pub fn elevation(&self) -> &'a [String] {
        match &self.facts {
            Some(facts) if facts.is_root => &[],
            _ => &self.config.elevate,
        }
    }

    pub fn privileged(&self, invocation: Invocation) -> Invocation {
        invocation.elevated(self.elevation())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.config.resolve(&self.workdir, path)
    }

    /// `<modules_dir>/<kernel>/build`, provided by the headers package.
    pub fn headers_dir(&self) -> Result<PathBuf> {
        Ok(self
            .resolve(&self.config.modules_dir)
            .join(self.kernel()?)
            .join("build"))
    }

    pub fn system_map_path(&self) -> Result<PathBuf> {
        Ok(self
            .resolve(&self.config.boot_dir)
            .join(format!("System.map-{}", self.kernel()?)))
    }

    pub fn kernel_image_path(&self) -> Result<PathBuf> {
        Ok(self
            .resolve(&self.config.boot_dir)
            .join(format!("vmlinuz-{}", self.kernel()?)))
    }

    pub fn clone_dir(&self) -> PathBuf {
        self.resolve(&self.config.repository.dest)
    }

    pub fn module_dir(&self) -> PathBuf {
        self.clone_dir().join(&self.config.repository.module_subdir)
    }

    pub fn module_dwarf_path(&self) -> PathBuf {
        self.module_dir().join("module.dwarf")
    }

    /// Configured output directory, or the overlay directory inside the clone.
    pub fn output_dir(&self) -> PathBuf {
        match &self.config.output_dir {
            Some(dir) => self.resolve(dir),
            None => self.clone_dir().join(&self.config.repository.overlay_subdir),
        }
    }
}
