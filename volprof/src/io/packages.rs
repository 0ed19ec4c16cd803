//! Package manager adapter (apt-get by default).
//!
//! Commands come from `[package_manager]` in the config, so any manager with
//! "refresh index" and "install names..." verbs works.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::io::config::PackageManagerConfig;
use crate::io::process::{CommandRunner, Invocation, run_checked};

pub struct PackageManager<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: &'a PackageManagerConfig,
    elevate: &'a [String],
}

impl<'a, R: CommandRunner + ?Sized> PackageManager<'a, R> {
    pub fn new(runner: &'a R, config: &'a PackageManagerConfig, elevate: &'a [String]) -> Self {
        Self {
            runner,
            config,
            elevate,
        }
    }

    /// Refresh the package index.
    #[instrument(skip_all)]
    pub fn update(&self) -> Result<()> {
        let invocation = Invocation::from_argv(&self.config.update)?.elevated(self.elevate);
        info!(command = %invocation, "updating package cache");
        run_checked(self.runner, &invocation).context("update package cache")?;
        Ok(())
    }

    /// Install one package.
    #[instrument(skip_all, fields(package = %package))]
    pub fn install(&self, package: &str) -> Result<()> {
        let invocation = Invocation::from_argv(&self.config.install)?
            .arg(package)
            .elevated(self.elevate);
        info!(command = %invocation, "installing package");
        run_checked(self.runner, &invocation).with_context(|| format!("install {package}"))?;
        Ok(())
    }
}
