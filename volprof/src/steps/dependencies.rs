//! Install missing command-line dependencies.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::context::ExecContext;
use crate::core::types::StepOutcome;
use crate::io::process::CommandRunner;

/// For each configured executable not on the search path, install its package.
///
/// The package cache is refreshed once, before the first install, and only if
/// something is missing. Packages shared by several executables install once.
#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let config = ctx.config;
    let mut packages: Vec<&str> = Vec::new();
    for dep in &config.dependencies {
        if ctx.runner.executable_exists(&dep.executable) {
            debug!(executable = %dep.executable, "present");
            continue;
        }
        ctx.note(&format!(
            "{} not found, needs package {}",
            dep.executable, dep.package
        ));
        if !packages.contains(&dep.package.as_str()) {
            packages.push(&dep.package);
        }
    }

    if packages.is_empty() {
        return Ok(StepOutcome::success(format!(
            "all {} executables present",
            config.dependencies.len()
        )));
    }

    ctx.ensure_cache_updated()?;
    for package in &packages {
        ctx.install_package(package)?;
    }
    Ok(StepOutcome::success(format!(
        "installed {}",
        packages.join(", ")
    )))
}
