//! Ensure kernel headers for the target kernel are installed.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::context::ExecContext;
use crate::core::template::render_kernel_template;
use crate::core::types::StepOutcome;
use crate::io::process::CommandRunner;

#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let headers_dir = ctx.headers_dir()?;
    if headers_dir.is_dir() {
        return Ok(StepOutcome::success(format!(
            "headers present at {}",
            headers_dir.display()
        )));
    }

    let package = render_kernel_template(&ctx.config.package_manager.headers_package, ctx.kernel()?)
        .context("render headers package name")?;
    ctx.note(&format!(
        "kernel headers missing at {}, installing {package}",
        headers_dir.display()
    ));
    ctx.ensure_cache_updated()?;
    ctx.install_package(&package)?;

    if !headers_dir.is_dir() {
        return Ok(StepOutcome::warning(format!(
            "installed {package} but {} is still missing",
            headers_dir.display()
        )));
    }
    Ok(StepOutcome::success(format!("installed {package}")))
}
