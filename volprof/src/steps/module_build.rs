//! Compile the kernel module stub and extract `module.dwarf`.

use std::fs;

use anyhow::{Context, Result};
use tracing::{instrument, warn};

use crate::context::ExecContext;
use crate::core::types::StepOutcome;
use crate::io::process::{CommandRunner, Invocation};

/// Run the configured make command with `KVER=<kernel>` in the module directory.
///
/// Build failures are warnings; the archive step reports what is missing.
#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let module_dir = ctx.module_dir();
    let dwarf = ctx.module_dwarf_path();
    if !module_dir.is_dir() {
        return Ok(StepOutcome::warning(format!(
            "module directory {} not found in clone",
            module_dir.display()
        )));
    }

    // Only debug info built by this run may reach the archive.
    if dwarf.exists() {
        fs::remove_file(&dwarf)
            .with_context(|| format!("remove stale {}", dwarf.display()))?;
        ctx.note(&format!("removed stale {}", dwarf.display()));
    }

    let make = Invocation::from_argv(&ctx.config.repository.make_command)?
        .arg(format!("KVER={}", ctx.kernel()?))
        .current_dir(&module_dir);
    ctx.note(&format!("building module stub: {make}"));

    let output = match ctx.runner.run(&make) {
        Ok(output) => output,
        Err(err) => {
            warn!(err = %err, "make could not run");
            return Ok(StepOutcome::warning(format!("{make} could not run: {err:#}")));
        }
    };
    if !output.success() {
        return Ok(StepOutcome::warning(format!(
            "{make} failed: {}",
            output.failure_summary()
        )));
    }
    if !dwarf.is_file() {
        return Ok(StepOutcome::warning(format!(
            "{make} succeeded but {} was not produced",
            dwarf.display()
        )));
    }
    Ok(StepOutcome::success(format!("built {}", dwarf.display())))
}
