//! Locate or generate `System.map-<kernel>`.
//!
//! Generation failures are warnings: a profile without a system map is still
//! written so the operator can decide what to do with it.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{instrument, warn};

use crate::context::ExecContext;
use crate::core::types::StepOutcome;
use crate::io::process::{CommandRunner, Invocation, run_checked};

/// Kernel symbol tables run to a few MB; anything past this is not a System.map.
const NM_CAPTURE_LIMIT: usize = 256 * 1024 * 1024;

#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let map = ctx.system_map_path()?;
    if map.is_file() {
        return Ok(StepOutcome::success(format!("found {}", map.display())));
    }

    let image = ctx.kernel_image_path()?;
    ctx.note(&format!(
        "{} missing, generating from {}",
        map.display(),
        image.display()
    ));
    match generate(ctx, &image, &map) {
        Ok(symbols) => Ok(StepOutcome::success(format!(
            "generated {} ({symbols} symbols)",
            map.display()
        ))),
        Err(err) => {
            warn!(err = %err, "system map generation failed");
            Ok(StepOutcome::warning(format!(
                "system map {} missing and could not be generated: {err:#}",
                map.display()
            )))
        }
    }
}

/// `nm -n <image> | tee <map>`, both privileged. Returns the symbol count.
fn generate<R: CommandRunner + ?Sized>(
    ctx: &ExecContext<'_, R>,
    image: &Path,
    map: &Path,
) -> Result<usize> {
    if !image.is_file() {
        bail!("kernel image {} not found", image.display());
    }
    let nm = ctx.privileged(
        Invocation::new("nm")
            .arg("-n")
            .arg(image.to_string_lossy())
            .capture_limit(NM_CAPTURE_LIMIT),
    );
    let symbols = run_checked(ctx.runner, &nm)?;
    if symbols.stdout_truncated > 0 {
        bail!("nm output exceeded {NM_CAPTURE_LIMIT} bytes");
    }
    let count = symbols
        .stdout
        .split(|byte| *byte == b'\n')
        .filter(|line| !line.is_empty())
        .count();
    if count == 0 {
        bail!("nm found no symbols in {}", image.display());
    }

    let tee = ctx.privileged(
        Invocation::new("tee")
            .arg(map.to_string_lossy())
            .stdin(symbols.stdout),
    );
    run_checked(ctx.runner, &tee).with_context(|| format!("write {}", map.display()))?;
    if !map.is_file() {
        bail!("{} still missing after write", map.display());
    }
    Ok(count)
}
