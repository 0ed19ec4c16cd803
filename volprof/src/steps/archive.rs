//! Bundle debug info and the system map into the profile zip.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use tracing::instrument;

use crate::context::ExecContext;
use crate::core::report::human_size;
use crate::core::types::{Artifact, StepOutcome};
use crate::io::process::{CommandRunner, Invocation, run_checked};

#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let name = ctx
        .profile_name
        .clone()
        .ok_or_else(|| anyhow!("profile name not resolved"))?;
    let inputs = [ctx.module_dwarf_path(), ctx.system_map_path()?];
    let (present, missing): (Vec<PathBuf>, Vec<PathBuf>) =
        inputs.into_iter().partition(|path| path.is_file());
    if present.is_empty() {
        bail!("nothing to archive: {}", display_list(&missing));
    }

    let out_dir = ctx.output_dir();
    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let zip_path = out_dir.join(&name);
    if zip_path.exists() {
        // zip would merge into the stale archive instead of replacing it.
        fs::remove_file(&zip_path)
            .with_context(|| format!("remove stale {}", zip_path.display()))?;
    }

    let zip = ctx.privileged(
        Invocation::new("zip")
            .arg("-j")
            .arg(zip_path.to_string_lossy())
            .args(present.iter().map(|path| path.to_string_lossy().to_string())),
    );
    ctx.note(&format!("creating profile: {zip}"));
    run_checked(ctx.runner, &zip).context("create profile zip")?;

    let size_bytes = fs::metadata(&zip_path)
        .with_context(|| format!("stat {}", zip_path.display()))?
        .len();
    ctx.artifact = Some(Artifact {
        path: zip_path.clone(),
        size_bytes,
    });

    if !missing.is_empty() {
        return Ok(StepOutcome::warning(format!(
            "created {} without {}",
            zip_path.display(),
            display_list(&missing)
        )));
    }
    Ok(StepOutcome::success(format!(
        "created {} ({})",
        zip_path.display(),
        human_size(size_bytes)
    )))
}

fn display_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
