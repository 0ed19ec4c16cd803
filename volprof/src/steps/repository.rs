//! Shallow clone of the profile tooling repository.

use anyhow::{Result, bail};
use tracing::instrument;

use crate::context::ExecContext;
use crate::core::types::StepOutcome;
use crate::io::git::Git;
use crate::io::process::CommandRunner;

#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let config = ctx.config;
    let dest = ctx.clone_dir();
    let url = &config.repository.url;

    if dest.exists() {
        if ctx.options.reuse_clone {
            return Ok(StepOutcome::skipped(format!(
                "reusing existing clone at {}",
                dest.display()
            )));
        }
        bail!(
            "{} already exists; remove it or pass --reuse-clone",
            dest.display()
        );
    }

    ctx.note(&format!("cloning {url} into {}", dest.display()));
    let git = Git::new(ctx.runner, &ctx.workdir);
    git.clone_shallow(url, &dest)?;

    let detail = match git.head_short_sha(&dest, 8) {
        Ok(sha) if !sha.is_empty() => format!("cloned {url} at {sha}"),
        _ => format!("cloned {url}"),
    };
    Ok(StepOutcome::success(detail))
}
