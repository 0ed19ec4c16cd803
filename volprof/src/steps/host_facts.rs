//! Resolve kernel, architecture, OS and hostname, and derive the profile name.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::context::ExecContext;
use crate::core::profile_name::{NameParts, render_profile_name};
use crate::core::types::StepOutcome;
use crate::io::host::detect_host_facts;
use crate::io::process::CommandRunner;

#[instrument(skip_all)]
pub fn run<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> Result<StepOutcome> {
    let facts = detect_host_facts(ctx.runner, ctx.config, &ctx.workdir)?;
    let name = render_profile_name(
        &ctx.config.profile_name_template,
        &NameParts {
            hostname: &facts.hostname,
            os_description: &facts.os_description,
            kernel: &facts.kernel_release,
            arch: &facts.arch,
        },
    )
    .context("render profile name")?;

    let detail = format!(
        "kernel {} on {} ({}), host {}; profile {name}",
        facts.kernel_release, facts.arch, facts.os_description, facts.hostname
    );
    ctx.facts = Some(facts);
    ctx.profile_name = Some(name);
    Ok(StepOutcome::success(detail))
}
