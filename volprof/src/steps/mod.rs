//! Pipeline steps. Each takes the shared [`ExecContext`] and returns a
//! [`StepOutcome`]; an `Err` is fatal.

pub mod archive;
pub mod dependencies;
pub mod host_facts;
pub mod kernel_headers;
pub mod module_build;
pub mod repository;
pub mod system_map;

use anyhow::Result;

use crate::context::ExecContext;
use crate::core::types::{StepId, StepOutcome};
use crate::io::process::CommandRunner;

/// Run one step by id.
pub fn run_step<R: CommandRunner + ?Sized>(
    step: StepId,
    ctx: &mut ExecContext<'_, R>,
) -> Result<StepOutcome> {
    match step {
        StepId::HostFacts => host_facts::run(ctx),
        StepId::Dependencies => dependencies::run(ctx),
        StepId::KernelHeaders => kernel_headers::run(ctx),
        StepId::SystemMap => system_map::run(ctx),
        StepId::Repository => repository::run(ctx),
        StepId::ModuleBuild => module_build::run(ctx),
        StepId::Archive => archive::run(ctx),
    }
}
