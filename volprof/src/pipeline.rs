//! Forward-only orchestration of a profile run.
//!
//! Steps run in [`StepId::ALL`] order. A fatal outcome stops the chain; a
//! warning is recorded and the chain continues, unless strict mode promotes it.
//! Nothing is rolled back.

use tracing::{debug, instrument};

use crate::context::ExecContext;
use crate::core::report::{PipelineReport, human_size};
use crate::core::types::{StepId, StepOutcome, StepRecord};
use crate::io::process::CommandRunner;
use crate::steps::run_step;

#[instrument(skip_all, fields(strict = ctx.options.strict))]
pub fn run_pipeline<R: CommandRunner + ?Sized>(ctx: &mut ExecContext<'_, R>) -> PipelineReport {
    ctx.note("starting volatility profile run");
    let mut steps = Vec::with_capacity(StepId::ALL.len());

    for step in StepId::ALL {
        debug!(%step, "step started");
        let outcome = match run_step(step, ctx) {
            Ok(outcome) => outcome,
            Err(err) => StepOutcome::fatal(format!("{err:#}")),
        };
        let outcome = apply_policy(outcome, ctx.options.strict);
        ctx.note(&format!("{step}: {} {}", outcome.label(), outcome.message()));

        let stop = outcome.is_fatal();
        steps.push(StepRecord { step, outcome });
        if stop {
            break;
        }
    }

    let report = PipelineReport {
        profile_name: ctx.profile_name.clone(),
        steps,
        artifact: ctx.artifact.clone(),
        strict: ctx.options.strict,
    };
    let summary = match &report.artifact {
        Some(artifact) => format!(
            "profile written to {} ({})",
            artifact.path.display(),
            human_size(artifact.size_bytes)
        ),
        None => "profile not created".to_string(),
    };
    ctx.note(&format!("{summary}; exit code {}", report.exit_code()));
    report
}

/// Strict mode turns warnings into fatal outcomes.
fn apply_policy(outcome: StepOutcome, strict: bool) -> StepOutcome {
    match outcome {
        StepOutcome::Warning { message } if strict => {
            StepOutcome::fatal(format!("{message} (strict mode)"))
        }
        other => other,
    }
}
