//! Summary of a profile run and its exit code.

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::types::{Artifact, StepId, StepRecord};
use crate::exit_codes;

/// Everything a caller needs to judge a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// `None` when host facts could not be resolved.
    pub profile_name: Option<String>,
    pub steps: Vec<StepRecord>,
    pub artifact: Option<Artifact>,
    pub strict: bool,
}

impl PipelineReport {
    /// The step that stopped the pipeline, if any.
    pub fn fatal_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.outcome.is_fatal())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|record| record.outcome.is_warning())
    }

    pub fn record(&self, step: StepId) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.step == step)
    }

    pub fn exit_code(&self) -> i32 {
        if let Some(fatal) = self.fatal_step() {
            return fatal.step.exit_code();
        }
        if self.artifact.is_none() {
            // Every step ran without a fatal outcome but nothing was archived.
            return exit_codes::ARCHIVE;
        }
        if self.warnings().next().is_some() {
            return exit_codes::DEGRADED;
        }
        exit_codes::OK
    }

    /// Multi-line human summary printed after a run.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for record in &self.steps {
            let _ = writeln!(
                out,
                "{:<15} {:<8} {}",
                record.step.as_str(),
                record.outcome.label(),
                record.outcome.message()
            );
        }
        match &self.artifact {
            Some(artifact) => {
                let _ = writeln!(
                    out,
                    "profile: {} ({})",
                    artifact.path.display(),
                    human_size(artifact.size_bytes)
                );
            }
            None => {
                let _ = writeln!(out, "profile: not created");
            }
        }
        let warnings = self.warnings().count();
        if warnings > 0 {
            let _ = writeln!(out, "warnings: {warnings} (profile may be incomplete)");
        }
        if let Some(fatal) = self.fatal_step() {
            let _ = writeln!(out, "stopped at: {}", fatal.step);
        }
        out
    }
}

/// Format a byte count the way `du -h` does (`4.2M`).
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        // Compare what will be printed, so 1023.96K shows as 1.0M.
        if (value * 10.0).round() / 10.0 < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1}{unit}")
}
