//! Shared deterministic types for the profile pipeline.
//!
//! These types carry no I/O. Step functions produce them; the report and the
//! CLI consume them.

use std::fmt;

use serde::Serialize;

use crate::exit_codes;

/// Pipeline steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    HostFacts,
    Dependencies,
    KernelHeaders,
    SystemMap,
    Repository,
    ModuleBuild,
    Archive,
}

impl StepId {
    pub const ALL: [StepId; 7] = [
        StepId::HostFacts,
        StepId::Dependencies,
        StepId::KernelHeaders,
        StepId::SystemMap,
        StepId::Repository,
        StepId::ModuleBuild,
        StepId::Archive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::HostFacts => "host_facts",
            StepId::Dependencies => "dependencies",
            StepId::KernelHeaders => "kernel_headers",
            StepId::SystemMap => "system_map",
            StepId::Repository => "repository",
            StepId::ModuleBuild => "module_build",
            StepId::Archive => "archive",
        }
    }

    /// Exit code used when this step stops the pipeline.
    pub fn exit_code(self) -> i32 {
        match self {
            StepId::HostFacts => exit_codes::HOST_FACTS,
            StepId::Dependencies => exit_codes::DEPENDENCIES,
            StepId::KernelHeaders => exit_codes::KERNEL_HEADERS,
            StepId::SystemMap => exit_codes::SYSTEM_MAP,
            StepId::Repository => exit_codes::REPOSITORY,
            StepId::ModuleBuild => exit_codes::MODULE_BUILD,
            StepId::Archive => exit_codes::ARCHIVE,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one step.
///
/// `Warning` is recoverable: the pipeline continues unless strict mode promotes
/// it. `Fatal` always stops the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Success { detail: String },
    Skipped { reason: String },
    Warning { message: String },
    Fatal { message: String },
}

impl StepOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        StepOutcome::Success {
            detail: detail.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StepOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        StepOutcome::Warning {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        StepOutcome::Fatal {
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StepOutcome::Fatal { .. })
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, StepOutcome::Warning { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Success { .. } => "ok",
            StepOutcome::Skipped { .. } => "skipped",
            StepOutcome::Warning { .. } => "warning",
            StepOutcome::Fatal { .. } => "fatal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StepOutcome::Success { detail } => detail,
            StepOutcome::Skipped { reason } => reason,
            StepOutcome::Warning { message } | StepOutcome::Fatal { message } => message,
        }
    }
}

/// A step and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: StepId,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// The profile zip produced by a successful archive step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: std::path::PathBuf,
    pub size_bytes: u64,
}
