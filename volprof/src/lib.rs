//! Build Volatility Linux profiles for the running kernel.
//!
//! A profile is a zip of `module.dwarf` (debug info from a compiled kernel
//! module stub) and `System.map-<kernel>`. Producing one is a fixed chain of
//! external tools; this crate runs that chain with one explicit error policy.
//!
//! - **[`core`]**: Pure logic (naming, lsb-release parsing, outcomes, exit codes).
//! - **[`io`]**: Side-effecting adapters (processes, config, git, packages, run log).
//!
//! [`steps`] and [`pipeline`] coordinate the two through an [`context::ExecContext`].

pub mod context;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod steps;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
