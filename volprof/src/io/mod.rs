//! Side-effecting adapters: config, processes, host inspection, git, packages, run log.

pub mod config;
pub mod git;
pub mod host;
pub mod packages;
pub mod process;
pub mod run_log;
