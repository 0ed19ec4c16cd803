//! Stable exit codes for volprof CLI commands.
//!
//! Every failure path maps to its own non-zero code so callers can tell a
//! degraded profile from an aborted run without reading the log.

/// Profile created and every step succeeded.
pub const OK: i32 = 0;
/// Unexpected error outside the pipeline (log file unusable, I/O failure).
pub const INTERNAL: i32 = 1;
/// Configuration file or CLI arguments are invalid.
pub const CONFIG: i32 = 2;
/// Kernel release, architecture, OS description or hostname could not be resolved.
pub const HOST_FACTS: i32 = 3;
/// Package cache update or dependency install failed.
pub const DEPENDENCIES: i32 = 4;
/// Kernel headers package install failed.
pub const KERNEL_HEADERS: i32 = 5;
/// System map missing and could not be generated (strict mode only).
pub const SYSTEM_MAP: i32 = 6;
/// Repository clone failed or its destination already exists.
pub const REPOSITORY: i32 = 7;
/// Kernel module build did not produce debug info (strict mode only).
pub const MODULE_BUILD: i32 = 8;
/// Zip archive could not be created.
pub const ARCHIVE: i32 = 9;
/// Profile created, but one or more steps recorded warnings.
pub const DEGRADED: i32 = 10;
