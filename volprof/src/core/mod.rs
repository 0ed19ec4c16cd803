//! Pure logic for profile runs: naming, parsing, outcomes. No I/O.

pub mod lsb_release;
pub mod profile_name;
pub mod report;
pub mod template;
pub mod types;
