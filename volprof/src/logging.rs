//! Diagnostic tracing for volprof.
//!
//! Two log streams exist and they do not mix:
//!
//! - **Tracing (this module)**: developer diagnostics on stderr, filtered by
//!   `RUST_LOG` or the `-v` flag. Never persisted.
//! - **Run log ([`crate::io::run_log`])**: the operator-facing record of a
//!   profile run, appended to `create_volatility_profile.log`. Always written.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map `-v` repetitions to a default filter directive.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "volprof=info",
        2 => "volprof=debug",
        _ => "volprof=trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `verbosity` when set.
///
/// ```bash
/// RUST_LOG=volprof::io::process=debug volprof build
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .compact(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "volprof=info");
        assert_eq!(default_directive(2), "volprof=debug");
        assert_eq!(default_directive(9), "volprof=trace");
    }
}
