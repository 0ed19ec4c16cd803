//! Host facts: which kernel, architecture, OS and machine we are profiling.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::lsb_release::distrib_description;
use crate::io::config::ProfilerConfig;
use crate::io::process::{CommandRunner, Invocation, run_checked};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFacts {
    /// Target kernel release; the configured override or `uname -r`.
    pub kernel_release: String,
    /// `uname -m`.
    pub arch: String,
    /// `DISTRIB_DESCRIPTION` from the lsb-release file, unquoted.
    pub os_description: String,
    /// `uname -n`.
    pub hostname: String,
    /// Effective uid is 0, so privileged commands need no elevation prefix.
    pub is_root: bool,
}

#[instrument(skip_all)]
pub fn detect_host_facts<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &ProfilerConfig,
    workdir: &Path,
) -> Result<HostFacts> {
    let kernel_release = match &config.kernel_version {
        Some(version) => {
            debug!(kernel = %version, "using configured kernel version");
            version.trim().to_string()
        }
        None => uname(runner, "-r").context("resolve kernel release")?,
    };
    let arch = uname(runner, "-m").context("resolve architecture")?;
    let hostname = uname(runner, "-n").context("resolve hostname")?;

    let lsb_path = config.resolve(workdir, &config.lsb_release_path);
    let lsb = fs::read_to_string(&lsb_path)
        .with_context(|| format!("read {}", lsb_path.display()))?;
    let os_description = distrib_description(&lsb)
        .with_context(|| format!("parse {}", lsb_path.display()))?;

    let uid = capture(runner, Invocation::new("id").arg("-u")).context("resolve effective uid")?;
    let is_root = uid == "0";

    let facts = HostFacts {
        kernel_release,
        arch,
        os_description,
        hostname,
        is_root,
    };
    debug!(?facts, "host facts resolved");
    Ok(facts)
}

fn uname<R: CommandRunner + ?Sized>(runner: &R, flag: &str) -> Result<String> {
    capture(runner, Invocation::new("uname").arg(flag))
}

fn capture<R: CommandRunner + ?Sized>(runner: &R, invocation: Invocation) -> Result<String> {
    let output = run_checked(runner, &invocation)?;
    let value = output.stdout_text().trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("{invocation} printed nothing"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedRunner, argv_of};

    #[test]
    fn relative_lsb_release_resolves_against_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("etc")).expect("etc");
        fs::write(
            temp.path().join("etc/lsb-release"),
            "DISTRIB_DESCRIPTION=\"Debian GNU/Linux 12\"\n",
        )
        .expect("write");
        let config = ProfilerConfig {
            lsb_release_path: "etc/lsb-release".into(),
            ..ProfilerConfig::default()
        };

        let facts =
            detect_host_facts(&ScriptedRunner::new(), &config, temp.path()).expect("facts");
        assert_eq!(facts.os_description, "Debian GNU/Linux 12");
        assert_eq!(facts.hostname, "host1");
        assert!(facts.is_root);
    }

    #[test]
    fn kernel_override_skips_uname_r() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("lsb"), "DISTRIB_DESCRIPTION=Arch\n").expect("write");
        let config = ProfilerConfig {
            kernel_version: Some("6.1.0-13-amd64".to_string()),
            lsb_release_path: temp.path().join("lsb"),
            ..ProfilerConfig::default()
        };
        let runner = ScriptedRunner::new().with_host("ignored", "aarch64", "box", false);

        let facts = detect_host_facts(&runner, &config, temp.path()).expect("facts");
        assert_eq!(facts.kernel_release, "6.1.0-13-amd64");
        assert_eq!(facts.arch, "aarch64");
        assert!(!facts.is_root);
        assert_eq!(runner.count_matching(|inv| argv_of(inv) == ["uname", "-r"]), 0);
    }
}
