//! Profile run configuration loaded from `volprof.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::profile_name::{NameParts, render_profile_name};
use crate::core::template::render_kernel_template;

pub const DEFAULT_CONFIG_FILE: &str = "volprof.toml";
pub const DEFAULT_LOG_FILE: &str = "create_volatility_profile.log";
pub const DEFAULT_PROFILE_TEMPLATE: &str = "{{ hostname }}-{{ os }}-{{ kernel }}-{{ arch }}.zip";

/// Profile run configuration (TOML).
///
/// Every path and package name the run touches lives here so the tool can be
/// pointed at other apt-family hosts without code changes. Missing fields
/// default to the Debian/Ubuntu layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Build for this kernel release instead of `uname -r`.
    pub kernel_version: Option<String>,

    /// Write the profile zip here instead of the repository overlay directory.
    pub output_dir: Option<PathBuf>,

    /// Append-only run log, relative to the working directory.
    pub log_file: PathBuf,

    pub lsb_release_path: PathBuf,
    pub boot_dir: PathBuf,
    pub modules_dir: PathBuf,

    /// minijinja template; variables: `hostname`, `os`, `kernel`, `arch`.
    pub profile_name_template: String,

    /// Prefix for privileged commands when not running as root. Empty disables.
    pub elevate: Vec<String>,

    /// Per-command wall-clock limit.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub package_manager: PackageManagerConfig,
    pub repository: RepositoryConfig,
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageManagerConfig {
    /// Refresh the package index (run at most once per profile run).
    pub update: Vec<String>,
    /// Install command; package names are appended.
    pub install: Vec<String>,
    /// Headers package template; variable: `kernel`.
    pub headers_package: String,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            update: strings(&["apt-get", "update"]),
            install: strings(&["apt-get", "install", "-y"]),
            headers_package: "linux-headers-{{ kernel }}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub url: String,
    /// Clone destination, relative to the working directory.
    pub dest: PathBuf,
    /// Directory inside the clone holding the module stub Makefile.
    pub module_subdir: PathBuf,
    /// Directory inside the clone where Volatility looks for Linux profiles.
    pub overlay_subdir: PathBuf,
    pub make_command: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/volatilityfoundation/volatility.git".to_string(),
            dest: PathBuf::from("volatility"),
            module_subdir: PathBuf::from("tools/linux"),
            overlay_subdir: PathBuf::from("volatility/plugins/overlays/linux"),
            make_command: strings(&["make"]),
        }
    }
}

/// Required executable and the package that provides it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    pub executable: String,
    pub package: String,
}

impl Dependency {
    pub fn new(executable: &str, package: &str) -> Self {
        Self {
            executable: executable.to_string(),
            package: package.to_string(),
        }
    }
}

pub fn default_dependencies() -> Vec<Dependency> {
    vec![
        Dependency::new("git", "git"),
        Dependency::new("make", "make"),
        Dependency::new("gcc", "build-essential"),
        Dependency::new("nm", "binutils"),
        Dependency::new("dwarfdump", "dwarfdump"),
        Dependency::new("zip", "zip"),
    ]
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            kernel_version: None,
            output_dir: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            lsb_release_path: PathBuf::from("/etc/lsb-release"),
            boot_dir: PathBuf::from("/boot"),
            modules_dir: PathBuf::from("/lib/modules"),
            profile_name_template: DEFAULT_PROFILE_TEMPLATE.to_string(),
            elevate: strings(&["sudo"]),
            command_timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            package_manager: PackageManagerConfig::default(),
            repository: RepositoryConfig::default(),
            dependencies: default_dependencies(),
        }
    }
}

impl ProfilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if let Some(kernel) = &self.kernel_version
            && kernel.trim().is_empty()
        {
            return Err(anyhow!("kernel_version must not be empty when set"));
        }
        require_command("package_manager.update", &self.package_manager.update)?;
        require_command("package_manager.install", &self.package_manager.install)?;
        require_command("repository.make_command", &self.repository.make_command)?;
        if self.repository.url.trim().is_empty() {
            return Err(anyhow!("repository.url must not be empty"));
        }
        if self.repository.dest.as_os_str().is_empty() {
            return Err(anyhow!("repository.dest must not be empty"));
        }
        if self.elevate.iter().any(|part| part.trim().is_empty()) {
            return Err(anyhow!("elevate must not contain empty entries"));
        }
        for (idx, dep) in self.dependencies.iter().enumerate() {
            if dep.executable.trim().is_empty() || dep.package.trim().is_empty() {
                return Err(anyhow!(
                    "dependencies[{idx}] needs a non-empty executable and package"
                ));
            }
        }

        // Render with placeholder values so template typos fail before any side effects.
        render_kernel_template(&self.package_manager.headers_package, "0.0.0")
            .context("package_manager.headers_package")?;
        render_profile_name(
            &self.profile_name_template,
            &NameParts {
                hostname: "host",
                os_description: "os",
                kernel: "0.0.0",
                arch: "arch",
            },
        )
        .context("profile_name_template")?;
        Ok(())
    }

    /// Resolve a configured path against the working directory.
    pub fn resolve(&self, workdir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            workdir.join(path)
        }
    }
}

fn require_command(field: &str, argv: &[String]) -> Result<()> {
    if argv.is_empty() || argv[0].trim().is_empty() {
        return Err(anyhow!("{field} must be a non-empty array"));
    }
    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ProfilerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ProfilerConfig> {
    if !path.exists() {
        let cfg = ProfilerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ProfilerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Render the effective configuration as TOML.
pub fn to_toml(cfg: &ProfilerConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    Ok(buf)
}
