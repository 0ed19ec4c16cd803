//! Test-only helpers: a scripted process runner and a tempdir host layout.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::io::config::ProfilerConfig;
use crate::io::process::{CommandOutput, CommandRunner, Invocation};

type Matcher = Box<dyn Fn(&Invocation) -> bool>;
type Responder = Box<dyn Fn(&Invocation) -> CommandOutput>;

struct Rule {
    matches: Matcher,
    respond: Responder,
}

/// Successful output with the given stdout.
pub fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        ..CommandOutput::default()
    }
}

/// Failed output with the given exit code and stderr.
pub fn failed_output(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stderr: stderr.as_bytes().to_vec(),
        ..CommandOutput::default()
    }
}

/// `CommandRunner` that records invocations and answers from scripted rules.
///
/// Rules added later take precedence. Unmatched invocations succeed with empty
/// output. `uname` and `id` answer as root on `5.15.0-generic`/`x86_64`/`host1`
/// unless overridden.
pub struct ScriptedRunner {
    present: HashSet<String>,
    rules: Vec<Rule>,
    calls: RefCell<Vec<Invocation>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            present: HashSet::new(),
            rules: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
        .with_host("5.15.0-generic", "x86_64", "host1", true)
    }

    /// Answer `uname -r/-m/-n` and `id -u`.
    pub fn with_host(self, kernel: &str, arch: &str, hostname: &str, root: bool) -> Self {
        let uid = if root { "0" } else { "1000" };
        self.stdout_for(&["uname", "-r"], kernel)
            .stdout_for(&["uname", "-m"], arch)
            .stdout_for(&["uname", "-n"], hostname)
            .stdout_for(&["id", "-u"], uid)
    }

    /// Mark executables as present on the search path.
    pub fn with_executables(mut self, names: &[&str]) -> Self {
        self.present.extend(names.iter().map(|name| name.to_string()));
        self
    }

    /// Add a rule. Later rules win.
    pub fn respond(
        mut self,
        matches: impl Fn(&Invocation) -> bool + 'static,
        respond: impl Fn(&Invocation) -> CommandOutput + 'static,
    ) -> Self {
        self.rules.push(Rule {
            matches: Box::new(matches),
            respond: Box::new(respond),
        });
        self
    }

    /// Answer an exact argv (ignoring elevation) with stdout.
    pub fn stdout_for(self, argv: &[&str], stdout: &str) -> Self {
        let argv: Vec<String> = argv.iter().map(|arg| arg.to_string()).collect();
        let stdout = stdout.to_string();
        self.respond(
            move |inv| argv_of(inv) == argv,
            move |_| ok_output(&format!("{stdout}\n")),
        )
    }

    /// Make every invocation of `program` fail with `code`.
    pub fn fail(self, program: &str, code: i32) -> Self {
        let program = program.to_string();
        let stderr = format!("{program}: scripted failure");
        self.respond(
            move |inv| runs(inv, &program),
            move |_| failed_output(code, &stderr),
        )
    }

    /// Run a side effect for every invocation of `program`, then succeed.
    pub fn on(self, program: &str, effect: impl Fn(&Invocation) + 'static) -> Self {
        let program = program.to_string();
        self.respond(
            move |inv| runs(inv, &program),
            move |inv| {
                effect(inv);
                ok_output("")
            },
        )
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn count_matching(&self, pred: impl Fn(&Invocation) -> bool) -> usize {
        self.calls.borrow().iter().filter(|inv| pred(inv)).count()
    }

    /// Index of the first recorded invocation matching `pred`.
    pub fn position(&self, pred: impl Fn(&Invocation) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(|inv| pred(inv))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(invocation.clone());
        let output = self
            .rules
            .iter()
            .rev()
            .find(|rule| (rule.matches)(invocation))
            .map(|rule| (rule.respond)(invocation))
            .unwrap_or_else(|| ok_output(""));
        Ok(output)
    }

    fn executable_exists(&self, name: &str) -> bool {
        self.present.contains(name)
    }
}

/// True if `inv` runs `program`, directly or behind `sudo`.
pub fn runs(inv: &Invocation, program: &str) -> bool {
    argv_of(inv).first().map(String::as_str) == Some(program)
}

/// Program and args with a leading `sudo` removed.
pub fn argv_of(inv: &Invocation) -> Vec<String> {
    let mut argv = vec![inv.program.clone()];
    argv.extend(inv.args.iter().cloned());
    if argv.first().map(String::as_str) == Some("sudo") {
        argv.remove(0);
    }
    argv
}

/// Tempdir laid out like a Debian host: `boot/`, `lib/modules/`, `etc/lsb-release`
/// and a working directory.
pub struct TestHost {
    temp: TempDir,
}

impl TestHost {
    pub const KERNEL: &'static str = "5.15.0-generic";

    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let host = Self { temp };
        for dir in [host.boot_dir(), host.modules_dir(), host.workdir()] {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        host.write_lsb_release("\"Ubuntu 22.04\"")?;
        Ok(host)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn workdir(&self) -> PathBuf {
        self.root().join("work")
    }

    pub fn boot_dir(&self) -> PathBuf {
        self.root().join("boot")
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.root().join("lib").join("modules")
    }

    pub fn lsb_release_path(&self) -> PathBuf {
        self.root().join("etc").join("lsb-release")
    }

    pub fn system_map_path(&self) -> PathBuf {
        self.boot_dir().join(format!("System.map-{}", Self::KERNEL))
    }

    pub fn kernel_image_path(&self) -> PathBuf {
        self.boot_dir().join(format!("vmlinuz-{}", Self::KERNEL))
    }

    pub fn headers_dir(&self) -> PathBuf {
        self.modules_dir().join(Self::KERNEL).join("build")
    }

    pub fn clone_dir(&self) -> PathBuf {
        self.workdir().join("volatility")
    }

    pub fn log_path(&self) -> PathBuf {
        self.workdir().join("create_volatility_profile.log")
    }

    pub fn write_lsb_release(&self, description: &str) -> Result<()> {
        let path = self.lsb_release_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = format!("DISTRIB_ID=Ubuntu\nDISTRIB_DESCRIPTION={description}\n");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn write_system_map(&self) -> Result<()> {
        let path = self.system_map_path();
        fs::write(&path, "ffffffff81000000 T _text\n")
            .with_context(|| format!("write {}", path.display()))
    }

    pub fn write_kernel_image(&self) -> Result<()> {
        let path = self.kernel_image_path();
        fs::write(&path, b"\x1f\x8b compressed kernel")
            .with_context(|| format!("write {}", path.display()))
    }

    pub fn create_headers_dir(&self) -> Result<()> {
        let dir = self.headers_dir();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))
    }

    /// Config pointing every path into this tempdir, running without elevation.
    pub fn config(&self) -> ProfilerConfig {
        ProfilerConfig {
            lsb_release_path: self.lsb_release_path(),
            boot_dir: self.boot_dir(),
            modules_dir: self.modules_dir(),
            elevate: Vec::new(),
            ..ProfilerConfig::default()
        }
    }

    /// Runner whose `git clone`, `make`, `zip` and `tee` touch the filesystem
    /// the way the real tools would.
    pub fn simulated_runner(&self) -> ScriptedRunner {
        ScriptedRunner::new()
            .on("git", simulate_git)
            .on("make", simulate_make)
            .on("zip", simulate_zip)
            .on("tee", simulate_tee)
    }
}

/// `git clone ... <dest>` creates the destination with the module stub directory.
pub fn simulate_git(inv: &Invocation) {
    if inv.args.iter().any(|arg| arg == "clone")
        && let Some(dest) = inv.args.last()
    {
        let _ = fs::create_dir_all(Path::new(dest).join("tools").join("linux"));
    }
}

/// `make` writes `module.dwarf` into its working directory.
pub fn simulate_make(inv: &Invocation) {
    if let Some(dir) = &inv.cwd {
        let _ = fs::write(dir.join("module.dwarf"), "<debug info>");
    }
}

/// `zip -j <out> <inputs...>` writes the archive.
pub fn simulate_zip(inv: &Invocation) {
    let Some(pos) = inv.args.iter().position(|arg| arg == "-j") else {
        return;
    };
    let mut rest = inv.args[pos + 1..].iter();
    if let Some(out) = rest.next() {
        let listing: Vec<&str> = rest.map(String::as_str).collect();
        let _ = fs::write(out, format!("PK {}", listing.join(" ")));
    }
}

/// `tee <path>` copies stdin to the path.
pub fn simulate_tee(inv: &Invocation) {
    if let (Some(path), Some(input)) = (inv.args.last(), &inv.stdin) {
        let _ = fs::write(path, input);
    }
}
