//! Volatility Linux profile builder.
//!
//! Installs what the build needs, compiles the module stub against the running
//! kernel's headers and zips `module.dwarf` with the kernel's System.map. Exit
//! codes are listed in [`volprof::exit_codes`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use volprof::context::{ExecContext, RunOptions};
use volprof::core::profile_name::{NameParts, render_profile_name};
use volprof::exit_codes;
use volprof::io::config::{DEFAULT_CONFIG_FILE, ProfilerConfig, load_config, to_toml};
use volprof::io::host::detect_host_facts;
use volprof::io::process::SystemRunner;
use volprof::io::run_log::RunLog;
use volprof::logging;
use volprof::pipeline::run_pipeline;

#[derive(Parser)]
#[command(
    name = "volprof",
    version,
    about = "Build a Volatility Linux profile for the running kernel"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    // Bare `volprof` form; `volprof build` takes the same flags.
    #[command(flatten)]
    build: BuildArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// Config file; a missing file means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Build for this kernel release instead of `uname -r`.
    #[arg(long, global = true)]
    kernel_version: Option<String>,

    /// Write the profile zip here instead of the repository overlay directory.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Base for relative paths: clone, run log, lsb-release (default: current directory).
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Diagnostic verbosity on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BuildArgs {
    /// Stop at the first warning (system map or module build failure).
    #[arg(long)]
    strict: bool,

    /// Use an existing clone instead of failing.
    #[arg(long)]
    reuse_clone: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

impl BuildArgs {
    fn merge(self, other: BuildArgs) -> BuildArgs {
        BuildArgs {
            strict: self.strict || other.strict,
            reuse_clone: self.reuse_clone || other.reuse_clone,
            json: self.json || other.json,
        }
    }

    fn flag_names(self) -> Vec<&'static str> {
        [
            (self.strict, "--strict"),
            (self.reuse_clone, "--reuse-clone"),
            (self.json, "--json"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the full pipeline (the default).
    Build(BuildArgs),
    /// Print the profile filename for this host.
    Name,
    /// Print the effective configuration as TOML.
    Config,
}

fn main() {
    let cli = Cli::parse();
    if let Some(message) = misplaced_flags(&cli) {
        Cli::command()
            .error(ErrorKind::ArgumentConflict, message)
            .exit();
    }
    logging::init(cli.global.verbose);
    std::process::exit(run(cli));
}

/// Flags the chosen subcommand would ignore.
fn misplaced_flags(cli: &Cli) -> Option<String> {
    let subcommand = match cli.command {
        None | Some(Command::Build(_)) => return None,
        Some(Command::Name) => "name",
        Some(Command::Config) => "config",
    };
    let mut flags = cli.build.flag_names();
    if subcommand == "config" && cli.global.workdir.is_some() {
        flags.push("--workdir");
    }
    if flags.is_empty() {
        return None;
    }
    Some(format!(
        "{} only apply to build, not `{subcommand}`",
        flags.join(", ")
    ))
}

fn run(cli: Cli) -> i32 {
    let config = match effective_config(&cli.global) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("volprof: invalid configuration: {err:#}");
            return exit_codes::CONFIG;
        }
    };

    let workdir = cli.global.workdir.as_deref();
    let result = match cli.command.unwrap_or(Command::Build(BuildArgs::default())) {
        Command::Build(args) => resolve_workdir(workdir)
            .and_then(|workdir| cmd_build(&config, &workdir, cli.build.merge(args))),
        Command::Name => resolve_workdir(workdir).and_then(|workdir| cmd_name(&config, &workdir)),
        Command::Config => cmd_config(&config),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("volprof: {err:#}");
            exit_codes::INTERNAL
        }
    }
}

/// Config file plus CLI overrides.
fn effective_config(args: &GlobalArgs) -> Result<ProfilerConfig> {
    let mut config = load_config(&args.config)?;
    if let Some(kernel) = &args.kernel_version {
        config.kernel_version = Some(kernel.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn resolve_workdir(arg: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    Ok(match arg {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => cwd.join(dir),
        None => cwd,
    })
}

fn system_runner(config: &ProfilerConfig) -> SystemRunner {
    SystemRunner::new(
        Duration::from_secs(config.command_timeout_secs),
        config.output_limit_bytes,
    )
}

fn cmd_build(config: &ProfilerConfig, workdir: &Path, args: BuildArgs) -> Result<i32> {
    let runner = system_runner(config);
    let log_path = config.resolve(workdir, &config.log_file);
    let log = RunLog::open(&log_path)?;
    let options = RunOptions {
        strict: args.strict,
        reuse_clone: args.reuse_clone,
    };

    let mut ctx = ExecContext::new(config, &runner, workdir, options, log);
    let report = run_pipeline(&mut ctx);

    if args.json {
        let payload = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{payload}");
    } else {
        print!("{}", report.render_text());
        eprintln!("log: {}", log_path.display());
    }
    Ok(report.exit_code())
}

fn cmd_name(config: &ProfilerConfig, workdir: &Path) -> Result<i32> {
    let runner = system_runner(config);
    let facts = match detect_host_facts(&runner, config, workdir) {
        Ok(facts) => facts,
        Err(err) => {
            eprintln!("volprof: {err:#}");
            return Ok(exit_codes::HOST_FACTS);
        }
    };
    let name = render_profile_name(
        &config.profile_name_template,
        &NameParts {
            hostname: &facts.hostname,
            os_description: &facts.os_description,
            kernel: &facts.kernel_release,
            arch: &facts.arch,
        },
    )?;
    println!("{name}");
    Ok(exit_codes::OK)
}

fn cmd_config(config: &ProfilerConfig) -> Result<i32> {
    print!("{}", to_toml(config)?);
    Ok(exit_codes::OK)
}
