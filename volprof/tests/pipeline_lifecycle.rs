//! Pipeline-level tests for full profile runs.
//!
//! These drive `run_pipeline` against a tempdir host and a scripted process
//! runner, so no package manager, network or compiler is touched. Each test
//! pins one property of the step chain: which commands run, which are skipped,
//! and how failures map to outcomes and exit codes.

use std::fs;

use chrono::DateTime;
use volprof::context::{ExecContext, RunOptions};
use volprof::core::report::PipelineReport;
use volprof::core::types::{StepId, StepOutcome};
use volprof::exit_codes;
use volprof::io::config::ProfilerConfig;
use volprof::io::run_log::RunLog;
use volprof::pipeline::run_pipeline;
use volprof::test_support::{ScriptedRunner, TestHost, argv_of, runs};

const ALL_TOOLS: &[&str] = &["git", "make", "gcc", "nm", "dwarfdump", "zip"];

fn run(
    host: &TestHost,
    config: &ProfilerConfig,
    runner: &ScriptedRunner,
    options: RunOptions,
) -> PipelineReport {
    let log = RunLog::open(&host.log_path()).expect("open run log");
    let mut ctx = ExecContext::new(config, runner, host.workdir(), options, log);
    run_pipeline(&mut ctx)
}

/// Host with headers and system map in place; every tool on PATH.
fn ready_host() -> TestHost {
    let host = TestHost::new().expect("host");
    host.create_headers_dir().expect("headers");
    host.write_system_map().expect("system map");
    host
}

fn outcome(report: &PipelineReport, step: StepId) -> &StepOutcome {
    &report
        .record(step)
        .unwrap_or_else(|| panic!("missing record for {step}"))
        .outcome
}

fn is_update(argv: &[String]) -> bool {
    argv == ["apt-get", "update"]
}

fn is_install(argv: &[String]) -> bool {
    argv.len() > 2 && argv[..3] == ["apt-get", "install", "-y"]
}

#[test]
fn happy_path_creates_profile_in_overlay_dir() {
    let host = ready_host();
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(report.exit_code(), exit_codes::OK, "{}", report.render_text());
    assert_eq!(report.steps.len(), StepId::ALL.len());
    let artifact = report.artifact.as_ref().expect("artifact");
    assert_eq!(
        artifact.path,
        host.clone_dir()
            .join("volatility/plugins/overlays/linux")
            .join("host1-Ubuntu22.04-5.15.0-generic-x86_64.zip")
    );
    assert!(artifact.path.is_file());
    assert!(artifact.size_bytes > 0);

    let zip = runner
        .calls()
        .into_iter()
        .find(|inv| runs(inv, "zip"))
        .expect("zip invoked");
    assert!(zip.args.contains(&host.system_map_path().display().to_string()));
    assert!(
        zip.args
            .iter()
            .any(|arg| arg.ends_with("tools/linux/module.dwarf"))
    );
}

#[test]
fn profile_name_strips_spaces_and_quotes() {
    let host = ready_host();
    host.write_lsb_release("\"Ubuntu 22.04\"").expect("lsb");
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(
        report.profile_name.as_deref(),
        Some("host1-Ubuntu22.04-5.15.0-generic-x86_64.zip")
    );
}

#[test]
fn present_executables_trigger_no_package_manager() {
    let host = ready_host();
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    run(&host, &config, &runner, RunOptions::default());

    assert_eq!(runner.count_matching(|inv| runs(inv, "apt-get")), 0);
}

#[test]
fn missing_executables_update_cache_exactly_once() {
    let host = ready_host();
    let config = host.config();
    let runner = host.simulated_runner();

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(runner.count_matching(|inv| is_update(&argv_of(inv))), 1);
    let installed: Vec<String> = runner
        .calls()
        .iter()
        .map(argv_of)
        .filter(|argv| is_install(argv))
        .map(|argv| argv[3].clone())
        .collect();
    assert_eq!(
        installed,
        vec!["git", "make", "build-essential", "binutils", "dwarfdump", "zip"]
    );
    assert!(matches!(
        outcome(&report, StepId::Dependencies),
        StepOutcome::Success { .. }
    ));
}

#[test]
fn cache_update_is_shared_with_headers_install() {
    let host = TestHost::new().expect("host");
    host.write_system_map().expect("system map");
    let config = host.config();
    let runner = host.simulated_runner();

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(runner.count_matching(|inv| is_update(&argv_of(inv))), 1);
    assert_eq!(
        runner.count_matching(|inv| argv_of(inv).last().map(String::as_str)
            == Some("linux-headers-5.15.0-generic")),
        1
    );
    // The scripted install does not create the directory.
    assert!(matches!(
        outcome(&report, StepId::KernelHeaders),
        StepOutcome::Warning { .. }
    ));
}

#[test]
fn existing_headers_skip_install() {
    let host = ready_host();
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(
        runner.count_matching(|inv| argv_of(inv)
            .iter()
            .any(|arg| arg.starts_with("linux-headers-"))),
        0
    );
    assert!(matches!(
        outcome(&report, StepId::KernelHeaders),
        StepOutcome::Success { .. }
    ));
}

#[test]
fn kernel_override_replaces_uname() {
    let host = TestHost::new().expect("host");
    let mut config = host.config();
    config.kernel_version = Some("6.1.0-13-amd64".to_string());
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(
        runner.count_matching(|inv| argv_of(inv) == ["uname", "-r"]),
        0
    );
    assert_eq!(
        report.profile_name.as_deref(),
        Some("host1-Ubuntu22.04-6.1.0-13-amd64-x86_64.zip")
    );
    assert_eq!(
        runner.count_matching(|inv| argv_of(inv).last().map(String::as_str)
            == Some("linux-headers-6.1.0-13-amd64")),
        1
    );
    let make = runner
        .calls()
        .into_iter()
        .find(|inv| runs(inv, "make"))
        .expect("make invoked");
    assert!(make.args.contains(&"KVER=6.1.0-13-amd64".to_string()));
}

#[test]
fn existing_system_map_never_runs_nm() {
    let host = ready_host();
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    run(&host, &config, &runner, RunOptions::default());

    assert_eq!(runner.count_matching(|inv| runs(inv, "nm")), 0);
}

#[test]
fn missing_system_map_is_generated_from_kernel_image() {
    let host = TestHost::new().expect("host");
    host.create_headers_dir().expect("headers");
    host.write_kernel_image().expect("vmlinuz");
    let config = host.config();
    let image = host.kernel_image_path().display().to_string();
    let runner = host
        .simulated_runner()
        .with_executables(ALL_TOOLS)
        .stdout_for(
            &["nm", "-n", &image],
            "ffffffff81000000 T _text\nffffffff81000010 T startup_64",
        );

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(report.exit_code(), exit_codes::OK, "{}", report.render_text());
    let map = fs::read_to_string(host.system_map_path()).expect("map written");
    assert!(map.contains("startup_64"));
    assert!(
        outcome(&report, StepId::SystemMap)
            .message()
            .contains("2 symbols")
    );
}

#[test]
fn system_map_failure_warns_and_continues() {
    let host = TestHost::new().expect("host");
    host.create_headers_dir().expect("headers");
    host.write_kernel_image().expect("vmlinuz");
    let config = host.config();
    let runner = host
        .simulated_runner()
        .with_executables(ALL_TOOLS)
        .fail("nm", 1);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert!(matches!(
        outcome(&report, StepId::SystemMap),
        StepOutcome::Warning { .. }
    ));
    assert!(runner.position(|inv| runs(inv, "make")).is_some());
    assert!(matches!(
        outcome(&report, StepId::Archive),
        StepOutcome::Warning { .. }
    ));
    assert!(report.artifact.is_some());
    assert_eq!(report.exit_code(), exit_codes::DEGRADED);
}

#[test]
fn strict_mode_stops_on_system_map_failure() {
    let host = TestHost::new().expect("host");
    host.create_headers_dir().expect("headers");
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(
        &host,
        &config,
        &runner,
        RunOptions {
            strict: true,
            ..RunOptions::default()
        },
    );

    assert_eq!(report.exit_code(), exit_codes::SYSTEM_MAP);
    assert_eq!(report.fatal_step().map(|r| r.step), Some(StepId::SystemMap));
    assert_eq!(runner.count_matching(|inv| runs(inv, "git")), 0);
    assert!(report.artifact.is_none());
}

#[test]
fn module_build_failure_warns_and_archives_map_only() {
    let host = ready_host();
    let config = host.config();
    let runner = host
        .simulated_runner()
        .with_executables(ALL_TOOLS)
        .fail("make", 2);

    let report = run(&host, &config, &runner, RunOptions::default());

    let build = outcome(&report, StepId::ModuleBuild);
    assert!(matches!(build, StepOutcome::Warning { .. }));
    assert!(build.message().contains("exit code 2"));
    let zip = runner
        .calls()
        .into_iter()
        .find(|inv| runs(inv, "zip"))
        .expect("zip invoked");
    assert!(!zip.args.iter().any(|arg| arg.ends_with("module.dwarf")));
    assert_eq!(report.exit_code(), exit_codes::DEGRADED);
}

#[test]
fn reused_clone_never_archives_stale_debug_info() {
    let host = ready_host();
    let module_dir = host.clone_dir().join("tools/linux");
    fs::create_dir_all(&module_dir).expect("clone dir");
    let stale = module_dir.join("module.dwarf");
    fs::write(&stale, "<debug info from another kernel>").expect("stale dwarf");
    let config = host.config();
    let runner = host
        .simulated_runner()
        .with_executables(ALL_TOOLS)
        .fail("make", 2);

    let report = run(
        &host,
        &config,
        &runner,
        RunOptions {
            reuse_clone: true,
            ..RunOptions::default()
        },
    );

    assert!(!stale.exists());
    let zip = runner
        .calls()
        .into_iter()
        .find(|inv| runs(inv, "zip"))
        .expect("zip invoked");
    assert!(!zip.args.iter().any(|arg| arg.ends_with("module.dwarf")));
    assert!(matches!(
        outcome(&report, StepId::Archive),
        StepOutcome::Warning { .. }
    ));
    assert_eq!(report.exit_code(), exit_codes::DEGRADED);
    let log = fs::read_to_string(host.log_path()).expect("log");
    assert!(log.contains("removed stale"), "{log}");
}

#[test]
fn reused_clone_rebuilds_debug_info() {
    let host = ready_host();
    let module_dir = host.clone_dir().join("tools/linux");
    fs::create_dir_all(&module_dir).expect("clone dir");
    fs::write(module_dir.join("module.dwarf"), "old").expect("stale dwarf");
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(
        &host,
        &config,
        &runner,
        RunOptions {
            reuse_clone: true,
            ..RunOptions::default()
        },
    );

    assert_eq!(report.exit_code(), exit_codes::OK, "{}", report.render_text());
    assert_eq!(
        fs::read_to_string(module_dir.join("module.dwarf")).expect("dwarf"),
        "<debug info>"
    );
}

#[test]
fn strict_mode_stops_on_module_build_failure() {
    let host = ready_host();
    let config = host.config();
    let runner = host
        .simulated_runner()
        .with_executables(ALL_TOOLS)
        .fail("make", 2);

    let report = run(
        &host,
        &config,
        &runner,
        RunOptions {
            strict: true,
            ..RunOptions::default()
        },
    );

    assert_eq!(report.exit_code(), exit_codes::MODULE_BUILD);
    assert_eq!(runner.count_matching(|inv| runs(inv, "zip")), 0);
}

#[test]
fn clone_failure_stops_before_build() {
    let host = ready_host();
    let config = host.config();
    let runner = host
        .simulated_runner()
        .with_executables(ALL_TOOLS)
        .fail("git", 128);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(report.exit_code(), exit_codes::REPOSITORY);
    assert_eq!(report.fatal_step().map(|r| r.step), Some(StepId::Repository));
    assert!(report.record(StepId::ModuleBuild).is_none());
    assert_eq!(runner.count_matching(|inv| runs(inv, "make")), 0);
    assert_eq!(runner.count_matching(|inv| runs(inv, "zip")), 0);
    assert!(
        outcome(&report, StepId::Repository)
            .message()
            .contains("exit code 128")
    );
}

#[test]
fn existing_clone_is_fatal_unless_reused() {
    let host = ready_host();
    fs::create_dir_all(host.clone_dir().join("tools/linux")).expect("clone dir");
    let config = host.config();

    let runner = host.simulated_runner().with_executables(ALL_TOOLS);
    let report = run(&host, &config, &runner, RunOptions::default());
    assert_eq!(report.exit_code(), exit_codes::REPOSITORY);
    assert!(
        outcome(&report, StepId::Repository)
            .message()
            .contains("--reuse-clone")
    );
    assert_eq!(runner.count_matching(|inv| runs(inv, "git")), 0);

    let runner = host.simulated_runner().with_executables(ALL_TOOLS);
    let report = run(
        &host,
        &config,
        &runner,
        RunOptions {
            reuse_clone: true,
            ..RunOptions::default()
        },
    );
    assert!(matches!(
        outcome(&report, StepId::Repository),
        StepOutcome::Skipped { .. }
    ));
    assert_eq!(report.exit_code(), exit_codes::OK, "{}", report.render_text());
}

#[test]
fn package_install_failure_is_fatal() {
    let host = ready_host();
    let config = host.config();
    let runner = host.simulated_runner().fail("apt-get", 100);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(report.exit_code(), exit_codes::DEPENDENCIES);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(runner.count_matching(|inv| runs(inv, "git")), 0);
}

#[test]
fn missing_lsb_release_fails_host_facts() {
    let host = ready_host();
    fs::remove_file(host.lsb_release_path()).expect("remove lsb-release");
    let config = host.config();
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(report.exit_code(), exit_codes::HOST_FACTS);
    assert_eq!(report.steps.len(), 1);
    assert!(report.profile_name.is_none());
}

#[test]
fn non_root_elevates_privileged_commands_only() {
    let host = ready_host();
    let mut config = host.config();
    config.elevate = vec!["sudo".to_string()];
    let runner = host
        .simulated_runner()
        .with_host(TestHost::KERNEL, "x86_64", "host1", false);

    let report = run(&host, &config, &runner, RunOptions::default());

    assert_eq!(report.exit_code(), exit_codes::OK, "{}", report.render_text());
    let calls = runner.calls();
    let zip = calls.iter().find(|inv| runs(inv, "zip")).expect("zip");
    assert_eq!(zip.program, "sudo");
    let update = calls
        .iter()
        .find(|inv| is_update(&argv_of(inv)))
        .expect("update");
    assert_eq!(update.program, "sudo");
    let make = calls.iter().find(|inv| runs(inv, "make")).expect("make");
    assert_eq!(make.program, "make");
    let clone = calls.iter().find(|inv| runs(inv, "git")).expect("git");
    assert_eq!(clone.program, "git");
}

#[test]
fn output_dir_override_places_profile() {
    let host = ready_host();
    let mut config = host.config();
    let out = host.root().join("profiles");
    config.output_dir = Some(out.clone());
    let runner = host.simulated_runner().with_executables(ALL_TOOLS);

    let report = run(&host, &config, &runner, RunOptions::default());

    let artifact = report.artifact.expect("artifact");
    assert_eq!(artifact.path.parent(), Some(out.as_path()));
    assert!(artifact.path.is_file());
}

#[test]
fn rerun_appends_timestamped_log_lines() {
    let host = ready_host();
    let config = host.config();

    let runner = host.simulated_runner().with_executables(ALL_TOOLS);
    run(&host, &config, &runner, RunOptions::default());
    let first = fs::read_to_string(host.log_path()).expect("log");

    let runner = host.simulated_runner().with_executables(ALL_TOOLS);
    run(
        &host,
        &config,
        &runner,
        RunOptions {
            reuse_clone: true,
            ..RunOptions::default()
        },
    );
    let second = fs::read_to_string(host.log_path()).expect("log");

    assert!(second.starts_with(&first));
    assert!(second.len() > first.len());
    assert_eq!(second.matches("starting volatility profile run").count(), 2);
    for line in second.lines() {
        let (stamp, message) = line
            .strip_prefix('[')
            .and_then(|rest| rest.split_once("]: "))
            .expect("line format");
        DateTime::parse_from_rfc3339(stamp).expect("rfc3339 timestamp");
        assert!(!message.is_empty());
    }
}
