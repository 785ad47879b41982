//! `tbv` CLI entrypoint.
//!
//! Loads settings, runs the requested pipeline, and prints the step table.
//! Exits with 0 when the run passes and 1 otherwise.

use camino::Utf8Path;
use clap::Parser;
use std::io::Write;
use tbv::cli::{Cli, Command};
use tbv::config::{self, Settings, SystemConfigDirs};
use tbv::deadline::Deadline;
use tbv::engine::{LogObserver, Report};
use tbv::error::Result;
use tbv::exec::SystemCommandExecutor;
use tbv::local_test::{LocalTester, target_dir};
use tbv::output::{format_human, format_json};
use tbv::progress::StepKey;
use tbv::registry::http::UreqHttpClient;
use tbv::verify::{Collaborators, Verifier};

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    if let Err(err) = tbv::logging::init(cli.verbosity) {
        write_stderr_line(&mut stderr, err);
    }
    let mut stdout = std::io::stdout();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Runs the selected command and reports whether it passed.
fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<bool> {
    let cwd = target_dir(None)?;
    let settings = load_settings(cli, &cwd)?;
    let deadline = Deadline::from_secs(settings.timeout_secs);
    let executor = SystemCommandExecutor::new(deadline.clone());

    match &cli.command {
        Command::Verify(args) => {
            let http = UreqHttpClient::new(deadline.clone(), settings.http_timeout());
            let verifier = Verifier::new(
                Collaborators {
                    executor: &executor,
                    http: &http,
                    deadline: &deadline,
                },
                &settings,
            );
            let report = verifier.verify(&args.package, &mut LogObserver);
            print_report(stdout, &report, cli.json)
        }
        Command::Test(args) => {
            let dir = target_dir(args.dir.as_deref())?;
            let tester = LocalTester::new(&executor, &deadline, &settings);
            let report = tester.run(&dir, &mut LogObserver);
            print_report(stdout, &report, cli.json)
        }
    }
}

fn load_settings(cli: &Cli, cwd: &Utf8Path) -> Result<Settings> {
    let mut settings = config::load(cli.config.as_deref(), cwd, &SystemConfigDirs)?;
    cli.apply_to(&mut settings);
    Ok(settings)
}

fn print_report<K: StepKey>(stdout: &mut dyn Write, report: &Report<K>, json: bool) -> Result<bool> {
    if json {
        writeln!(stdout, "{}", format_json(report))?;
    } else {
        write!(stdout, "{}", format_human(report))?;
    }
    Ok(report.success)
}

fn exit_code_for_run_result(result: Result<bool>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
