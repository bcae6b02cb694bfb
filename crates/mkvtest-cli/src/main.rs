//! mkvtest - MKVToolNix regression test runner
//!
//! Runs the registered test cases against the toolkit binaries, compares
//! each case's fingerprint with the baseline recorded in `results.txt` and
//! exits non-zero when any case failed.
//!
//! ## Selecting tests
//!
//! - `NNN`: a single test number
//! - `NNN-MMM`: an inclusive range of numbers
//! - `/re/`: test names matching `re` (case-insensitive)
//!
//! Without selectors every registered test runs. `--failed` and `--new`
//! narrow the selection further.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use mkvtest_core::{
    init_tracing, parse_date, render_summary, write_run_report, Controller, HarnessEnv,
    ResultsStore, RunReport, RunRequest, Selector,
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "mkvtest")]
#[command(author = "MKVToolNix test maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Regression tests for the MKVToolNix command-line tools", long_about = None)]
struct Cli {
    /// Only run tests whose last result was a failure
    #[arg(short = 'f', long)]
    failed: bool,

    /// Only run tests without a recorded result
    #[arg(short = 'n', long)]
    new: bool,

    /// Replace the recorded fingerprint of failing tests
    #[arg(short = 'u', long)]
    update_failed: bool,

    /// Record how long each test took
    #[arg(short = 'r', long)]
    record_duration: bool,

    /// Number of tests to run in parallel (default: number of CPUs)
    #[arg(short = 'j', long)]
    jobs: Option<NonZeroUsize>,

    /// Only run tests added at or after this date (YYYYMMDDHHMM)
    #[arg(short = 'd', long = "date-after", value_parser = parse_date)]
    date_after: Option<NaiveDateTime>,

    /// Only run tests added at or before this date (YYYYMMDDHHMM)
    #[arg(short = 'D', long = "date-before", value_parser = parse_date)]
    date_before: Option<NaiveDateTime>,

    /// List the tests recorded as failed and exit
    #[arg(short = 'F', long)]
    list_failed: bool,

    /// Tests to run: NNN, NNN-MMM or /regex/
    #[arg(value_name = "TEST")]
    selectors: Vec<Selector>,

    /// Results file holding the recorded fingerprints
    #[arg(long, env = "MKVTEST_RESULTS", default_value = "results.txt")]
    results: PathBuf,

    /// Directory containing the toolkit binaries
    #[arg(long, env = "MKVTEST_TOOL_DIR", default_value = "../src")]
    tool_dir: PathBuf,

    /// Directory the tests run in; test data paths resolve against it
    #[arg(long, env = "MKVTEST_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Directory for temporary files (default: system temp dir)
    #[arg(long, env = "MKVTEST_TMP_DIR")]
    tmp_dir: Option<PathBuf>,

    /// Per-command timeout in seconds; 0 waits forever
    #[arg(long, env = "MKVTEST_TIMEOUT", default_value_t = mkvtest_core::env::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Write a JSON run report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// JSON schema for mkvmerge's identification output
    #[arg(long, env = "MKVTEST_IDENTIFICATION_SCHEMA")]
    schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn jobs(&self) -> usize {
        self.jobs
            .map(NonZeroUsize::get)
            .unwrap_or_else(mkvtest_core::selection::default_jobs)
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            selectors: self.selectors.clone(),
            only_failed: self.failed,
            only_new: self.new,
            update_failed: self.update_failed,
            record_duration: self.record_duration,
            date_after: self.date_after,
            date_before: self.date_before,
            jobs: self.jobs(),
        }
    }

    fn harness_env(&self) -> HarnessEnv {
        let mut env = HarnessEnv::from_process_env()
            .with_tool_dir(&self.tool_dir)
            .with_work_dir(&self.work_dir)
            .with_timeout_secs(self.timeout);
        if let Some(dir) = &self.tmp_dir {
            env = env.with_tmp_dir(dir);
        }
        if let Some(schema) = &self.schema {
            env = env.with_schema_path(schema);
        }
        env
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, mkvtest_core::telemetry::level_for(cli.verbose));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.jobs())
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let code = runtime.block_on(run(&cli))?;
    std::process::exit(code);
}

/// Run the command line and return the process exit code.
async fn run(cli: &Cli) -> Result<i32> {
    let store = ResultsStore::load(&cli.results)
        .with_context(|| format!("Failed to load {}", cli.results.display()))?;

    if cli.list_failed {
        for name in store.failed() {
            println!("{name}");
        }
        return Ok(0);
    }

    let registry = mkvtest_suite::builtin().context("Invalid built-in test registry")?;
    let env = cli.harness_env();
    info!(
        tool_dir = %env.tool_dir.display(),
        results = %cli.results.display(),
        registered = registry.len(),
        "starting mkvtest"
    );

    let request = cli.request();
    debug!(?request, "run request");

    let mut controller = Controller::new(registry, env, store).with_progress(true);
    let summary = controller.run(&request).await?;
    print!("{}", render_summary(&summary));

    if let Some(path) = &cli.report {
        write_run_report(path, &RunReport::new(&summary, &cli.results))?;
        info!(path = %path.display(), "run report written");
    }

    Ok(summary.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["mkvtest"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_map_onto_the_run_request() {
        let cli = parse(&["-f", "-n", "-u", "-r", "-j3", "014", "100-120", "/tags/"]);
        let request = cli.request();

        assert!(request.only_failed && request.only_new);
        assert!(request.update_failed && request.record_duration);
        assert_eq!(request.jobs, 3);
        assert_eq!(
            request.selectors,
            vec![
                Selector::Single(14),
                Selector::Range { from: 100, to: 120 },
                Selector::Pattern("tags".to_string()),
            ]
        );
    }

    #[test]
    fn date_bounds_accept_both_forms() {
        let cli = parse(&["-d", "202401020304", "-D", "20240506-0708"]);
        assert_eq!(
            cli.date_after.unwrap().to_string(),
            "2024-01-02 03:04:00"
        );
        assert_eq!(
            cli.date_before.unwrap().to_string(),
            "2024-05-06 07:08:00"
        );
    }

    #[test]
    fn bad_arguments_are_rejected() {
        for args in [
            vec!["mkvtest", "bogus"],
            vec!["mkvtest", "12"],
            vec!["mkvtest", "020-010"],
            vec!["mkvtest", "-d", "2024"],
            vec!["mkvtest", "-j", "0"],
            vec!["mkvtest", "--no-such-flag"],
        ] {
            assert!(Cli::try_parse_from(args.iter().copied()).is_err(), "{args:?} accepted");
        }
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert!(cli.selectors.is_empty());
        assert!(!cli.list_failed);
        assert!(cli.jobs() >= 1);
        let env = cli.harness_env();
        assert_eq!(env.timeout_secs, cli.timeout);
        assert_eq!(env.tool_dir, cli.tool_dir);
        assert_eq!(env.work_dir, PathBuf::from("."));
    }

    #[test]
    fn work_dir_reaches_the_harness_env() {
        let cli = parse(&["--work-dir", "/src/mkvtoolnix/tests"]);
        assert_eq!(
            cli.harness_env().work_dir,
            PathBuf::from("/src/mkvtoolnix/tests")
        );
    }

    #[tokio::test]
    async fn list_failed_runs_nothing_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.txt");
        std::fs::write(
            &results,
            "T_014splitting_by_size:abc:failed:20240101-120000:3\n\
             T_047X_tags:def:passed:20240101-120000:1\n",
        )
        .unwrap();

        let cli = parse(&["-F", "--results", results.to_str().unwrap()]);
        assert_eq!(run(&cli).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_test_number_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.txt");
        let cli = parse(&[
            "--results",
            results.to_str().unwrap(),
            "--tmp-dir",
            dir.path().to_str().unwrap(),
            "999",
        ]);

        let err = run(&cli).await.unwrap_err();
        assert!(err.to_string().contains("999"), "{err:#}");
        assert!(!results.exists());
    }
}
