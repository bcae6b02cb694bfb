//! Scheduler/controller: selects the cases to run, drives them on a bounded
//! worker pool and folds their outcomes into the results store.
//!
//! Phases: `Idle → Selecting → Scheduled → Running → Aggregating → Done`.
//! Workers share nothing but the work queue, the mutex-guarded store and the
//! tally counters. Every case runs in its own task so a panic is confined to
//! that case.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::case::{panic_message, CompositeSignature};
use crate::context::CaseContext;
use crate::env::HarnessEnv;
use crate::error::{CaseError, CaseResult, ControllerError};
use crate::id::TestIdentifier;
use crate::obs;
use crate::registry::Registry;
use crate::selection::RunRequest;
use crate::store::{RecordUpdate, ResultsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Selecting,
    Scheduled,
    Running,
    Aggregating,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Selecting => "selecting",
            Phase::Scheduled => "scheduled",
            Phase::Running => "running",
            Phase::Aggregating => "aggregating",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Result of comparing one case run against its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Signature equals the baseline.
    Passed,
    /// No baseline yet; the signature becomes the baseline.
    New,
    /// Signature differs from the baseline.
    Regression,
    /// The case could not produce a trustworthy signature.
    Fault,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Regression | Outcome::Fault)
    }

    /// Status word printed next to the case name.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::New => "NEW",
            Outcome::Regression => "FAILED",
            Outcome::Fault => "FAULT",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a run. A case whose sub-tests faulted is a fault whether or not
/// it has a baseline, so its partial signature is never stored.
pub fn classify(baseline: Option<&str>, result: &CaseResult<CompositeSignature>) -> Outcome {
    match (result, baseline) {
        (Err(_), _) => Outcome::Fault,
        (Ok(sig), _) if sig.faults().next().is_some() => Outcome::Fault,
        (Ok(_), None) => Outcome::New,
        (Ok(sig), Some(baseline)) if sig.as_str() == baseline => Outcome::Passed,
        (Ok(_), Some(_)) => Outcome::Regression,
    }
}

/// Store policy flags of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdatePolicy {
    pub update_failed: bool,
    pub record_duration: bool,
}

impl UpdatePolicy {
    /// How the store reacts to `outcome`.
    pub fn update_for(&self, outcome: Outcome, signature: Option<&str>, secs: u64) -> RecordUpdate {
        let duration_secs = self.record_duration.then_some(secs);
        match outcome {
            Outcome::Passed => RecordUpdate {
                fingerprint: None,
                passed: true,
                duration_secs,
            },
            Outcome::New => RecordUpdate {
                fingerprint: signature.map(str::to_string),
                passed: true,
                duration_secs: Some(secs),
            },
            Outcome::Regression => RecordUpdate {
                fingerprint: signature.filter(|_| self.update_failed).map(str::to_string),
                passed: false,
                duration_secs,
            },
            Outcome::Fault => RecordUpdate {
                fingerprint: None,
                passed: false,
                duration_secs: None,
            },
        }
    }
}

/// Per-case entry of a run summary.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    #[serde(skip)]
    pub key: TestIdentifier,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub fingerprint: Option<String>,
    pub baseline: Option<String>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_test_faults: Vec<String>,
    /// Commands issued by a failed case.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

/// Aggregated result of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub cases: Vec<CaseReport>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.cases.iter().filter(|c| c.outcome == outcome).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_failure()).count()
    }

    pub fn failed_names(&self) -> impl Iterator<Item = &str> {
        self.cases
            .iter()
            .filter(|c| c.outcome.is_failure())
            .map(|c| c.name.as_str())
    }

    /// `0` iff nothing failed.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    done: AtomicUsize,
    failed: AtomicUsize,
}

/// State shared by the workers of one batch.
struct Batch {
    registry: Arc<Registry>,
    env: Arc<HarnessEnv>,
    store: Arc<Mutex<ResultsStore>>,
    queue: Mutex<VecDeque<TestIdentifier>>,
    policy: UpdatePolicy,
    tally: Tally,
    total: usize,
    progress: bool,
}

impl Batch {
    async fn worker(self: Arc<Self>, worker: usize) -> Vec<CaseReport> {
        let mut reports = Vec::new();
        loop {
            let Some(id) = self.queue.lock().await.pop_front() else {
                break;
            };
            let span = obs::case_span(&id.name(), worker);
            let report = self.run_case(worker, id).instrument(span).await;
            reports.push(report);
        }
        reports
    }

    async fn run_case(&self, worker: usize, id: TestIdentifier) -> CaseReport {
        let ctx = Arc::new(CaseContext::new(id.clone(), worker, Arc::clone(&self.env)));
        let started = Instant::now();
        let (description, result) = self.execute(&id, Arc::clone(&ctx)).await;
        let elapsed = started.elapsed();

        let (outcome, baseline) = {
            let mut store = self.store.lock().await;
            let baseline = store.lookup(&id).map(|r| r.fingerprint.clone());
            let outcome = classify(baseline.as_deref(), &result);
            let signature = result.as_ref().ok().map(CompositeSignature::as_str);
            store.record(
                &id,
                self.policy.update_for(outcome, signature, elapsed.as_secs()),
            );
            (outcome, baseline)
        };

        let done = self.tally.done.fetch_add(1, Ordering::SeqCst) + 1;
        let failed = if outcome.is_failure() {
            self.tally.failed.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.tally.failed.load(Ordering::SeqCst)
        };

        let report = build_report(id, description, outcome, elapsed, baseline, result, &ctx);
        obs::emit_case_finished(&report.name, outcome.label(), report.duration_ms);
        if self.progress {
            print_progress(&report, done, failed, self.total);
        }
        report
    }

    /// Instantiate and run one case in its own task.
    async fn execute(
        &self,
        id: &TestIdentifier,
        ctx: Arc<CaseContext>,
    ) -> (Option<String>, CaseResult<CompositeSignature>) {
        let Some(case) = self.registry.instantiate(id) else {
            return (
                None,
                Err(CaseError::failed(format!("no test case registered as {id}"))),
            );
        };
        let description = match case.description() {
            Ok(description) => description,
            Err(e) => return (None, Err(e)),
        };

        let handle = tokio::spawn(async move { case.run_all(ctx).await }.in_current_span());
        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CaseError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(CaseError::Panicked(e.to_string())),
        };
        (Some(description), result)
    }
}

fn build_report(
    id: TestIdentifier,
    description: Option<String>,
    outcome: Outcome,
    elapsed: Duration,
    baseline: Option<String>,
    result: CaseResult<CompositeSignature>,
    ctx: &CaseContext,
) -> CaseReport {
    let (fingerprint, message, sub_test_faults) = match result {
        Ok(sig) => {
            let faults: Vec<String> = sig
                .faults()
                .map(|(name, details)| format!("{name}: {details}"))
                .collect();
            let message = match outcome {
                Outcome::Regression => Some("signature differs from baseline".to_string()),
                Outcome::Fault => Some(format!("{} sub-test(s) faulted", faults.len())),
                _ => None,
            };
            (Some(sig.into_string()), message, faults)
        }
        Err(e) => (None, Some(e.to_string()), Vec::new()),
    };

    CaseReport {
        id: id.padded(),
        name: id.name(),
        key: id,
        description,
        outcome,
        duration_ms: elapsed.as_millis() as u64,
        fingerprint,
        baseline,
        message,
        sub_test_faults,
        commands: if outcome.is_failure() {
            ctx.commands()
        } else {
            Vec::new()
        },
    }
}

/// `[done/total, N failed] name LABEL (x.ys)`; the failure count is omitted
/// while it is zero.
fn progress_line(report: &CaseReport, done: usize, failed: usize, total: usize) -> String {
    let failed = if failed > 0 {
        format!(", {failed} failed")
    } else {
        String::new()
    };
    format!(
        "[{done}/{total}{failed}] {} {} ({:.1}s)",
        report.name,
        report.outcome.label(),
        report.duration_ms as f64 / 1000.0
    )
}

fn print_progress(report: &CaseReport, done: usize, failed: usize, total: usize) {
    println!("{}", progress_line(report, done, failed, total));
    if let Some(message) = &report.message {
        println!("  {message}");
    }
    for fault in &report.sub_test_faults {
        println!("  sub-test {fault}");
    }
    if !report.commands.is_empty() {
        println!("  Commands:");
        for command in &report.commands {
            println!("    {command}");
        }
    }
}

/// Drives one batch from selection to the saved store.
pub struct Controller {
    registry: Arc<Registry>,
    env: Arc<HarnessEnv>,
    store: Arc<Mutex<ResultsStore>>,
    phase: Phase,
    progress: bool,
}

impl Controller {
    pub fn new(registry: Registry, env: HarnessEnv, store: ResultsStore) -> Self {
        Self {
            registry: Arc::new(registry),
            env: Arc::new(env),
            store: Arc::new(Mutex::new(store)),
            phase: Phase::Idle,
            progress: false,
        }
    }

    /// Print one line per finished case to stdout.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn store(&self) -> MutexGuard<'_, ResultsStore> {
        self.store.lock().await
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        obs::emit_phase(&phase.to_string());
    }

    /// Run a batch. Selection errors abort before any case runs; case
    /// failures never abort the batch.
    pub async fn run(&mut self, request: &RunRequest) -> Result<RunSummary, ControllerError> {
        let started = Instant::now();

        self.enter(Phase::Selecting);
        let selected = {
            let store = self.store.lock().await;
            request.resolve(&self.registry, &store)
        };
        let selected = match selected {
            Ok(selected) => selected,
            Err(e) => {
                self.enter(Phase::Done);
                return Err(e.into());
            }
        };

        self.enter(Phase::Scheduled);
        let jobs = request.jobs.clamp(1, selected.len().max(1));
        obs::emit_batch_started(selected.len(), jobs);
        let batch = Arc::new(Batch {
            registry: Arc::clone(&self.registry),
            env: Arc::clone(&self.env),
            store: Arc::clone(&self.store),
            total: selected.len(),
            queue: Mutex::new(selected.into_iter().collect()),
            policy: UpdatePolicy {
                update_failed: request.update_failed,
                record_duration: request.record_duration,
            },
            tally: Tally::default(),
            progress: self.progress,
        });

        self.enter(Phase::Running);
        let mut workers = JoinSet::new();
        for worker in 0..jobs {
            workers.spawn(Arc::clone(&batch).worker(worker));
        }
        let mut cases = Vec::with_capacity(batch.total);
        while let Some(joined) = workers.join_next().await {
            let reports = joined.map_err(|e| ControllerError::Worker(e.to_string()))?;
            cases.extend(reports);
        }

        self.enter(Phase::Aggregating);
        cases.sort_by(|a, b| a.key.cmp(&b.key));
        {
            let mut store = self.store.lock().await;
            if store.is_dirty() {
                store.save()?;
                obs::emit_store_saved(&store.path().display().to_string(), store.len());
            }
        }

        let summary = RunSummary {
            cases,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        obs::emit_batch_finished(
            summary.total(),
            summary.count(Outcome::Passed),
            summary.failed(),
            summary.count(Outcome::New),
            summary.duration_ms,
        );
        self.enter(Phase::Done);
        Ok(summary)
    }
}
