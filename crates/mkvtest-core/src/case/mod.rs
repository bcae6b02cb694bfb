//! Test cases: the shared capability plus its two variants.
//!
//! - [`procedural`]: a single `run` producing one fingerprint
//! - [`declarative`]: ordered setup / named test / cleanup blocks

pub mod declarative;
pub mod procedural;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;

use crate::context::CaseContext;
use crate::error::{CaseError, CaseResult};

pub use declarative::DeclarativeCase;
pub use procedural::{ProceduralCase, Procedure};

/// Separator between sub-test fingerprints in a composite signature.
pub const SIGNATURE_SEPARATOR: &str = "-";

/// Outcome of one declarative sub-test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTestOutcome {
    Ok(String),
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubTestResult {
    pub name: String,
    pub outcome: SubTestOutcome,
}

impl SubTestResult {
    /// Contribution to the composite signature; faults contribute nothing.
    pub fn fingerprint(&self) -> &str {
        match &self.outcome {
            SubTestOutcome::Ok(fp) => fp,
            SubTestOutcome::Fault(_) => "",
        }
    }
}

/// Overall observable output of one case run, compared against the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeSignature {
    value: String,
    sub_tests: Vec<SubTestResult>,
}

impl CompositeSignature {
    /// Signature of a procedural run.
    pub fn single(fingerprint: impl Into<String>) -> Self {
        Self {
            value: fingerprint.into(),
            sub_tests: Vec::new(),
        }
    }

    /// Join sub-test fingerprints in registration order.
    pub fn from_sub_tests(sub_tests: Vec<SubTestResult>) -> Self {
        let value = sub_tests
            .iter()
            .map(SubTestResult::fingerprint)
            .collect::<Vec<_>>()
            .join(SIGNATURE_SEPARATOR);
        Self { value, sub_tests }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    pub fn sub_tests(&self) -> &[SubTestResult] {
        &self.sub_tests
    }

    /// Sub-tests that faulted, as `(name, details)`.
    pub fn faults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sub_tests.iter().filter_map(|t| match &t.outcome {
            SubTestOutcome::Fault(details) => Some((t.name.as_str(), details.as_str())),
            SubTestOutcome::Ok(_) => None,
        })
    }
}

/// Capability shared by every test case.
#[async_trait]
pub trait TestCase: Send + Sync {
    /// Human-readable description; an absent description is an error.
    fn description(&self) -> CaseResult<String>;

    /// Run the case to completion and produce its composite signature.
    async fn run_all(&self, ctx: Arc<CaseContext>) -> CaseResult<CompositeSignature>;
}

/// Render a panic payload for reports.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Await `fut`, turning a panic into [`CaseError::Panicked`].
pub(crate) async fn guarded<T>(fut: impl Future<Output = CaseResult<T>>) -> CaseResult<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(CaseError::Panicked(panic_message(payload))),
    }
}
