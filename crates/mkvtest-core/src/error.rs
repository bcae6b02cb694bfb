//! Error taxonomy for the harness.
//!
//! Three families, matching how far an error is allowed to propagate:
//! - [`SelectionError`] aborts the whole invocation before any test runs.
//! - [`CaseError`] is confined to one test case (or one sub-test).
//! - [`StoreError`] concerns the persisted baseline file.
//!
//! [`RegistryError`] is a programming error in the built-in case list and
//! [`ControllerError`] wraps whatever stops a run before or after its cases.

use std::path::PathBuf;

/// Errors raised while a single test case runs.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    /// The case itself declared a failure (the `error` helper).
    #[error("test failed: {reason}")]
    Failed { reason: String },

    /// A command exited with a code other than the expected one.
    #[error("system command failed: {command} ({actual}, expected {expected})")]
    CommandFailed {
        command: String,
        expected: i32,
        actual: i32,
    },

    #[error("command timed out after {limit_secs}s: {command}")]
    Timeout { command: String, limit_secs: u64 },

    #[error("expected output file does not exist: {}", path.display())]
    MissingOutput { path: PathBuf },

    #[error("test case misses its description")]
    MissingDescription,

    #[error("setup failed: {0}")]
    Setup(Box<CaseError>),

    #[error("identification output violates schema: {0}")]
    Schema(String),

    #[error("test case panicked: {0}")]
    Panicked(String),

    #[error("invalid exit code expectation: {0}")]
    InvalidExitCode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaseError {
    /// Shorthand for a case-declared failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        CaseError::Failed {
            reason: reason.into(),
        }
    }

    /// Whether the error originates from the harness (process contract,
    /// timeouts, missing files) rather than from a case-declared failure.
    pub fn is_harness_fault(&self) -> bool {
        !matches!(self, CaseError::Failed { .. })
    }
}

/// Result type for case operations.
pub type CaseResult<T> = std::result::Result<T, CaseError>;

/// Errors produced while resolving which tests to run. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Unknown argument '{0}'.")]
    InvalidSelector(String),

    #[error("invalid range {from:03}-{to:03}: upper bound is below lower bound")]
    ReversedRange { from: u16, to: u16 },

    #[error("no test case registered for id {0}")]
    UnknownTest(String),

    #[error("no test case registered in range {from:03}-{to:03}")]
    EmptyRange { from: u16, to: u16 },

    #[error("No tests matched RE {0}")]
    NoMatch(String),

    #[error("invalid regular expression {pattern}: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid date '{0}' (expected YYYYMMDDHHMM or YYYYMMDD-HHMM)")]
    BadDate(String),
}

/// Errors from the results store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("malformed results line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("could not replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building the case registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidName(#[from] crate::id::InvalidTestName),

    #[error("test number {number:03} registered twice ({first} and {second})")]
    DuplicateNumber {
        number: u16,
        first: String,
        second: String,
    },
}

/// Errors that abort a controller run as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker pool failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_names_command_and_code() {
        let err = CaseError::CommandFailed {
            command: "mkvmerge -o out.mkv in.avi".to_string(),
            expected: 0,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("mkvmerge -o out.mkv in.avi"));
        assert!(msg.contains("(2, expected 0)"));
        assert!(err.is_harness_fault());
    }

    #[test]
    fn declared_failure_is_not_a_harness_fault() {
        assert!(!CaseError::failed("First split file does not exist.").is_harness_fault());
    }

    #[test]
    fn selection_errors_are_user_readable() {
        assert_eq!(
            SelectionError::NoMatch("^T_\\d+.*(?:tags)".to_string()).to_string(),
            "No tests matched RE ^T_\\d+.*(?:tags)"
        );
        assert!(SelectionError::ReversedRange { from: 20, to: 3 }
            .to_string()
            .contains("020-003"));
    }
}
