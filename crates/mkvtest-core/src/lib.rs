//! mkvtest core library
//!
//! Regression-test engine for the MKVToolNix command-line tools: runs test
//! cases against the toolkit binaries, fingerprints their output and
//! compares it with the baselines kept in the results store.

pub mod case;
pub mod context;
pub mod controller;
pub mod env;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod obs;
pub mod registry;
pub mod report;
pub mod runner;
pub mod schema;
pub mod selection;
pub mod store;
pub mod telemetry;
pub mod toolkit;

pub use case::declarative::{OutputFilter, TestOptions};
pub use case::{
    CompositeSignature, DeclarativeCase, ProceduralCase, Procedure, SubTestOutcome,
    SubTestResult, TestCase,
};
pub use context::{CaseContext, TmpScope};
pub use controller::{classify, CaseReport, Controller, Outcome, Phase, RunSummary, UpdatePolicy};
pub use env::HarnessEnv;
pub use error::{
    CaseError, CaseResult, ControllerError, RegistryError, SelectionError, StoreError,
};
pub use fingerprint::{fingerprint, fingerprint_file, Fingerprint};
pub use id::TestIdentifier;
pub use registry::{CaseFactory, Registry};
pub use report::{render_summary, write_run_report, RunReport};
pub use runner::{Execution, ExpectedExit, ProcessRunner};
pub use schema::IdentificationSchema;
pub use selection::{parse_date, RunRequest, Selector};
pub use store::{RecordUpdate, ResultRecord, ResultsStore, Status};
pub use telemetry::init_tracing;
pub use toolkit::{
    ExtractOptions, IdentificationFormat, IdentifyOptions, InfoOptions, InfoOutput, MergeOptions,
};
