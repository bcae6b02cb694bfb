//! Harness environment: where the toolkit lives, where temp files go, and
//! the environment overrides read once at startup.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{CaseError, CaseResult};
use crate::schema::IdentificationSchema;

/// Environment variable that keeps temp files for post-mortem inspection
/// when set to `1`.
pub const KEEP_TMPFILES_VAR: &str = "KEEP_TMPFILES";

/// Environment variable that echoes every command before it runs.
pub const DEBUG_VAR: &str = "DEBUG";

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Locale forced onto every subprocess so text output compares stably.
pub const FORCED_LOCALE: &str = "en_US.UTF-8";

/// Shared, read-only configuration for every worker and case.
#[derive(Debug)]
pub struct HarnessEnv {
    /// Directory holding the toolkit binaries; prepended to `PATH`.
    pub tool_dir: PathBuf,

    /// Directory for scoped temp files.
    pub tmp_dir: PathBuf,

    /// Working directory of every subprocess; relative test data paths
    /// such as `data/avi/v.avi` resolve against it.
    pub work_dir: PathBuf,

    /// Keep temp files instead of removing them after each case.
    pub keep_tmp_files: bool,

    /// Echo each command line before it runs.
    pub debug_commands: bool,

    /// Per-command timeout in seconds (0 = wait forever).
    pub timeout_secs: u64,

    /// JSON schema for `mkvmerge --identify` JSON output.
    pub schema_path: PathBuf,

    schema: OnceLock<IdentificationSchema>,
}

impl Default for HarnessEnv {
    fn default() -> Self {
        Self {
            tool_dir: PathBuf::from("../src"),
            tmp_dir: std::env::temp_dir(),
            work_dir: PathBuf::from("."),
            keep_tmp_files: false,
            debug_commands: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            schema_path: PathBuf::from(
                "../doc/json-schema/mkvmerge-identification-output-schema-v1.json",
            ),
            schema: OnceLock::new(),
        }
    }
}

impl HarnessEnv {
    /// Defaults plus the `KEEP_TMPFILES` and `DEBUG` overrides from the
    /// process environment.
    pub fn from_process_env() -> Self {
        Self {
            keep_tmp_files: std::env::var(KEEP_TMPFILES_VAR).map_or(false, |v| v == "1"),
            debug_commands: std::env::var_os(DEBUG_VAR).is_some(),
            ..Self::default()
        }
    }

    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = dir.into();
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// `path` resolved against the work dir; absolute paths are returned
    /// unchanged. Test data (`data/mkv/complex.mkv`) and relative tool, tmp
    /// and schema locations all resolve this way.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(path)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    pub fn keeping_tmp_files(mut self, keep: bool) -> Self {
        self.keep_tmp_files = keep;
        self
    }

    pub fn echoing_commands(mut self, debug: bool) -> Self {
        self.debug_commands = debug;
        self
    }

    /// Path of a toolkit binary inside the tool directory.
    pub fn tool(&self, name: &str) -> PathBuf {
        self.resolve(&self.tool_dir).join(name)
    }

    /// Whether a toolkit binary exists in the tool directory.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tool(name).is_file()
    }

    /// Name of the locale variable forced for subprocesses.
    pub fn locale_var() -> &'static str {
        if cfg!(target_os = "macos") {
            "LANG"
        } else {
            "LC_ALL"
        }
    }

    /// `PATH` with the tool directory in front.
    pub fn search_path(&self) -> OsString {
        let tool_dir = self.resolve(&self.tool_dir);
        let mut dirs = vec![tool_dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(dirs).unwrap_or_else(|_| tool_dir.into_os_string())
    }

    /// Identification schema, loaded on first use and kept for the lifetime
    /// of this environment.
    pub fn identification_schema(&self) -> CaseResult<&IdentificationSchema> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema);
        }
        let loaded = IdentificationSchema::load(&self.resolve(&self.schema_path))
            .map_err(|e| CaseError::Schema(format!("{}: {e}", self.schema_path.display())))?;
        Ok(self.schema.get_or_init(|| loaded))
    }

    /// Install an already-constructed schema (used when the caller loads it
    /// from somewhere other than `schema_path`).
    pub fn with_schema(self, schema: IdentificationSchema) -> Self {
        let _ = self.schema.set(schema);
        self
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.resolve(&self.tmp_dir)
    }
}
