//! Per-invocation state shared by a test case's blocks: temp file naming,
//! the command audit log and the process runner.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::env::HarnessEnv;
use crate::error::{CaseError, CaseResult};
use crate::fingerprint::fingerprint_file;
use crate::id::TestIdentifier;
use crate::runner::{Execution, ExpectedExit, ProcessRunner};

/// Common prefix of every scoped temp file.
pub const TMP_FILE_STEM: &str = "mkvtoolnix-auto-test";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Context handed to every block of one test case run.
///
/// Temp names are `<tmp_dir>/mkvtoolnix-auto-test-<name>-<pid>-<worker>-<seq>`,
/// so concurrently running workers never share a path.
#[derive(Debug)]
pub struct CaseContext {
    id: TestIdentifier,
    worker: usize,
    env: Arc<HarnessEnv>,
    runner: ProcessRunner,
    tmp_seq: AtomicU64,
    current_tmp: Mutex<Option<PathBuf>>,
    commands: Mutex<Vec<String>>,
}

impl CaseContext {
    pub fn new(id: TestIdentifier, worker: usize, env: Arc<HarnessEnv>) -> Self {
        Self {
            id,
            worker,
            runner: ProcessRunner::new(Arc::clone(&env)),
            env,
            tmp_seq: AtomicU64::new(0),
            current_tmp: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &TestIdentifier {
        &self.id
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn env(&self) -> &HarnessEnv {
        &self.env
    }

    /// Shell-ready path of a toolkit binary.
    pub fn tool(&self, name: &str) -> String {
        self.env.tool(name).display().to_string()
    }

    pub fn tmp_name_prefix(&self) -> String {
        format!(
            "{}-{}-{}-{}-",
            self.env.tmp_dir().join(TMP_FILE_STEM).display(),
            self.id.name(),
            std::process::id(),
            self.worker
        )
    }

    /// A fresh temp path; never handed out twice by this context.
    pub fn tmp_name(&self) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed) + 1;
        PathBuf::from(format!("{}{}", self.tmp_name_prefix(), seq))
    }

    /// The current temp path, allocated on first use.
    pub fn tmp(&self) -> PathBuf {
        lock(&self.current_tmp)
            .get_or_insert_with(|| self.tmp_name())
            .clone()
    }

    /// [`CaseContext::tmp`] as a string for building command lines.
    pub fn tmp_str(&self) -> String {
        self.tmp().display().to_string()
    }

    /// Fingerprint of `path`; a missing file is reported by name. Hashing
    /// runs on the blocking pool.
    pub async fn hash_file(&self, path: impl AsRef<Path>) -> CaseResult<String> {
        let path = path.as_ref().to_path_buf();
        let target = path.clone();
        let hashed = tokio::task::spawn_blocking(move || fingerprint_file(&target))
            .await
            .map_err(|e| CaseError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        hashed.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CaseError::MissingOutput { path },
            _ => CaseError::Io(e),
        })
    }

    /// Fingerprint the current temp file. With `erase`, the file is removed
    /// (unless temp files are kept) and the next [`CaseContext::tmp`] call
    /// allocates a new name.
    pub async fn hash_tmp(&self, erase: bool) -> CaseResult<String> {
        let tmp = self.tmp();
        let hash = self.hash_file(&tmp).await?;

        if erase {
            if !self.env.keep_tmp_files {
                match tokio::fs::remove_file(&tmp).await {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
            *lock(&self.current_tmp) = None;
        }

        Ok(hash)
    }

    /// Run a command line, recording it in the audit log. Output of commands
    /// without their own redirect is captured into a scoped temp file.
    pub async fn sys(
        &self,
        command: impl Into<String>,
        expected: ExpectedExit,
    ) -> CaseResult<Execution> {
        let command = command.into();
        lock(&self.commands).push(command.clone());

        let capture = ProcessRunner::needs_capture(&command).then(|| self.tmp_name());
        let result = self
            .runner
            .execute(&command, expected, capture.as_deref())
            .await;

        if let Err(e @ CaseError::CommandFailed { .. }) = &result {
            self.report(&format!("  Failed. Reason: {e}"));
        }
        result
    }

    /// Run a pipeline and return its standard output (recorded in the audit
    /// log like [`CaseContext::sys`]).
    pub async fn capture_stdout(&self, command: impl Into<String>) -> CaseResult<String> {
        let command = command.into();
        lock(&self.commands).push(command.clone());
        self.runner.capture_stdout(&command).await
    }

    /// Build a case-declared failure, logging the reason.
    pub fn error(&self, reason: impl Into<String>) -> CaseError {
        let reason = reason.into();
        self.report(&format!("  Failed. Reason: {reason}"));
        CaseError::failed(reason)
    }

    /// Commands issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Remove every file carrying this context's temp prefix. Returns the
    /// number of files removed; does nothing when temp files are kept.
    pub fn remove_tmp_files(&self) -> io::Result<usize> {
        if self.env.keep_tmp_files {
            return Ok(0);
        }

        let prefix = self.tmp_name_prefix();
        let mut removed = 0;
        for entry in std::fs::read_dir(self.env.tmp_dir())? {
            let path = entry?.path();
            if path.to_string_lossy().starts_with(&prefix) && remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn report(&self, message: &str) {
        debug!(case = %self.id, worker = self.worker, "{message}");
    }
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Guard that removes a context's temp files when dropped, whether the case
/// finished, failed or unwound.
pub struct TmpScope {
    ctx: Arc<CaseContext>,
}

impl TmpScope {
    pub fn new(ctx: Arc<CaseContext>) -> Self {
        Self { ctx }
    }
}

impl Drop for TmpScope {
    fn drop(&mut self) {
        match self.ctx.remove_tmp_files() {
            Ok(0) => {}
            Ok(n) => debug!(case = %self.ctx.id, removed = n, "removed temp files"),
            Err(e) => warn!(case = %self.ctx.id, error = %e, "could not remove temp files"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ctx_in(dir: &Path, worker: usize) -> Arc<CaseContext> {
        let env = HarnessEnv::default()
            .with_tmp_dir(dir)
            .with_timeout_secs(30)
            .keeping_tmp_files(false);
        Arc::new(CaseContext::new(
            TestIdentifier::new(14, "splitting_by_size"),
            worker,
            Arc::new(env),
        ))
    }

    #[test]
    fn tmp_names_are_unique_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), 3);
        let prefix = ctx.tmp_name_prefix();
        assert!(prefix.contains("mkvtoolnix-auto-test-T_014splitting_by_size-"));
        assert!(prefix.ends_with(&format!("-{}-3-", std::process::id())));

        let names: HashSet<PathBuf> = (0..100).map(|_| ctx.tmp_name()).collect();
        assert_eq!(names.len(), 100);
    }

    #[test]
    fn workers_never_share_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let a = ctx_in(dir.path(), 1);
        let b = ctx_in(dir.path(), 10);
        assert!(!b.tmp_name().to_string_lossy().starts_with(&a.tmp_name_prefix()));
    }

    #[tokio::test]
    async fn tmp_is_memoized_until_erased() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), 0);
        let first = ctx.tmp();
        assert_eq!(first, ctx.tmp());

        std::fs::write(&first, b"payload").unwrap();
        let hash = ctx.hash_tmp(true).await.unwrap();
        assert_eq!(hash, crate::fingerprint::fingerprint(b"payload"));
        assert!(!first.exists());
        assert_ne!(first, ctx.tmp());
    }

    #[tokio::test]
    async fn hash_file_names_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), 0);
        let missing = dir.path().join("out-002");
        match ctx.hash_file(&missing).await {
            Err(CaseError::MissingOutput { path }) => assert_eq!(path, missing),
            other => panic!("expected MissingOutput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hash_tmp_keeps_file_when_not_erasing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), 0);
        let tmp = ctx.tmp();
        tokio::fs::write(&tmp, b"kept").await.unwrap();

        let hash = ctx.hash_tmp(false).await.unwrap();
        assert_eq!(hash, crate::fingerprint::fingerprint(b"kept"));
        assert!(tmp.exists());
        assert_eq!(ctx.tmp(), tmp);
    }

    #[test]
    fn scope_removes_only_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), 0);
        let other = ctx_in(dir.path(), 1);
        let mine = ctx.tmp_name();
        let theirs = other.tmp_name();
        std::fs::write(&mine, b"a").unwrap();
        std::fs::write(format!("{}-001", mine.display()), b"b").unwrap();
        std::fs::write(&theirs, b"c").unwrap();

        drop(TmpScope::new(Arc::clone(&ctx)));

        assert!(!mine.exists());
        assert!(theirs.exists());
    }

    #[test]
    fn kept_files_survive_scope() {
        let dir = tempfile::tempdir().unwrap();
        let env = HarnessEnv::default()
            .with_tmp_dir(dir.path())
            .keeping_tmp_files(true);
        let ctx = Arc::new(CaseContext::new(TestIdentifier::new(1, "x"), 0, Arc::new(env)));
        let path = ctx.tmp_name();
        std::fs::write(&path, b"keep me").unwrap();

        drop(TmpScope::new(Arc::clone(&ctx)));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn sys_records_audit_log() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), 0);

        let run = ctx.sys("echo first", ExpectedExit::Success).await.unwrap();
        assert_eq!(run.lines(), ["first".to_string()]);
        let err = ctx.sys("exit 3", ExpectedExit::Success).await.unwrap_err();
        assert!(err.is_harness_fault());

        assert_eq!(ctx.commands(), vec!["echo first".to_string(), "exit 3".to_string()]);
    }
}
