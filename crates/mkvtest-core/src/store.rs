//! Results store: durable mapping from test name to its baseline.
//!
//! File format, one record per line, sorted by name:
//!
//! ```text
//! T_014splitting_by_size:<fingerprint>:passed:20240131-174502:3
//! ```
//!
//! Saving writes a sibling temp file and atomically renames it over the
//! previous store, so an interrupted run leaves the old state intact.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;
use crate::id::TestIdentifier;

/// Timestamp layout used in the results file.
pub const DATE_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
}

impl Status {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Status::Passed
        } else {
            Status::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(Status::Passed),
            "failed" => Ok(Status::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub fingerprint: String,
    pub status: Status,
    pub date_added: NaiveDateTime,
    pub duration_secs: u64,
}

/// Changes applied to one record after a run.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    /// New baseline; `None` keeps the stored fingerprint.
    pub fingerprint: Option<String>,
    pub passed: bool,
    /// New duration; `None` keeps the stored duration.
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResultsStore {
    path: PathBuf,
    records: BTreeMap<String, ResultRecord>,
    dirty: bool,
}

impl ResultsStore {
    /// An empty store that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Read the store; a missing file means no history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no results file, starting without history");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut store = Self::empty(path);
        store.records = parse(&text)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lookup(&self, id: &TestIdentifier) -> Option<&ResultRecord> {
        self.records.get(&id.name())
    }

    /// Apply `update` in memory. A missing record is created with the
    /// current time as its date added; it needs a fingerprint to exist.
    pub fn record(&mut self, id: &TestIdentifier, update: RecordUpdate) {
        let status = Status::from_passed(update.passed);
        match self.records.get_mut(&id.name()) {
            Some(record) => {
                if let Some(fingerprint) = update.fingerprint {
                    record.fingerprint = fingerprint;
                }
                if let Some(duration) = update.duration_secs {
                    record.duration_secs = duration;
                }
                record.status = status;
            }
            None => {
                let Some(fingerprint) = update.fingerprint else {
                    return;
                };
                self.records.insert(
                    id.name(),
                    ResultRecord {
                        fingerprint,
                        status,
                        date_added: Local::now().naive_local(),
                        duration_secs: update.duration_secs.unwrap_or(0),
                    },
                );
            }
        }
        self.dirty = true;
    }

    /// Names of tests whose last recorded status is failed.
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|(_, r)| r.status == Status::Failed)
            .map(|(name, _)| name.as_str())
    }

    /// Durably replace the store file with the in-memory mapping.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;

        self.dirty = false;
        debug!(path = %self.path.display(), records = self.records.len(), "results saved");
        Ok(())
    }

    /// Serialized form of the whole store.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, r) in &self.records {
            out.push_str(&format!(
                "{name}:{}:{}:{}:{}\n",
                r.fingerprint,
                r.status,
                r.date_added.format(DATE_FORMAT),
                r.duration_secs
            ));
        }
        out
    }
}

fn parse(text: &str) -> Result<BTreeMap<String, ResultRecord>, StoreError> {
    let mut records = BTreeMap::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: String| StoreError::Malformed {
            line: idx + 1,
            reason,
        };

        let fields: Vec<&str> = line.split(':').collect();
        if !(4..=5).contains(&fields.len()) {
            return Err(malformed(format!("expected 4 or 5 fields, found {}", fields.len())));
        }

        let status = fields[2].parse::<Status>().map_err(malformed)?;
        let date_added = NaiveDateTime::parse_from_str(fields[3], DATE_FORMAT)
            .map_err(|e| malformed(format!("bad date '{}': {e}", fields[3])))?;
        let duration_secs = match fields.get(4) {
            Some(d) if !d.is_empty() => d
                .parse::<u64>()
                .map_err(|e| malformed(format!("bad duration '{d}': {e}")))?,
            _ => 0,
        };

        records.insert(
            fields[0].to_string(),
            ResultRecord {
                fingerprint: fields[1].to_string(),
                status,
                date_added,
                duration_secs,
            },
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
T_014splitting_by_size:aaa-bbb:passed:20100404-101010:4
T_047X_tags:ccc:failed:20100505-111111

";

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultsStore::load(dir.path().join("results.txt")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn parses_records_and_defaults_duration() {
        let records = parse(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        let tags = &records["T_047X_tags"];
        assert_eq!(tags.status, Status::Failed);
        assert_eq!(tags.duration_secs, 0);
        assert_eq!(records["T_014splitting_by_size"].fingerprint, "aaa-bbb");
    }

    #[test]
    fn malformed_line_is_named() {
        let err = parse("T_001x:abc:passed:20100101-000000:1\nT_002y:broken\n").unwrap_err();
        match err {
            StoreError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse("T_001x:abc:maybe:20100101-000000:1\n").is_err());
    }

    #[test]
    fn save_then_load_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut store = ResultsStore::load(&path).unwrap();
        store.record(
            &TestIdentifier::new(47, "X_tags"),
            RecordUpdate {
                fingerprint: Some("ddd".to_string()),
                passed: true,
                duration_secs: Some(9),
            },
        );
        assert!(store.is_dirty());
        store.save().unwrap();
        assert!(!store.is_dirty());

        let reloaded = ResultsStore::load(&path).unwrap();
        let tags = reloaded.lookup(&TestIdentifier::new(47, "X_tags")).unwrap();
        assert_eq!(tags.fingerprint, "ddd");
        assert_eq!(tags.status, Status::Passed);
        assert_eq!(tags.duration_secs, 9);
        assert_eq!(
            tags.date_added.format(DATE_FORMAT).to_string(),
            "20100505-111111"
        );
        assert_eq!(reloaded.render(), store.render());
    }

    #[test]
    fn status_only_update_keeps_baseline() {
        let mut store = ResultsStore::empty("unused.txt");
        let id = TestIdentifier::new(14, "splitting_by_size");
        store.record(
            &id,
            RecordUpdate {
                fingerprint: Some("good".to_string()),
                passed: true,
                duration_secs: Some(3),
            },
        );
        store.record(
            &id,
            RecordUpdate {
                fingerprint: None,
                passed: false,
                duration_secs: None,
            },
        );
        let record = store.lookup(&id).unwrap();
        assert_eq!(record.fingerprint, "good");
        assert_eq!(record.status, Status::Failed);
        assert_eq!(record.duration_secs, 3);
        assert_eq!(store.failed().collect::<Vec<_>>(), vec!["T_014splitting_by_size"]);
    }

    #[test]
    fn update_without_fingerprint_creates_nothing() {
        let mut store = ResultsStore::empty("unused.txt");
        store.record(&TestIdentifier::new(5, "x"), RecordUpdate::default());
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        let mut store = ResultsStore::empty(&path);
        store.record(
            &TestIdentifier::new(1, "a"),
            RecordUpdate {
                fingerprint: Some("f".to_string()),
                passed: true,
                duration_secs: None,
            },
        );
        store.save().unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
