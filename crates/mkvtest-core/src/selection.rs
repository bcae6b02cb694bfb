//! Resolution of command-line selectors and policy filters into the
//! ordered set of tests to run.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::SelectionError;
use crate::id::TestIdentifier;
use crate::registry::Registry;
use crate::store::{ResultsStore, Status};

/// One positional selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `NNN`
    Single(u16),
    /// `NNN-MMM`, inclusive.
    Range { from: u16, to: u16 },
    /// `/re/`, matched case-insensitively against test names.
    Pattern(String),
}

impl Selector {
    /// The anchored name regex for a pattern selector.
    pub fn pattern_regex(pattern: &str) -> Result<Regex, SelectionError> {
        let source = pattern_source(pattern);
        RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| SelectionError::BadPattern {
                pattern: source,
                source: e,
            })
    }
}

fn pattern_source(pattern: &str) -> String {
    format!(r"^T_\d+.*(?:{pattern})")
}

fn parse_number(s: &str) -> Option<u16> {
    if s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

impl FromStr for Selector {
    type Err = SelectionError;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let invalid = || SelectionError::InvalidSelector(arg.to_string());

        if let Some(inner) = arg.strip_prefix('/').and_then(|s| s.strip_suffix('/')) {
            if inner.is_empty() {
                return Err(invalid());
            }
            return Ok(Selector::Pattern(inner.to_string()));
        }

        match arg.split_once('-') {
            Some((from, to)) => {
                let from = parse_number(from).ok_or_else(invalid)?;
                let to = parse_number(to).ok_or_else(invalid)?;
                if to < from {
                    return Err(SelectionError::ReversedRange { from, to });
                }
                Ok(Selector::Range { from, to })
            }
            None => parse_number(arg).map(Selector::Single).ok_or_else(invalid),
        }
    }
}

/// Parse a `-d`/`-D` bound: `YYYYMMDDHHMM` or `YYYYMMDD-HHMM`.
pub fn parse_date(s: &str) -> Result<NaiveDateTime, SelectionError> {
    if !s.is_ascii() {
        return Err(SelectionError::BadDate(s.to_string()));
    }
    let compact: String = match s.len() {
        12 => s.to_string(),
        13 if s.as_bytes()[8] == b'-' => format!("{}{}", &s[..8], &s[9..]),
        _ => return Err(SelectionError::BadDate(s.to_string())),
    };
    NaiveDateTime::parse_from_str(&compact, "%Y%m%d%H%M")
        .map_err(|_| SelectionError::BadDate(s.to_string()))
}

/// Worker count when none is requested.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolved selection inputs and execution policy for one batch.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub selectors: Vec<Selector>,
    pub only_failed: bool,
    pub only_new: bool,
    pub update_failed: bool,
    pub record_duration: bool,
    pub date_after: Option<NaiveDateTime>,
    pub date_before: Option<NaiveDateTime>,
    pub jobs: usize,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            selectors: Vec::new(),
            only_failed: false,
            only_new: false,
            update_failed: false,
            record_duration: false,
            date_after: None,
            date_before: None,
            jobs: default_jobs(),
        }
    }
}

impl RunRequest {
    /// Concrete, numerically ordered set of tests to run.
    ///
    /// Unknown single ids, ranges without any registered member and
    /// patterns without matches are fatal.
    pub fn resolve(
        &self,
        registry: &Registry,
        store: &ResultsStore,
    ) -> Result<Vec<TestIdentifier>, SelectionError> {
        let candidates = self.candidates(registry)?;
        Ok(candidates
            .into_iter()
            .filter(|id| self.admits(id, store))
            .collect())
    }

    fn candidates(&self, registry: &Registry) -> Result<BTreeSet<TestIdentifier>, SelectionError> {
        if self.selectors.is_empty() {
            return Ok(registry.ids().cloned().collect());
        }

        let mut selected = BTreeSet::new();
        for selector in &self.selectors {
            match selector {
                Selector::Single(number) => {
                    let id = registry
                        .by_number(*number)
                        .ok_or_else(|| SelectionError::UnknownTest(format!("{number:03}")))?;
                    selected.insert(id.clone());
                }
                Selector::Range { from, to } => {
                    if to < from {
                        return Err(SelectionError::ReversedRange {
                            from: *from,
                            to: *to,
                        });
                    }
                    let mut found = 0;
                    for number in *from..=*to {
                        match registry.by_number(number) {
                            Some(id) => {
                                selected.insert(id.clone());
                                found += 1;
                            }
                            None => {
                                warn!(number = %format!("{number:03}"), "no test case registered, skipping")
                            }
                        }
                    }
                    if found == 0 {
                        return Err(SelectionError::EmptyRange {
                            from: *from,
                            to: *to,
                        });
                    }
                }
                Selector::Pattern(pattern) => {
                    let re = Selector::pattern_regex(pattern)?;
                    let matched: Vec<TestIdentifier> = registry.matching(&re).cloned().collect();
                    if matched.is_empty() {
                        return Err(SelectionError::NoMatch(pattern_source(pattern)));
                    }
                    selected.extend(matched);
                }
            }
        }
        Ok(selected)
    }

    fn admits(&self, id: &TestIdentifier, store: &ResultsStore) -> bool {
        let record = store.lookup(id);

        if self.only_failed || self.only_new {
            let failed = self.only_failed && record.is_some_and(|r| r.status == Status::Failed);
            let new = self.only_new && record.is_none();
            if !(failed || new) {
                return false;
            }
        }

        let Some(record) = record else {
            return true;
        };
        if self.date_after.is_some_and(|after| record.date_added < after) {
            return false;
        }
        if self.date_before.is_some_and(|before| record.date_added > before) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{DeclarativeCase, TestCase};
    use crate::store::RecordUpdate;

    fn empty_case() -> Box<dyn TestCase> {
        let mut case = DeclarativeCase::new();
        case.describe("empty");
        Box::new(case)
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        for name in [
            "T_014splitting_by_size",
            "T_015splitting_by_time",
            "T_016cuesheet",
            "T_018attachments",
            "T_047X_tags",
            "T_217file_identification",
            "T_256cropping_stereo_mode",
        ] {
            registry.register(name, empty_case).unwrap();
        }
        registry
    }

    fn request(selectors: &[&str]) -> RunRequest {
        RunRequest {
            selectors: selectors.iter().map(|s| s.parse().unwrap()).collect(),
            jobs: 1,
            ..Default::default()
        }
    }

    fn numbers(ids: &[TestIdentifier]) -> Vec<u16> {
        ids.iter().map(TestIdentifier::number).collect()
    }

    #[test]
    fn parses_selectors() {
        assert_eq!("014".parse::<Selector>().unwrap(), Selector::Single(14));
        assert_eq!(
            "014-016".parse::<Selector>().unwrap(),
            Selector::Range { from: 14, to: 16 }
        );
        assert_eq!(
            "/tags/".parse::<Selector>().unwrap(),
            Selector::Pattern("tags".to_string())
        );
        assert!(matches!(
            "--bogus".parse::<Selector>(),
            Err(SelectionError::InvalidSelector(_))
        ));
        assert!(matches!("14".parse::<Selector>(), Err(SelectionError::InvalidSelector(_))));
        assert!(matches!(
            "020-003".parse::<Selector>(),
            Err(SelectionError::ReversedRange { from: 20, to: 3 })
        ));
    }

    #[test]
    fn range_selects_exactly_its_members() {
        let registry = registry();
        let store = ResultsStore::empty("unused.txt");
        for (from, to) in [(14u16, 16u16), (14, 14), (15, 16)] {
            let req = RunRequest {
                selectors: vec![Selector::Range { from, to }],
                ..request(&[])
            };
            let got = numbers(&req.resolve(&registry, &store).unwrap());
            let expected: Vec<u16> = (from..=to).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn range_skips_gaps_but_not_entirely_empty() {
        let registry = registry();
        let store = ResultsStore::empty("unused.txt");
        let got = request(&["016-018"]).resolve(&registry, &store).unwrap();
        assert_eq!(numbers(&got), vec![16, 18]);

        assert!(matches!(
            request(&["100-200"]).resolve(&registry, &store),
            Err(SelectionError::EmptyRange { from: 100, to: 200 })
        ));
    }

    #[test]
    fn unknown_single_id_is_fatal() {
        let err = request(&["999"])
            .resolve(&registry(), &ResultsStore::empty("unused.txt"))
            .unwrap_err();
        assert!(matches!(err, SelectionError::UnknownTest(ref n) if n == "999"));
    }

    #[test]
    fn pattern_is_case_insensitive() {
        let got = request(&["/TAGS/"])
            .resolve(&registry(), &ResultsStore::empty("unused.txt"))
            .unwrap();
        assert_eq!(numbers(&got), vec![47]);
    }

    #[test]
    fn pattern_without_match_is_fatal() {
        let err = request(&["/no_such_test/"])
            .resolve(&registry(), &ResultsStore::empty("unused.txt"))
            .unwrap_err();
        assert!(err.to_string().starts_with("No tests matched RE"));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let err = request(&["/([/"])
            .resolve(&registry(), &ResultsStore::empty("unused.txt"))
            .unwrap_err();
        assert!(matches!(err, SelectionError::BadPattern { .. }));
    }

    #[test]
    fn selectors_union_without_duplicates() {
        let got = request(&["014-016", "015", "/split/"])
            .resolve(&registry(), &ResultsStore::empty("unused.txt"))
            .unwrap();
        assert_eq!(numbers(&got), vec![14, 15, 16]);
    }

    fn store_with_history() -> ResultsStore {
        let mut store = ResultsStore::empty("unused.txt");
        store.record(
            &TestIdentifier::new(14, "splitting_by_size"),
            RecordUpdate {
                fingerprint: Some("a".to_string()),
                passed: true,
                duration_secs: None,
            },
        );
        store.record(
            &TestIdentifier::new(47, "X_tags"),
            RecordUpdate {
                fingerprint: Some("b".to_string()),
                passed: false,
                duration_secs: None,
            },
        );
        store
    }

    #[test]
    fn failed_and_new_combine_as_union() {
        let registry = registry();
        let store = store_with_history();

        let failed = RunRequest {
            only_failed: true,
            ..request(&[])
        };
        assert_eq!(numbers(&failed.resolve(&registry, &store).unwrap()), vec![47]);

        let new = RunRequest {
            only_new: true,
            ..request(&[])
        };
        assert_eq!(
            numbers(&new.resolve(&registry, &store).unwrap()),
            vec![15, 16, 18, 217, 256]
        );

        let both = RunRequest {
            only_failed: true,
            only_new: true,
            ..request(&[])
        };
        assert_eq!(
            numbers(&both.resolve(&registry, &store).unwrap()),
            vec![15, 16, 18, 47, 217, 256]
        );
    }

    #[test]
    fn date_bounds_only_filter_recorded_tests() {
        let registry = registry();
        let store = store_with_history();
        let req = RunRequest {
            date_before: Some(parse_date("200001010000").unwrap()),
            ..request(&["014-016"])
        };
        // 014 was recorded just now, so it is after the bound.
        assert_eq!(numbers(&req.resolve(&registry, &store).unwrap()), vec![15, 16]);
    }

    #[test]
    fn dates_accept_both_layouts() {
        let a = parse_date("202401311745").unwrap();
        let b = parse_date("20240131-1745").unwrap();
        assert_eq!(a, b);
        assert!(matches!(parse_date("2024-01-31"), Err(SelectionError::BadDate(_))));
        assert!(parse_date("202413311745").is_err());
    }
}
