//! Static table of test cases keyed by identifier.
//!
//! Cases are compiled units registered by name at startup; the registry
//! hands out a fresh instance for every invocation.

use std::collections::BTreeMap;

use regex::Regex;

use crate::case::TestCase;
use crate::error::RegistryError;
use crate::id::TestIdentifier;

/// Constructor of one test case instance.
pub type CaseFactory = fn() -> Box<dyn TestCase>;

#[derive(Default, Clone)]
pub struct Registry {
    cases: BTreeMap<TestIdentifier, CaseFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` (`T_NNNsuffix`). Numbers must be unique.
    pub fn register(&mut self, name: &str, factory: CaseFactory) -> Result<&mut Self, RegistryError> {
        let id: TestIdentifier = name.parse()?;
        if let Some(existing) = self.by_number(id.number()) {
            return Err(RegistryError::DuplicateNumber {
                number: id.number(),
                first: existing.name(),
                second: id.name(),
            });
        }
        self.cases.insert(id, factory);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// All identifiers in numeric order.
    pub fn ids(&self) -> impl Iterator<Item = &TestIdentifier> {
        self.cases.keys()
    }

    pub fn contains(&self, id: &TestIdentifier) -> bool {
        self.cases.contains_key(id)
    }

    pub fn by_number(&self, number: u16) -> Option<&TestIdentifier> {
        self.cases.keys().find(|id| id.number() == number)
    }

    /// Identifiers whose full name matches `re`, in numeric order.
    pub fn matching<'a>(&'a self, re: &'a Regex) -> impl Iterator<Item = &'a TestIdentifier> + 'a {
        self.cases.keys().filter(move |id| re.is_match(&id.name()))
    }

    /// A fresh instance of the case registered as `id`.
    pub fn instantiate(&self, id: &TestIdentifier) -> Option<Box<dyn TestCase>> {
        self.cases.get(id).map(|factory| factory())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.cases.keys().map(|id| id.name())).finish()
    }
}
