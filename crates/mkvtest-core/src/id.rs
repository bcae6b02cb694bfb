//! Test identifiers: `T_<NNN><suffix>`, ordered numerically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one test case, e.g. `T_014splitting_by_size`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestIdentifier {
    number: u16,
    suffix: String,
}

impl TestIdentifier {
    pub fn new(number: u16, suffix: impl Into<String>) -> Self {
        Self {
            number,
            suffix: suffix.into(),
        }
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Zero-padded three digit form, e.g. `014`.
    pub fn padded(&self) -> String {
        format!("{:03}", self.number)
    }

    /// Full name used as the results key, e.g. `T_014splitting_by_size`.
    pub fn name(&self) -> String {
        format!("T_{:03}{}", self.number, self.suffix)
    }
}

impl Ord for TestIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.suffix.cmp(&other.suffix))
    }
}

impl PartialOrd for TestIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T_{:03}{}", self.number, self.suffix)
    }
}

/// Error for names that do not look like `T_<digits><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a test name: {0}")]
pub struct InvalidTestName(pub String);

impl FromStr for TestIdentifier {
    type Err = InvalidTestName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTestName(s.to_string());
        let rest = s.strip_prefix("T_").ok_or_else(invalid)?;
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid());
        }
        let number = rest[..digits].parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(number, &rest[digits..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip() {
        let id: TestIdentifier = "T_014splitting_by_size".parse().unwrap();
        assert_eq!(id.number(), 14);
        assert_eq!(id.suffix(), "splitting_by_size");
        assert_eq!(id.padded(), "014");
        assert_eq!(id.name(), "T_014splitting_by_size");
        assert_eq!(id.to_string(), id.name());
    }

    #[test]
    fn ordering_is_numeric() {
        let mut ids: Vec<TestIdentifier> = ["T_217file_identification", "T_047X_tags", "T_014splitting_by_size", "T_1000late"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        ids.sort();
        let numbers: Vec<u16> = ids.iter().map(TestIdentifier::number).collect();
        assert_eq!(numbers, vec![14, 47, 217, 1000]);
    }

    #[test]
    fn rejects_foreign_names() {
        assert!("014splitting".parse::<TestIdentifier>().is_err());
        assert!("T_splitting".parse::<TestIdentifier>().is_err());
    }
}
