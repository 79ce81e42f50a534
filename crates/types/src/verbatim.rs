//! Source rows and the issues flagged on them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{record::VerbatimKey, vocab::Issue};

/// An original source row an entity was derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimRecord {
    /// Sequence key, assigned by the verbatim store on first put.
    pub key: Option<VerbatimKey>,
    /// Line number within the source file.
    pub line: u64,
    /// Source file name.
    pub file: Option<String>,
    /// Row type, e.g. `dwc:Taxon`.
    pub row_type: Option<String>,
    /// Raw term values keyed by qualified term name.
    pub terms: BTreeMap<String, String>,
    /// Data-quality issues flagged on this row.
    pub issues: BTreeSet<Issue>,
}

impl VerbatimRecord {
    /// Creates an empty record for a row of `file`.
    pub fn new(line: u64, file: impl Into<String>, row_type: impl Into<String>) -> Self {
        Self {
            line,
            file: Some(file.into()),
            row_type: Some(row_type.into()),
            ..Self::default()
        }
    }

    /// Creates a placeholder for an entity that has no source row.
    pub fn synthetic() -> Self {
        let mut record = Self::default();
        record.issues.insert(Issue::SyntheticRecord);
        record
    }

    /// Sets a term value.
    pub fn insert(&mut self, term: impl Into<String>, value: impl Into<String>) {
        self.terms.insert(term.into(), value.into());
    }

    /// Returns a term value, ignoring blank values.
    pub fn get(&self, term: &str) -> Option<&str> {
        self.terms.get(term).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// Flags an issue.
    pub fn add_issue(&mut self, issue: Issue) {
        self.issues.insert(issue);
    }

    /// Returns true if the issue is flagged.
    pub fn has_issue(&self, issue: Issue) -> bool {
        self.issues.contains(&issue)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_terms_read_as_absent() {
        let mut v = VerbatimRecord::new(7, "taxa.txt", "dwc:Taxon");
        v.insert("dwc:scientificName", "Abies alba");
        v.insert("dwc:parentNameUsageID", "   ");
        assert_eq!(v.get("dwc:scientificName"), Some("Abies alba"));
        assert_eq!(v.get("dwc:parentNameUsageID"), None);
        assert_eq!(v.get("dwc:missing"), None);
    }

    #[test]
    fn test_synthetic_record_is_flagged() {
        let v = VerbatimRecord::synthetic();
        assert!(v.has_issue(Issue::SyntheticRecord));
        assert_eq!(v.key, None);
    }
}
