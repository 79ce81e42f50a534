//! Recording data-quality issues on verbatim records.

use std::fmt;

use taxostage_types::{Issue, VerbatimKey};

use crate::error::Result;

/// Destination for data-quality issues detected while storing records.
pub trait IssueSink: Send + Sync + fmt::Debug {
    /// Flags `issues` on the verbatim record `key`.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be updated.
    fn add_issues(&self, key: VerbatimKey, issues: &[Issue]) -> Result<()>;

    /// Flags one issue on `key`, if a key is given.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be updated.
    fn flag(&self, key: Option<VerbatimKey>, issue: Issue) -> Result<()> {
        match key {
            Some(key) => self.add_issues(key, &[issue]),
            None => Ok(()),
        }
    }
}
