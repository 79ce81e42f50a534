//! Scratch directories for store files.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary scratch directory, removed with everything in it on drop.
///
/// ```
/// use taxostage_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// assert!(dir.graph_file().starts_with(dir.path()));
/// assert!(dir.staging_dir(3, 1).ends_with("3/1"));
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Creates the directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: TempDir::new().expect("failed to create temp directory") }
    }

    /// Root of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// A graph store file directly under the root.
    #[must_use]
    pub fn graph_file(&self) -> PathBuf {
        self.path().join("graph.redb")
    }

    /// An object store file directly under the root.
    #[must_use]
    pub fn objects_file(&self) -> PathBuf {
        self.path().join("objects.redb")
    }

    /// Staging directory of one import attempt, `{dataset}/{attempt}`.
    #[must_use]
    pub fn staging_dir(&self, dataset_key: u32, attempt: u32) -> PathBuf {
        self.path().join(dataset_key.to_string()).join(attempt.to_string())
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
