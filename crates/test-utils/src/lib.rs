//! Shared test utilities for taxostage crates.
//!
//! - [`TestDir`] - Managed temporary directory for store files
//! - [`assert_eventually`] - Poll a condition until it holds or a timeout expires
//! - [`test_staging_config`] - Small batches and short timeouts for pipeline tests
//! - [`fixtures`] - Ready-made names, usages and verbatim rows
//! - [`strategies`] - Proptest generators for domain values
//! - [`init_tracing`] - Route `tracing` output to the test harness

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::TestDir;

mod assertions;
pub use assertions::assert_eventually;

mod config;
pub use config::test_staging_config;

pub mod fixtures;
pub mod strategies;

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_dir_creates_temp_directory() {
        let dir = TestDir::new();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_dir_removed_on_drop() {
        let path = {
            let dir = TestDir::new();
            std::fs::write(dir.graph_file(), b"x").unwrap();
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_dir_staging_layout() {
        let dir = TestDir::new();
        let attempt = dir.staging_dir(42, 1);
        assert!(attempt.ends_with("42/1"));
        assert!(attempt.starts_with(dir.path()));
    }

    #[test]
    fn test_assert_eventually_succeeds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            c.store(5, Ordering::SeqCst);
        });
        assert!(assert_eventually(Duration::from_secs(2), || counter.load(Ordering::SeqCst) == 5));
        handle.join().unwrap();
    }

    #[test]
    fn test_assert_eventually_times_out() {
        assert!(!assert_eventually(Duration::from_millis(30), || false));
    }

    #[test]
    fn test_staging_config_is_small() {
        let config = test_staging_config();
        assert!(config.batch_size <= 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
