//! Configuration presets for tests.

// Presets are known-valid; a failure here is a bug in the preset.
#![allow(clippy::expect_used)]

use std::time::Duration;

use taxostage_types::StagingConfig;

/// Staging configuration with small batches and a short batch timeout.
///
/// # Panics
///
/// Never in practice; the values are within the validated ranges.
pub fn test_staging_config() -> StagingConfig {
    StagingConfig::builder()
        .batch_size(4)
        .batch_timeout(Duration::from_secs(10))
        .queue_capacity(2)
        .build()
        .expect("valid test staging config")
}
