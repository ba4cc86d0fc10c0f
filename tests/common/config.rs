//! Test configuration helpers for creating services against a mock endpoint

use std::time::Duration;

use picsync::config::PersistenceConfig;
use picsync::{Config, SyncService};
use tempfile::TempDir;

/// Configuration pointing at `endpoint`, with a database inside `temp_dir`
///
/// Delays are shortened so retries do not slow the suite down.
pub fn test_config(endpoint: &str, temp_dir: &TempDir, target_count: usize) -> Config {
    let mut config = Config {
        persistence: PersistenceConfig {
            database_path: temp_dir.path().join("picsync.db"),
        },
        ..Config::default()
    };
    config.resolver.endpoint = endpoint.to_string();
    config.resolver.max_retries = 1;
    config.resolver.base_delay = Duration::from_millis(1);
    config.resolver.request_timeout = Duration::from_secs(5);
    config.batch.record_max_retries = 0;
    config.batch.retry_delay = Duration::from_millis(1);
    config.batch.network_timeout = Duration::from_secs(10);
    config.sync.target_count = target_count;
    config.sync.retry_backoff = Duration::from_millis(20);
    config
}

/// Create a service with a fresh temp database
///
/// Returns the TempDir alongside so it isn't dropped (and deleted) early.
pub async fn create_test_service(
    endpoint: &str,
    target_count: usize,
) -> Result<(SyncService, TempDir), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let config = test_config(endpoint, &temp_dir, target_count);
    let service = SyncService::new(config).await?;
    Ok((service, temp_dir))
}
