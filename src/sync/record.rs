//! Resolution of a single record with an outer retry loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;
use crate::error::Error;
use crate::resolver::UrlResolver;
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::types::RecordId;

use super::outcome::RecordOutcome;

/// Retry and timeout settings for per-record work, derived from [`BatchConfig`]
#[derive(Clone, Debug)]
pub(super) struct RecordSettings {
    pub(super) policy: RetryPolicy,
    pub(super) network_timeout: Duration,
}

impl RecordSettings {
    pub(super) fn from_config(config: &BatchConfig) -> Self {
        Self {
            policy: RetryPolicy::fixed(config.record_max_retries, config.retry_delay),
            network_timeout: config.network_timeout,
        }
    }
}

/// Parameters for [`process_record`].
pub(super) struct ProcessRecordParams {
    pub(super) resolver: Arc<dyn UrlResolver>,
    pub(super) settings: RecordSettings,
    pub(super) cancel_token: CancellationToken,
    pub(super) position: usize,
    pub(super) id: RecordId,
}

/// Resolve one record, retrying whole resolutions with a fixed delay
///
/// Never fails: every error ends up in the returned [`RecordOutcome::Failure`].
pub(super) async fn process_record(params: ProcessRecordParams) -> RecordOutcome {
    let ProcessRecordParams {
        resolver,
        settings,
        cancel_token,
        position,
        id,
    } = params;
    let network_timeout = settings.network_timeout;

    let attempt = || {
        let resolver = Arc::clone(&resolver);
        async move {
            match tokio::time::timeout(network_timeout, resolver.resolve()).await {
                Ok(Ok(url)) => Ok(url),
                Ok(Err(e)) => Err(Error::Resolve(e)),
                Err(_) => Err(Error::Timeout {
                    operation: "record attempt",
                    elapsed: network_timeout,
                }),
            }
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => Err(Error::Cancelled),
        result = retry_with_policy(&settings.policy, attempt) => result,
    };

    match result {
        Ok(url) => {
            tracing::debug!(record_id = id.0, position, url = %url, "Record resolved");
            RecordOutcome::success(position, id, url)
        }
        Err(e) => {
            if e.is_cancelled() {
                tracing::debug!(record_id = id.0, position, "Record cancelled");
            } else {
                tracing::warn!(
                    record_id = id.0,
                    position,
                    error = %e,
                    "Record failed after all attempts"
                );
            }
            RecordOutcome::failure(position, id, e)
        }
    }
}
