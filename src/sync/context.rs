//! Shared state threaded through one sync pass.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::resolver::UrlResolver;
use crate::store::RecordStore;

use super::progress::ProgressSink;

/// Collaborators and settings of a [`SyncTask`](super::SyncTask)
#[derive(Clone)]
pub(crate) struct SyncContext {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) resolver: Arc<dyn UrlResolver>,
    pub(crate) progress: Arc<dyn ProgressSink>,
    pub(crate) config: Arc<Config>,
    pub(crate) cancel_token: CancellationToken,
}
