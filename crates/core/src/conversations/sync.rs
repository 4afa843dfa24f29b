//! Bounded, best-effort calls into the messaging provider.
//!
//! The local store is authoritative. Provider calls that only mirror local
//! state report their outcome as a [`ProviderSync`] value so callers decide
//! explicitly what to do with a failure instead of detaching a task.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::ports::ProviderError;

#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderSync {
    Synced,
    Failed { reason: String },
}

impl ProviderSync {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

/// Runs a provider call under `limit`. Expiry is reported as
/// [`ProviderError::Timeout`] and is otherwise indistinguishable from any
/// other provider failure.
pub async fn call_with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            operation,
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Bounded call whose failure is logged at `warn` and folded into
/// [`ProviderSync::Failed`].
pub async fn best_effort<F>(
    operation: &'static str,
    limit: Duration,
    conversation_id: &str,
    call: F,
) -> ProviderSync
where
    F: Future<Output = Result<(), ProviderError>>,
{
    match call_with_timeout(operation, limit, call).await {
        Ok(()) => ProviderSync::Synced,
        Err(error) => {
            warn!(
                event_name = "conversations.provider.best_effort_failed",
                operation,
                conversation_id,
                error = %error,
                "provider call failed; local state remains authoritative"
            );
            ProviderSync::Failed { reason: error.to_string() }
        }
    }
}
