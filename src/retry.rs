// graph_bulk_importer/src/retry.rs
// Exponential backoff around loader round-trips.

use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, future::retry};
use tracing::warn;

use crate::error::{ImporterError, Result};

/// Upper bound on the time spent retrying one loader round-trip.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(30,);

/// Status prefix Neo4j puts on failures that succeed when replayed, such as
/// deadlocks and leader switches.
const NEO4J_TRANSIENT_STATUS: &str = "Neo.TransientError.";

fn loader_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(MAX_RETRY_WAIT,),
        ..ExponentialBackoff::default()
    }
}

pub async fn execute_with_retry<F, Fut, T,>(operation: F,) -> Result<T,>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, backoff::Error<ImporterError,>,>,>,
{
    retry(loader_backoff(), operation,).await
}

/// Whether replaying the failed round-trip can succeed.
pub fn is_retryable(err: &ImporterError,) -> bool {
    match err {
        ImporterError::Cancelled => false,
        ImporterError::IngestionError(msg,) | ImporterError::DatabaseError(msg,)
            if msg.contains(NEO4J_TRANSIENT_STATUS,) =>
        {
            true
        },
        other => other.is_transient(),
    }
}

pub fn transient_error(err: ImporterError,) -> backoff::Error<ImporterError,> {
    warn!("Loader call failed, retrying for up to {:?}: {}", MAX_RETRY_WAIT, err);
    backoff::Error::transient(err,)
}

pub fn permanent_error(err: ImporterError,) -> backoff::Error<ImporterError,> {
    backoff::Error::permanent(err,)
}

pub fn wrap_error(err: ImporterError,) -> backoff::Error<ImporterError,> {
    if is_retryable(&err,) { transient_error(err,) } else { permanent_error(err,) }
}
