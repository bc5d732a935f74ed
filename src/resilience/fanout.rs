//! Fan-out with first-success semantics.

use std::future::Future;

use futures_util::stream::{FuturesUnordered, StreamExt};

/// Outcome of a fan-out where no branch succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllFailed<E> {
    /// One error per branch, in completion order.
    pub errors: Vec<E>,
}

/// Run every future concurrently and return the first `Ok`.
///
/// Branches still pending when one succeeds are dropped; callers that need
/// them to complete pass spawned task handles. If every branch fails, all
/// errors are returned.
pub async fn first_success<T, E, Fut>(
    futures: impl IntoIterator<Item = Fut>,
) -> Result<T, AllFailed<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<Fut> = futures.into_iter().collect();
    let mut errors = Vec::new();

    while let Some(result) = pending.next().await {
        match result {
            Ok(value) => return Ok(value),
            Err(e) => errors.push(e),
        }
    }

    Err(AllFailed { errors })
}
