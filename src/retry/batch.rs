//! Usage: Chunked batch execution through the retry executor (fail-fast by default).

use std::future::Future;

use crate::retry::{with_retry, RetryPolicy};
use crate::shared::error::{codes, AppError, AppResult};

/// Partitions `items` into contiguous chunks of `batch_size` (the final chunk
/// may be shorter) and runs `op` once per chunk through [`with_retry`].
///
/// The first chunk whose retries are exhausted aborts the whole run and
/// propagates its error; no partial results are returned.
pub async fn run_batched<T, R, F, Fut>(
    items: &[T],
    batch_size: usize,
    policy: RetryPolicy,
    mut op: F,
) -> AppResult<Vec<R>>
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = AppResult<R>>,
{
    if batch_size == 0 {
        return Err(AppError::new(
            codes::SEC_INVALID_INPUT,
            "batch_size must be > 0",
        ));
    }

    let mut results = Vec::with_capacity(items.len().div_ceil(batch_size));
    for (index, chunk) in items.chunks(batch_size).enumerate() {
        let result = with_retry(policy, || op(chunk.to_vec())).await.map_err(
            |err| {
                tracing::warn!(chunk = index, error = %err, "batch chunk failed; aborting run");
                err
            },
        )?;
        results.push(result);
    }

    Ok(results)
}

/// Opt-in variant that keeps going after a failed chunk and returns every
/// chunk's outcome in order. [`run_batched`] stays the default.
pub async fn run_batched_collecting<T, R, F, Fut>(
    items: &[T],
    batch_size: usize,
    policy: RetryPolicy,
    mut op: F,
) -> AppResult<Vec<AppResult<R>>>
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = AppResult<R>>,
{
    if batch_size == 0 {
        return Err(AppError::new(
            codes::SEC_INVALID_INPUT,
            "batch_size must be > 0",
        ));
    }

    let mut outcomes = Vec::with_capacity(items.len().div_ceil(batch_size));
    for chunk in items.chunks(batch_size) {
        outcomes.push(with_retry(policy, || op(chunk.to_vec())).await);
    }

    Ok(outcomes)
}
