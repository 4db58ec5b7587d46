//! Async runtime utilities for Tessera.
//!
//! Provides runtime construction and the bridge from synchronous callers
//! into futures.

use std::future::Future;

use common_error::{TesseraError, TesseraResult};
use tokio::runtime::Runtime;

/// Build a multi-threaded Tokio runtime for driving substrate tasks.
///
/// `worker_threads` of `None` uses one thread per core.
pub fn build_runtime(
    worker_threads: Option<usize>,
    max_blocking_threads: usize,
) -> TesseraResult<Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder
        .enable_all()
        .thread_name("tessera-worker")
        .max_blocking_threads(max_blocking_threads.max(1));
    if let Some(threads) = worker_threads {
        builder.worker_threads(threads.max(1));
    }
    builder
        .build()
        .map_err(|e| TesseraError::InternalError(format!("Failed to create runtime: {e}")))
}

/// Block the current thread on a future.
///
/// Does not need a Tokio context, so it is safe to call from driver threads
/// and from inside blocking task bodies alike.
pub fn block_on<F: Future>(future: F) -> F::Output {
    futures::executor::block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_runtime() {
        let runtime = build_runtime(Some(2), 4).unwrap();
        let value = runtime.block_on(async { 21 * 2 });
        assert_eq!(value, 42);
    }

    #[test]
    fn test_block_on_outside_runtime() {
        assert_eq!(block_on(async { "ready" }), "ready");
    }

    #[test]
    fn test_block_on_spawned_task() {
        let runtime = build_runtime(Some(1), 1).unwrap();
        let handle = runtime.spawn(async { 7 });
        assert_eq!(block_on(handle).unwrap(), 7);
    }
}
