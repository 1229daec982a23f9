//! # fanout
//!
//! A small Rust crate for running an ordered set of independent asynchronous operations
//! concurrently on Tokio and joining them at a single point.
//!
//! It is the "start every download, then wait for all of them" pattern: each operation
//! gets its own task, the caller suspends once, and the results come back in the order
//! the operations were submitted, never in the order they happened to finish.
//!
//! ## Overview
//!
//! * **Ordered results** - result `i` always belongs to operation `i`
//! * **Deterministic errors** - when several operations fail, the lowest index wins
//! * **All or nothing** - either every value, or exactly one error
//! * **Cooperative cancellation** - external tokens, cancel tasks and timeouts
//! * **Bounded or unbounded concurrency** - control how many operations run at once
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use fanout::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let delays = [("a", 50), ("b", 10), ("c", 30)];
//!
//!     let values = fanout::run(delays.map(|(value, delay)| {
//!         move |_cancel: CancellationToken| async move {
//!             tokio::time::sleep(Duration::from_millis(delay)).await;
//!             Ok::<_, anyhow::Error>(value)
//!         }
//!     }))
//!     .await?;
//!
//!     // "b" finished first, but order follows submission
//!     assert_eq!(values, vec!["a", "b", "c"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! An operation is any `FnOnce(CancellationToken) -> impl Future<Output = Result<T, E>>`.
//! Operations must not depend on each other's results. The token each one receives is
//! a stop request: it fires when the fan-out is cancelled, when the call is dropped or
//! unwinds, or (opt-in) when a sibling fails. Operations are free to ignore it.
//!
//! Closures passed straight to [`run`] must share one type. Use a [`Request`] to mix
//! differently-shaped operations that agree on `T` and `E`.
//!
//! ### Error Handling
//!
//! A fan-out always waits for every operation to settle before deciding. If any failed,
//! the error of the lowest-index failure is returned as [`FanOutError::OperationFailed`],
//! even if a later operation failed earlier in wall-clock time. Use [`FanOut::settle`]
//! when every error matters.
//!
//! ```rust
//! use fanout::{FanOutError, Request};
//!
//! # async fn example() {
//! let mut request: Request<u32, String> = Request::new();
//! request.push(|_| async { Ok(1) });
//! request.push(|_| async { Err("boom".to_string()) });
//! request.push(|_| async { Ok(3) });
//!
//! match fanout::run(request).await {
//!     Err(FanOutError::OperationFailed { index, error }) => {
//!         assert_eq!(index, 1);
//!         assert_eq!(error, "boom");
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! # }
//! ```
//!
//! ### Cancellation
//!
//! A [`FanOut`] can be tied to an external `CancellationToken`, to a task that cancels
//! it when done, or to a timeout. If the signal fires before every operation settled,
//! the call returns [`FanOutError::Cancelled`], completed results are discarded and
//! in-flight operations are asked to stop.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use fanout::{CancellationToken, FanOut};
//!
//! # async fn example() {
//! let mut fanout = FanOut::new();
//! fanout.with_timeout(Duration::from_millis(100));
//!
//! let result = fanout
//!     .run((0..3).map(|i| {
//!         move |stop: CancellationToken| async move {
//!             tokio::select! {
//!                 _ = tokio::time::sleep(Duration::from_secs(10)) => Ok::<_, anyhow::Error>(i),
//!                 _ = stop.cancelled() => Ok(i),
//!             }
//!         }
//!     }))
//!     .await;
//!
//! assert!(result.unwrap_err().is_cancelled());
//! # }
//! ```
//!
//! ## Examples
//!
//! See the `examples/` directory for complete programs:
//!
//! * `basic.rs` - ordered results from operations finishing out of order
//! * `error_handling.rs` - lowest-index error selection and inspecting every error
//! * `cancellation.rs` - tokens, cancel tasks, timeouts and cancel-on-error
//! * `with_limit.rs` - bounded concurrency
//! * `retry_with_backoff.rs` - wrapping flaky operations in a retry decorator
//! * `downloads.rs` - downloading several documents concurrently

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
pub use tokio_util::sync::CancellationToken;

mod error;
mod request;
mod settled;

pub use error::{Cancelled, FanOutError};
pub use request::{BoxOperation, Request};
pub use settled::Settled;

/// Extension traits for common patterns.
///
/// This module provides convenient extension methods for [`FanOut`] through traits.
pub mod extensions {
    use crate::FanOut;

    /// Extension trait for CPU-based concurrency limits.
    pub trait WithSysLimitCpus {
        /// Limits the fan-out to the number of available CPU cores.
        ///
        /// Falls back to a single operation at a time if the available
        /// parallelism cannot be determined.
        ///
        /// ```rust
        /// use fanout::FanOut;
        /// use fanout::extensions::WithSysLimitCpus;
        ///
        /// let mut fanout = FanOut::new();
        /// fanout.with_limit_to_system_cpus();
        /// ```
        fn with_limit_to_system_cpus(&mut self) -> &mut Self;
    }

    impl WithSysLimitCpus for FanOut {
        fn with_limit_to_system_cpus(&mut self) -> &mut Self {
            self.with_limit(
                std::thread::available_parallelism()
                    .map(usize::from)
                    .unwrap_or(1),
            )
        }
    }
}

/// Configuration for running groups of operations concurrently.
///
/// A `FanOut` holds no operations itself; it is reusable and every call to
/// [`run`](Self::run) or [`settle`](Self::settle) consumes its own set of operations.
/// Clones share the concurrency limit and the cancellation signal.
///
/// # Examples
///
/// ```rust
/// use fanout::{CancellationToken, FanOut};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut fanout = FanOut::new();
/// fanout.with_limit(3);
///
/// let squares = fanout
///     .run((0..10u64).map(|i| {
///         move |_cancel: CancellationToken| async move { Ok::<_, anyhow::Error>(i * i) }
///     }))
///     .await?;
///
/// assert_eq!(squares[9], 81);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FanOut {
    limit: OperationLimit,
    timeout: Option<Duration>,
    cancel_on_error: bool,

    cancellation: CancellationToken,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
enum OperationLimit {
    #[default]
    NoLimit,
    Amount(Arc<Semaphore>),
}

impl OperationLimit {
    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match self {
            OperationLimit::NoLimit => None,
            // never closed, so acquiring cannot fail
            OperationLimit::Amount(permits) => permits.clone().acquire_owned().await.ok(),
        }
    }
}

impl FanOut {
    /// Creates a fan-out with no concurrency limit, no timeout and no cancellation.
    pub fn new() -> Self {
        Self {
            limit: OperationLimit::default(),
            timeout: None,
            cancel_on_error: false,
            cancellation: CancellationToken::default(),
        }
    }

    /// Associates an external cancellation token with this fan-out.
    ///
    /// The fan-out listens on a child of the provided token, so cancelling the
    /// parent cancels in-flight calls while nothing done here affects the parent.
    ///
    /// Do not combine with [`with_cancel_task`](Self::with_cancel_task); the later
    /// call replaces the signal the earlier one set up.
    ///
    /// ```rust
    /// use fanout::{CancellationToken, FanOut};
    ///
    /// let shutdown = CancellationToken::new();
    ///
    /// let mut fanout = FanOut::new();
    /// fanout.with_cancel(&shutdown);
    /// ```
    pub fn with_cancel(&mut self, cancel: &CancellationToken) -> &mut Self {
        self.cancellation = cancel.child_token();
        self
    }

    /// Spawns a task that cancels the fan-out when it completes.
    ///
    /// The task starts immediately, not when a fan-out runs, and cancels every
    /// later call once it has finished.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_cancel_task<T>(&mut self, f: T) -> &mut Self
    where
        T: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancellation.clone();

        tokio::spawn(async move {
            f.await;
            cancel.cancel();
        });
        self
    }

    /// Cancels each call that has not settled within `timeout` of its start.
    ///
    /// A timeout is reported as [`FanOutError::Cancelled`].
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how many operations may execute at the same time.
    ///
    /// Every operation is still spawned up front; the ones over the limit wait for a
    /// slot before their body starts. A stopped fan-out still lets queued operations
    /// start, so they should check their token. A limit of zero is treated as one.
    ///
    /// The limit is shared by clones of this `FanOut` and by concurrent calls.
    pub fn with_limit(&mut self, limit: usize) -> &mut Self {
        self.limit = OperationLimit::Amount(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    /// Signals every operation's stop token as soon as one operation fails.
    ///
    /// The call still waits for all operations, and the returned error is still
    /// the lowest-index failure.
    pub fn with_cancel_on_error(&mut self) -> &mut Self {
        self.cancel_on_error = true;
        self
    }

    /// Runs every operation concurrently and returns their values in submission order.
    ///
    /// Returns the error of the lowest-index failing operation if any failed, or
    /// [`FanOutError::Cancelled`] if the fan-out was cancelled first. An empty input
    /// returns `Ok(vec![])` without spawning anything.
    ///
    /// A panicking operation resumes its panic on the caller.
    pub async fn run<T, E, F, Fut>(
        &self,
        operations: impl IntoIterator<Item = F>,
    ) -> Result<Vec<T>, FanOutError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.settle(operations).await?.into_result()
    }

    /// Runs every operation concurrently and returns each individual outcome.
    ///
    /// Like [`run`](Self::run), but keeps every success and every failure,
    /// in submission order.
    pub async fn settle<T, E, F, Fut>(
        &self,
        operations: impl IntoIterator<Item = F>,
    ) -> Result<Settled<T, E>, Cancelled>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let operations: Vec<F> = operations.into_iter().collect();
        if operations.is_empty() {
            return Ok(Settled::new(Vec::new()));
        }

        if self.cancellation.is_cancelled() {
            tracing::debug!(
                operations = operations.len(),
                "fan-out cancelled before start"
            );
            return Err(Cancelled);
        }

        tracing::debug!(operations = operations.len(), "starting fan-out");

        // fired only once this call has decided, or is dropped or unwinding
        let stop = CancellationToken::new();
        let _stop_guard = stop.clone().drop_guard();

        let handles: Vec<_> = operations
            .into_iter()
            .enumerate()
            .map(|(index, f)| self.spawn(index, f, &stop))
            .collect();

        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            outcomes = join_in_order(handles) => outcomes.map(Settled::new),
            _ = self.cancellation.cancelled() => Err(Cancelled),
            _ = deadline => {
                tracing::debug!(timeout = ?self.timeout, "fan-out timed out");
                Err(Cancelled)
            }
        };

        if outcome.is_err() {
            tracing::debug!("fan-out cancelled, stopping in-flight operations");
        }

        outcome
    }

    fn spawn<T, E, F, Fut>(
        &self,
        index: usize,
        f: F,
        stop: &CancellationToken,
    ) -> JoinHandle<Result<T, E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let limit = self.limit.clone();
        let cancel_on_error = self.cancel_on_error;
        let stop = stop.clone();

        tokio::spawn(async move {
            let permit = limit.acquire().await;
            tracing::trace!(index, "operation started");

            let outcome = f(stop.child_token()).await;
            match &outcome {
                Ok(_) => tracing::trace!(index, "operation finished"),
                Err(_) => {
                    tracing::debug!(index, "operation failed");
                    if cancel_on_error {
                        stop.cancel();
                    }
                }
            }

            drop(permit);
            outcome
        })
    }
}

async fn join_in_order<T, E>(
    handles: Vec<JoinHandle<Result<T, E>>>,
) -> Result<Vec<Result<T, E>>, Cancelled> {
    let mut outcomes = Vec::with_capacity(handles.len());

    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // the runtime is shutting down and took the task with it
            Err(_) => return Err(Cancelled),
        }
    }

    Ok(outcomes)
}

/// Runs every operation concurrently with the default [`FanOut`] configuration.
///
/// See [`FanOut::run`].
pub async fn run<T, E, F, Fut>(
    operations: impl IntoIterator<Item = F>,
) -> Result<Vec<T>, FanOutError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    FanOut::new().run(operations).await
}

/// Settles every operation concurrently with the default [`FanOut`] configuration.
///
/// See [`FanOut::settle`].
pub async fn settle<T, E, F, Fut>(
    operations: impl IntoIterator<Item = F>,
) -> Result<Settled<T, E>, Cancelled>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    FanOut::new().settle(operations).await
}
