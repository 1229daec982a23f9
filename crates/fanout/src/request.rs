use std::{future::Future, pin::Pin};

use tokio_util::sync::CancellationToken;

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// A type-erased operation, as stored in a [`Request`].
pub type BoxOperation<T, E> =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<T, E> + Send + 'static>;

/// An ordered list of operations that may have different concrete types.
///
/// Closures passed to [`FanOut::run`](crate::FanOut::run) directly must all
/// share one type. A `Request` boxes each operation instead, so a timer, a
/// file read and an HTTP call can sit side by side as long as they agree on
/// `T` and `E`.
///
/// ```rust
/// use fanout::Request;
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut request: Request<String, anyhow::Error> = Request::new();
///
/// request.push(|_| async { Ok("static".to_string()) });
/// request.push(|_| async {
///     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
///     Ok("delayed".to_string())
/// });
///
/// let values = fanout::run(request).await?;
/// assert_eq!(values, vec!["static", "delayed"]);
/// # Ok(())
/// # }
/// ```
pub struct Request<T, E> {
    operations: Vec<BoxOperation<T, E>>,
}

impl<T, E> Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            operations: Vec::with_capacity(capacity),
        }
    }

    /// Appends an operation and returns the index its result will occupy.
    pub fn push<F, Fut>(&mut self, f: F) -> usize
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let index = self.operations.len();
        self.operations.push(Box::new(
            move |cancel: CancellationToken| -> BoxFuture<T, E> { Box::pin(f(cancel)) },
        ));
        index
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl<T, E> Default for Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Request<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("operations", &self.operations.len())
            .finish()
    }
}

impl<T, E> IntoIterator for Request<T, E> {
    type Item = BoxOperation<T, E>;
    type IntoIter = std::vec::IntoIter<BoxOperation<T, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<T, E, F, Fut> Extend<F> for Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn extend<I: IntoIterator<Item = F>>(&mut self, iter: I) {
        for f in iter {
            self.push(f);
        }
    }
}

impl<T, E, F, Fut> FromIterator<F> for Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut request = Request::new();
        request.extend(iter);
        request
    }
}
