//! The fetch seam between a supervisor and the resource it monitors.

use std::future::Future;
use std::marker::PhantomData;

/// A zero-argument operation that fetches the raw state of a resource.
///
/// The supervisor only distinguishes success from failure; the error is
/// logged and counted.
pub trait Fetcher: Send + Sync + 'static {
    type Output: Send + 'static;

    fn fetch(&self) -> impl Future<Output = anyhow::Result<Self::Output>> + Send;
}

/// A [`Fetcher`] backed by an async closure. See [`fetch_fn`].
pub struct FnFetcher<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

/// Adapt an async closure into a [`Fetcher`].
///
/// ```ignore
/// let fetcher = fetch_fn(move || {
///     let client = client.clone();
///     async move { client.list_queue().await }
/// });
/// ```
pub fn fetch_fn<F, Fut, T>(f: F) -> FnFetcher<F, T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send,
    T: Send + 'static,
{
    FnFetcher {
        f,
        _output: PhantomData,
    }
}

impl<F, Fut, T> Fetcher for FnFetcher<F, T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send,
    T: Send + 'static,
{
    type Output = T;

    fn fetch(&self) -> impl Future<Output = anyhow::Result<T>> + Send {
        (self.f)()
    }
}
