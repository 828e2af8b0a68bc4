//! One-shot completion handle for gateway operations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::backend::BackendError;
use crate::{Error, Result};

/// Outcome of a submitted gateway operation.
///
/// Resolves exactly once, with success or a typed failure. Dropping the
/// handle does not cancel the operation; it keeps running and still
/// updates the store.
#[derive(Debug)]
#[must_use = "drop the completion explicitly to fire and forget"]
pub struct Completion<T> {
    operation: &'static str,
    rx: oneshot::Receiver<Result<T>>,
}

/// Sending half of a [`Completion`]. Consumed on use.
#[derive(Debug)]
pub(crate) struct Resolver<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Resolver<T> {
    pub(crate) fn resolve(self, result: Result<T>) {
        // The caller may have dropped the completion; that is fine.
        let _ = self.tx.send(result);
    }
}

impl<T> Completion<T> {
    pub(crate) fn channel(operation: &'static str) -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Resolver { tx }, Self { operation, rx })
    }

    /// A completion that is already resolved.
    pub fn ready(operation: &'static str, result: Result<T>) -> Self {
        let (resolver, completion) = Self::channel(operation);
        resolver.resolve(result);
        completion
    }

    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Take the result if it is already available.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(self.abandoned())),
        }
    }

    fn abandoned(&self) -> Error {
        Error::remote(
            self.operation,
            BackendError::Unavailable("operation ended without reporting a result".to_string()),
        )
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(this.abandoned())),
            Poll::Pending => Poll::Pending,
        }
    }
}
