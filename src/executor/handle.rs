//! Deferred task results.

use super::worker::WorkerId;
use crate::error::{Error, Result};
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Successful outcome of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<R> {
    pub result: R,
    /// Worker that produced `result`.
    pub worker: WorkerId,
}

/// Caller side of a submission. Settles exactly once.
///
/// A handle whose settling side is dropped without a value (the pool was
/// terminated or dropped while the task waited or ran) resolves to
/// [`Error::Terminated`].
#[derive(Debug)]
#[must_use = "a TaskHandle does nothing unless awaited or waited on"]
pub struct TaskHandle<R> {
    receiver: oneshot::Receiver<Result<Completion<R>>>,
}

impl<R> TaskHandle<R> {
    /// A handle that is already settled with `error`.
    pub(crate) fn rejected(error: Error) -> Self {
        let (resolver, handle) = channel();
        resolver.settle(Err(error));
        handle
    }

    /// Block the current thread until the task settles.
    pub fn wait(self) -> Result<Completion<R>> {
        futures::executor::block_on(self)
    }

    /// Return the outcome if the task has already settled.
    pub fn try_wait(&mut self) -> Option<Result<Completion<R>>> {
        match self.receiver.try_recv() {
            Ok(Some(outcome)) => Some(outcome),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(Error::Terminated)),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<Completion<R>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Terminated)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Settling side of a [`TaskHandle`].
#[derive(Debug)]
pub(crate) struct Resolver<R> {
    sender: oneshot::Sender<Result<Completion<R>>>,
}

impl<R> Resolver<R> {
    pub fn settle(self, outcome: Result<Completion<R>>) {
        // the caller may have dropped its handle
        let _ = self.sender.send(outcome);
    }

    pub fn reject(self, error: Error) {
        self.settle(Err(error));
    }
}

pub(crate) fn channel<R>() -> (Resolver<R>, TaskHandle<R>) {
    let (sender, receiver) = oneshot::channel();
    (Resolver { sender }, TaskHandle { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_handle_yields_completion() {
        let (resolver, handle) = channel();
        resolver.settle(Ok(Completion {
            result: "done",
            worker: WorkerId::from_raw(4),
        }));

        let completion = handle.wait().unwrap();
        assert_eq!(completion.result, "done");
        assert_eq!(completion.worker, WorkerId::from_raw(4));
    }

    #[test]
    fn test_try_wait_before_and_after_settle() {
        let (resolver, mut handle) = channel::<u8>();
        assert!(handle.try_wait().is_none());

        resolver.reject(Error::Saturated { limit: 1 });
        assert!(matches!(
            handle.try_wait(),
            Some(Err(Error::Saturated { limit: 1 }))
        ));
    }

    #[test]
    fn test_dropped_resolver_means_terminated() {
        let (resolver, handle) = channel::<u8>();
        drop(resolver);
        assert!(matches!(handle.wait(), Err(Error::Terminated)));
    }

    #[test]
    fn test_rejected_handle() {
        let handle = TaskHandle::<u8>::rejected(Error::Terminated);
        assert!(matches!(futures::executor::block_on(handle), Err(Error::Terminated)));
    }
}
