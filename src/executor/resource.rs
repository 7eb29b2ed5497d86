//! Binding between one in-flight task and the worker running it.

use super::worker::WorkerId;
use crate::error::TaskError;
use std::fmt;
use tracing::debug;

type Done<R> = Box<dyn FnOnce(WorkerId, Result<R, TaskError>) + Send>;

/// Created when a task is dispatched, consumed when the worker reports.
/// The pool keeps at most one live resource per worker.
pub(crate) struct TaskResource<R> {
    worker: WorkerId,
    done: Option<Done<R>>,
}

impl<R> TaskResource<R> {
    pub fn new<F>(worker: WorkerId, done: F) -> Self
    where
        F: FnOnce(WorkerId, Result<R, TaskError>) + Send + 'static,
    {
        Self {
            worker,
            done: Some(Box::new(done)),
        }
    }

    /// Worker this task was dispatched to.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn is_settled(&self) -> bool {
        self.done.is_none()
    }

    /// Run the completion callback with the outcome `reporter` signalled.
    /// Only the first call has any effect; later calls return `false`.
    pub fn complete(&mut self, reporter: WorkerId, outcome: Result<R, TaskError>) -> bool {
        match self.done.take() {
            Some(done) => {
                done(reporter, outcome);
                true
            }
            None => {
                debug!(
                    worker = %self.worker,
                    reporter = %reporter,
                    "task already settled, ignoring"
                );
                false
            }
        }
    }
}

impl<R> fmt::Debug for TaskResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskResource")
            .field("worker", &self.worker)
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Calls = Arc<Mutex<Vec<(WorkerId, Result<u32, TaskError>)>>>;

    fn recording(worker: WorkerId) -> (TaskResource<u32>, Calls) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let resource = TaskResource::new(worker, move |reporter, outcome| {
            sink.lock().push((reporter, outcome));
        });
        (resource, calls)
    }

    #[test]
    fn test_complete_runs_callback_once() {
        let worker = WorkerId::from_raw(1);
        let (mut resource, calls) = recording(worker);

        assert!(!resource.is_settled());
        assert!(resource.complete(worker, Ok(5)));
        assert!(resource.is_settled());

        assert!(!resource.complete(worker, Ok(6)));
        assert!(!resource.complete(worker, Err(TaskError::failed("late"))));

        assert_eq!(*calls.lock(), vec![(worker, Ok(5))]);
    }

    #[test]
    fn test_complete_forwards_error_and_reporter() {
        let worker = WorkerId::from_raw(2);
        let other = WorkerId::from_raw(3);
        let (mut resource, calls) = recording(worker);

        assert_eq!(resource.worker(), worker);
        assert!(resource.complete(other, Err(TaskError::failed("boom"))));
        assert_eq!(*calls.lock(), vec![(other, Err(TaskError::failed("boom")))]);
    }
}
