// worker thread stuff
use super::panic_handler::PanicHandler;
use super::program::{WorkerContext, WorkerProgram};
use crate::config::PoolConfig;
use crate::error::{Result, TaskError};
use crossbeam_channel::{Receiver, SendError, Sender};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        WorkerId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One task outcome as seen by the coordinator.
///
/// `channel` is the worker whose signal path delivered the report and
/// `reporter` is the identity the report claims. They only differ when a
/// signal is misrouted.
#[derive(Debug)]
pub(crate) struct Report<R> {
    pub channel: WorkerId,
    pub reporter: WorkerId,
    pub outcome: std::result::Result<R, TaskError>,
}

#[derive(Debug)]
pub(crate) enum Signal<R> {
    Report(Report<R>),
    Stop,
}

/// Cheap sending side of a worker, held by the free queue and the pending
/// table.
pub(crate) struct WorkerRef<T> {
    pub id: WorkerId,
    inbox: Sender<T>,
}

impl<T> WorkerRef<T> {
    pub fn post(&self, task: T) -> std::result::Result<(), T> {
        self.inbox.send(task).map_err(|SendError(task)| task)
    }
}

impl<T> Clone for WorkerRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inbox: self.inbox.clone(),
        }
    }
}

impl<T> fmt::Debug for WorkerRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRef").field("id", &self.id).finish()
    }
}

/// Registry entry owning the worker thread.
pub(crate) struct WorkerHandle<T> {
    pub id: WorkerId,
    inbox: Option<Sender<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    pub fn spawn<R: Send + 'static>(
        config: &PoolConfig,
        program: Arc<dyn WorkerProgram<T, R>>,
        signals: Sender<Signal<R>>,
        panics: Arc<PanicHandler>,
    ) -> Result<Self> {
        let id = WorkerId::next();
        let (inbox, tasks) = crossbeam_channel::unbounded();

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread = builder.spawn(move || run(id, program, tasks, signals, panics))?;

        Ok(Self {
            id,
            inbox: Some(inbox),
            thread: Some(thread),
        })
    }

    /// `None` once the worker has been terminated.
    pub fn worker_ref(&self) -> Option<WorkerRef<T>> {
        self.inbox.as_ref().map(|inbox| WorkerRef {
            id: self.id,
            inbox: inbox.clone(),
        })
    }
}

impl<T> WorkerHandle<T> {
    /// Close the inbox. The thread exits once its current task, if any,
    /// returns and every other sender for the inbox is gone.
    pub fn terminate(&mut self) {
        self.inbox.take();
    }

    pub fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

impl<T> fmt::Debug for WorkerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("terminated", &self.inbox.is_none())
            .finish()
    }
}

// main loop
fn run<T: Send + 'static, R: Send + 'static>(
    id: WorkerId,
    program: Arc<dyn WorkerProgram<T, R>>,
    tasks: Receiver<T>,
    signals: Sender<Signal<R>>,
    panics: Arc<PanicHandler>,
) {
    let ctx = WorkerContext::new(id);
    debug!(worker = %id, "worker started");

    for task in tasks.iter() {
        let outcome = match panics.execute(|| program.run(&ctx, task)) {
            Ok(outcome) => outcome,
            Err(info) => Err(TaskError::Panicked(info.message)),
        };

        let report = Report {
            channel: id,
            reporter: id,
            outcome,
        };
        if signals.send(Signal::Report(report)).is_err() {
            warn!(worker = %id, "coordinator gone, dropping result");
            break;
        }
    }

    debug!(worker = %id, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::program::from_fn;
    use std::time::Duration;

    #[test]
    fn test_worker_ids_are_unique() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_worker_reports_under_own_identity() {
        let (signals, reports) = crossbeam_channel::unbounded();
        let program: Arc<dyn WorkerProgram<u32, u32>> =
            Arc::new(from_fn(|_: &WorkerContext, n: u32| Ok(n + 1)));
        let mut handle = WorkerHandle::spawn(
            &PoolConfig::with_workers(1),
            program,
            signals,
            Arc::new(PanicHandler::default()),
        )
        .unwrap();

        handle.worker_ref().unwrap().post(41).unwrap();

        match reports.recv_timeout(Duration::from_secs(5)).unwrap() {
            Signal::Report(report) => {
                assert_eq!(report.channel, handle.id);
                assert_eq!(report.reporter, handle.id);
                assert_eq!(report.outcome, Ok(42));
            }
            Signal::Stop => panic!("unexpected stop"),
        }

        handle.terminate();
        assert!(handle.worker_ref().is_none());
        handle.take_thread().unwrap().join().unwrap();
    }

    #[test]
    fn test_worker_turns_panic_into_error() {
        let (signals, reports) = crossbeam_channel::unbounded();
        let program: Arc<dyn WorkerProgram<u32, u32>> =
            Arc::new(from_fn(|_: &WorkerContext, _: u32| -> std::result::Result<u32, TaskError> {
                panic!("bad input")
            }));
        let mut handle = WorkerHandle::spawn(
            &PoolConfig::with_workers(1),
            program,
            signals,
            Arc::new(PanicHandler::new(crate::executor::PanicStrategy::Isolate)),
        )
        .unwrap();

        handle.worker_ref().unwrap().post(1).unwrap();

        match reports.recv_timeout(Duration::from_secs(5)).unwrap() {
            Signal::Report(report) => {
                assert_eq!(report.outcome, Err(TaskError::Panicked("bad input".into())));
            }
            Signal::Stop => panic!("unexpected stop"),
        }

        handle.terminate();
        handle.take_thread().unwrap().join().unwrap();
    }
}
