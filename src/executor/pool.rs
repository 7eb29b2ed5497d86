//! Fixed-size pool of worker threads.
//!
//! Bookkeeping (free queue, pending table, registry, waiters) sits behind a
//! single lock. Worker reports are funnelled through one channel into a
//! coordinator thread that handles them one at a time. Pool signals are
//! emitted only after the lock is released, so listeners may call back
//! into the pool.

use super::handle::{self, Completion, Resolver, TaskHandle};
use super::panic_handler::PanicHandler;
use super::program::{ProgramRegistry, WorkerProgram};
use super::resource::TaskResource;
use super::worker::{Report, Signal, WorkerHandle, WorkerId, WorkerRef};
use crate::config::{FailurePolicy, PoolConfig, WaitPolicy};
use crate::error::{Error, Result, TaskError};
use crate::events::{EventBus, ListenerId};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Names of the signals a pool emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
    Create,
    Error,
    Free,
}

/// Payload delivered to pool signal listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSignal {
    Created(WorkerId),
    Error(WorkerId, TaskError),
    Free(WorkerId),
}

impl PoolSignal {
    pub fn worker(&self) -> WorkerId {
        match self {
            PoolSignal::Created(id) | PoolSignal::Error(id, _) | PoolSignal::Free(id) => *id,
        }
    }
}

struct Binding<T, R> {
    worker: WorkerRef<T>,
    resource: TaskResource<R>,
}

struct Waiter<T, R> {
    task: T,
    resolver: Resolver<R>,
}

struct PoolState<T, R> {
    free: VecDeque<WorkerRef<T>>,
    pending: HashMap<WorkerId, Binding<T, R>>,
    registry: HashMap<WorkerId, WorkerHandle<T>>,
    retired: Vec<WorkerId>,
    // WaitPolicy::Fifo
    waiting: VecDeque<Waiter<T, R>>,
    // WaitPolicy::Signal, keyed by ticket
    parked: HashMap<u64, ListenerId>,
    next_ticket: u64,
    terminated: bool,
}

impl<T, R> PoolState<T, R> {
    fn waiting_len(&self) -> usize {
        self.waiting.len() + self.parked.len()
    }
}

struct PoolInner<T, R> {
    state: Mutex<PoolState<T, R>>,
    events: EventBus<PoolEvent, PoolSignal>,
    signals: Sender<Signal<R>>,
    panics: Arc<PanicHandler>,
    config: PoolConfig,
}

/// A fixed set of workers running one program.
///
/// [`submit`](WorkerPool::submit) never blocks: it hands back a
/// [`TaskHandle`] that settles when the worker the task landed on reports.
/// Dropping the pool terminates it and joins every worker thread, which
/// waits for programs that are still running.
pub struct WorkerPool<T, R> {
    inner: Arc<PoolInner<T, R>>,
    coordinator: Option<JoinHandle<()>>,
}

impl<T, R> WorkerPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<P>(program: P, config: &PoolConfig) -> Result<Self>
    where
        P: WorkerProgram<T, R>,
    {
        Self::with_program(Arc::new(program), config)
    }

    /// Build a pool running the program registered under `name`.
    pub fn from_registry(
        registry: &ProgramRegistry<T, R>,
        name: &str,
        config: &PoolConfig,
    ) -> Result<Self> {
        let program = registry.resolve(name)?;
        Self::with_program(program, config)
    }

    /// Spawn the workers for `program`.
    ///
    /// Each worker emits `create` and then `free` while the pool is being
    /// built, before the caller holds the pool, so these construction
    /// signals reach no listener. Listeners registered afterwards see `free`
    /// and `error` for completed tasks only.
    pub fn with_program(
        program: Arc<dyn WorkerProgram<T, R>>,
        config: &PoolConfig,
    ) -> Result<Self> {
        config.validate()?;
        let num_workers = config.worker_count();

        let (signals, reports) = crossbeam_channel::unbounded();
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                free: VecDeque::with_capacity(num_workers),
                pending: HashMap::with_capacity(num_workers),
                registry: HashMap::with_capacity(num_workers),
                retired: Vec::new(),
                waiting: VecDeque::new(),
                parked: HashMap::new(),
                next_ticket: 0,
                terminated: false,
            }),
            events: EventBus::new(),
            signals,
            panics: Arc::new(PanicHandler::new(config.panic_strategy)),
            config: config.clone(),
        });

        let coordinator = {
            let inner = inner.clone();
            thread::Builder::new()
                .name(format!("{}-coordinator", config.thread_name_prefix))
                .spawn(move || inner.coordinate(reports))?
        };

        let mut pool = Self {
            inner,
            coordinator: Some(coordinator),
        };

        for _ in 0..num_workers {
            // on failure `pool` drops here and tears down what was built
            pool.build_worker(program.clone())?;
        }

        info!(workers = num_workers, "worker pool started");
        Ok(pool)
    }

    fn build_worker(&mut self, program: Arc<dyn WorkerProgram<T, R>>) -> Result<()> {
        let handle = WorkerHandle::spawn(
            &self.inner.config,
            program,
            self.inner.signals.clone(),
            self.inner.panics.clone(),
        )?;
        let id = handle.id;
        self.inner.events.emit(&PoolEvent::Create, &PoolSignal::Created(id));

        {
            let mut state = self.inner.state.lock();
            if let Some(worker) = handle.worker_ref() {
                state.free.push_back(worker);
            }
            state.registry.insert(id, handle);
        }

        debug!(worker = %id, "worker created");
        self.inner.events.emit(&PoolEvent::Free, &PoolSignal::Free(id));
        Ok(())
    }

    /// Hand `task` to a free worker, or queue it until one frees up.
    pub fn submit(&self, task: T) -> TaskHandle<R> {
        if self.inner.state.lock().terminated {
            return TaskHandle::rejected(Error::Terminated);
        }
        let (resolver, handle) = handle::channel();
        self.inner.dispatch(task, resolver);
        handle
    }

    /// Terminate every worker, busy or not. Tasks still waiting or running
    /// resolve to [`Error::Terminated`]; later submissions are rejected the
    /// same way. Running programs are not interrupted: each worker thread
    /// exits once its current task returns, and its result is discarded.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminated
    }

    pub fn on<F>(&self, event: PoolEvent, listener: F) -> ListenerId
    where
        F: Fn(&PoolSignal) + Send + Sync + 'static,
    {
        self.inner.events.on(event, listener)
    }

    pub fn once<F>(&self, event: PoolEvent, listener: F) -> ListenerId
    where
        F: FnOnce(&PoolSignal) + Send + 'static,
    {
        self.inner.events.once(event, listener)
    }

    pub fn off(&self, event: PoolEvent, id: ListenerId) -> bool {
        self.inner.events.off(&event, id)
    }

    /// Identities of every worker the pool created, sorted.
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut ids: Vec<_> = self.inner.state.lock().registry.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn num_workers(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    pub fn free_workers(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    pub fn busy_workers(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Workers taken out of service after reporting an error.
    pub fn retired_workers(&self) -> Vec<WorkerId> {
        self.inner.state.lock().retired.clone()
    }

    /// Submissions currently waiting for a free worker.
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiting_len()
    }

    pub fn panic_count(&self) -> usize {
        self.inner.panics.panic_count()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, report: Report<R>) {
        let _ = self.inner.signals.send(Signal::Report(report));
    }
}

impl<T, R> PoolInner<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn dispatch(self: &Arc<Self>, task: T, resolver: Resolver<R>) {
        let state = self.state.lock();
        self.dispatch_locked(state, task, resolver, false);
    }

    /// `readmit` marks a parked submission coming back from its `free`
    /// listener; it was admitted once and is never rejected as saturated.
    fn dispatch_locked(
        self: &Arc<Self>,
        mut state: MutexGuard<'_, PoolState<T, R>>,
        task: T,
        resolver: Resolver<R>,
        readmit: bool,
    ) {
        if state.terminated {
            drop(state);
            resolver.reject(Error::Terminated);
            return;
        }

        // under Fifo, newcomers never overtake queued submissions
        let backlog = self.config.wait_policy == WaitPolicy::Fifo && !state.waiting.is_empty();

        let (mut task, mut resolver) = (task, resolver);
        if !backlog {
            while let Some(worker) = state.free.pop_front() {
                match self.assign(&mut state, worker, task, resolver) {
                    None => return,
                    Some((t, r)) => {
                        task = t;
                        resolver = r;
                    }
                }
            }
        }

        self.park(state, task, resolver, readmit);
    }

    /// Queue a submission that found no free worker.
    fn park(
        self: &Arc<Self>,
        mut state: MutexGuard<'_, PoolState<T, R>>,
        task: T,
        resolver: Resolver<R>,
        readmit: bool,
    ) {
        if let Some(limit) = self.config.max_pending.filter(|_| !readmit) {
            if state.waiting_len() >= limit {
                drop(state);
                warn!(limit, "rejecting submission, too many waiting");
                resolver.reject(Error::Saturated { limit });
                return;
            }
        }

        match self.config.wait_policy {
            WaitPolicy::Fifo => state.waiting.push_back(Waiter { task, resolver }),
            WaitPolicy::Signal => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;

                let pool = Arc::downgrade(self);
                let listener = self.events.once(PoolEvent::Free, move |_| {
                    retry(pool, ticket, task, resolver);
                });
                state.parked.insert(ticket, listener);
            }
        }

        debug!(waiting = state.waiting_len(), "all workers busy, submission queued");
    }

    /// Send `task` to `worker` and bind it. Hands the task back if the
    /// worker's inbox is closed; that worker is retired.
    fn assign(
        &self,
        state: &mut PoolState<T, R>,
        worker: WorkerRef<T>,
        task: T,
        resolver: Resolver<R>,
    ) -> Option<(T, Resolver<R>)> {
        let id = worker.id;
        if let Err(task) = worker.post(task) {
            warn!(worker = %id, "worker inbox closed, retiring");
            state.retired.push(id);
            return Some((task, resolver));
        }

        let resource = TaskResource::new(id, move |reporter, outcome| {
            let settled = if reporter != id {
                Err(Error::IdentityMismatch {
                    expected: id,
                    actual: reporter,
                })
            } else {
                match outcome {
                    Ok(result) => Ok(Completion {
                        result,
                        worker: reporter,
                    }),
                    Err(source) => Err(Error::Task {
                        worker: reporter,
                        source,
                    }),
                }
            };
            resolver.settle(settled);
        });

        debug_assert!(!state.pending.contains_key(&id));
        state.pending.insert(id, Binding { worker, resource });
        debug!(worker = %id, "task dispatched");
        None
    }

    /// Serve queued submissions in arrival order while workers are free.
    fn serve_waiting(&self, state: &mut PoolState<T, R>) {
        while !state.waiting.is_empty() {
            let Some(worker) = state.free.pop_front() else {
                break;
            };
            let Some(Waiter { task, resolver }) = state.waiting.pop_front() else {
                state.free.push_front(worker);
                break;
            };
            if let Some((task, resolver)) = self.assign(state, worker, task, resolver) {
                state.waiting.push_front(Waiter { task, resolver });
            }
        }
    }

    fn coordinate(self: Arc<Self>, reports: Receiver<Signal<R>>) {
        for signal in reports.iter() {
            match signal {
                Signal::Report(report) => self.handle_report(report),
                Signal::Stop => break,
            }
        }
        debug!("coordinator stopped");
    }

    fn handle_report(&self, report: Report<R>) {
        let Report {
            channel,
            reporter,
            outcome,
        } = report;

        let mut state = self.state.lock();
        if state.terminated {
            debug!(worker = %channel, "discarding report after termination");
            return;
        }

        let Some(Binding { worker, mut resource }) = state.pending.remove(&channel) else {
            warn!(worker = %channel, "report from a worker with no pending task");
            return;
        };

        let mismatched = reporter != resource.worker();
        let error = outcome.as_ref().err().cloned();
        let recycle = !mismatched
            && (error.is_none() || self.config.failure_policy == FailurePolicy::Recycle);

        let freed = if recycle {
            state.free.push_back(worker);
            self.serve_waiting(&mut state);
            Some(channel)
        } else {
            warn!(
                worker = %channel,
                remaining = state.registry.len().saturating_sub(state.retired.len() + 1),
                "retiring worker"
            );
            state.retired.push(channel);
            None
        };
        drop(state);

        if mismatched {
            warn!(
                expected = %channel,
                actual = %reporter,
                "report under the wrong worker identity"
            );
        }
        resource.complete(reporter, outcome);

        if let Some(error) = error {
            warn!(worker = %channel, %error, "task failed");
            self.events.emit(&PoolEvent::Error, &PoolSignal::Error(channel, error));
        }
        if let Some(id) = freed {
            self.events.emit(&PoolEvent::Free, &PoolSignal::Free(id));
        }
    }
}

impl<T, R> PoolInner<T, R> {
    fn terminate(&self) {
        let (pending, waiting, parked) = {
            let mut state = self.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.free.clear();
            for handle in state.registry.values_mut() {
                handle.terminate();
            }
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.waiting),
                std::mem::take(&mut state.parked),
            )
        };

        // dropping an unsettled resource or parked listener settles its
        // handle with Error::Terminated
        for listener in parked.into_values() {
            self.events.off(&PoolEvent::Free, listener);
        }
        for waiter in waiting {
            waiter.resolver.reject(Error::Terminated);
        }
        let in_flight = pending.len();
        drop(pending);

        let _ = self.signals.send(Signal::Stop);
        info!(in_flight, "worker pool terminated");
    }
}

/// Body of a parked submission's one-shot `free` listener.
fn retry<T, R>(pool: Weak<PoolInner<T, R>>, ticket: u64, task: T, resolver: Resolver<R>)
where
    T: Send + 'static,
    R: Send + 'static,
{
    let Some(pool) = pool.upgrade() else {
        resolver.reject(Error::Terminated);
        return;
    };
    // release the ticket and dispatch under one guard, so no newcomer can
    // take its place in the waiting count in between
    let mut state = pool.state.lock();
    state.parked.remove(&ticket);
    pool.dispatch_locked(state, task, resolver, true);
}

impl<T, R> Drop for WorkerPool<T, R> {
    fn drop(&mut self) {
        self.inner.terminate();

        let threads: Vec<_> = self
            .inner
            .state
            .lock()
            .registry
            .values_mut()
            .filter_map(WorkerHandle::take_thread)
            .collect();

        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }
        for thread in threads {
            let _ = thread.join();
        }
    }
}

impl<T, R> fmt::Debug for WorkerPool<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WorkerPool")
            .field("workers", &state.registry.len())
            .field("free", &state.free.len())
            .field("busy", &state.pending.len())
            .field("retired", &state.retired.len())
            .field("waiting", &state.waiting_len())
            .field("terminated", &state.terminated)
            .finish()
    }
}
