//! The code a worker runs, and lookup of programs by reference.

use super::worker::WorkerId;
use crate::error::{Error, Result, TaskError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a running program can learn about the worker executing it.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    id: WorkerId,
}

impl WorkerContext {
    pub(crate) fn new(id: WorkerId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }
}

/// A program executed by every worker of a pool, one task at a time.
///
/// Returning `Err` (or panicking) is the worker's error signal for that
/// task; returning `Ok` is its success signal.
pub trait WorkerProgram<T, R>: Send + Sync + 'static {
    fn run(&self, ctx: &WorkerContext, task: T) -> std::result::Result<R, TaskError>;
}

impl<T, R, F> WorkerProgram<T, R> for F
where
    F: Fn(&WorkerContext, T) -> std::result::Result<R, TaskError> + Send + Sync + 'static,
{
    fn run(&self, ctx: &WorkerContext, task: T) -> std::result::Result<R, TaskError> {
        self(ctx, task)
    }
}

/// Pins a closure's signature so it can be passed where a
/// [`WorkerProgram`] is expected without annotating every argument.
pub fn from_fn<T, R, F>(f: F) -> F
where
    F: Fn(&WorkerContext, T) -> std::result::Result<R, TaskError> + Send + Sync + 'static,
{
    f
}

/// Named worker programs. A pool built from the registry fails to
/// construct if the name does not resolve.
pub struct ProgramRegistry<T, R> {
    programs: HashMap<String, Arc<dyn WorkerProgram<T, R>>>,
}

impl<T, R> ProgramRegistry<T, R> {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
        }
    }

    /// Returns the program previously registered under `name`, if any.
    pub fn register<S, P>(&mut self, name: S, program: P) -> Option<Arc<dyn WorkerProgram<T, R>>>
    where
        S: Into<String>,
        P: WorkerProgram<T, R>,
    {
        self.programs.insert(name.into(), Arc::new(program))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn WorkerProgram<T, R>>> {
        self.programs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_program(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }
}

impl<T, R> Default for ProgramRegistry<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> fmt::Debug for ProgramRegistry<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.programs.keys()).finish()
    }
}
