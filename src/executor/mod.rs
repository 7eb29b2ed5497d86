//! Task execution infrastructure.
//!
//! This module provides the worker pool and the pieces it is built from:
//! worker threads, worker programs, per-task resources, and deferred
//! result handles.

pub mod handle;
pub mod panic_handler;
pub mod pool;
pub mod program;
pub(crate) mod resource;
pub mod worker;

pub use handle::{Completion, TaskHandle};
pub use panic_handler::{PanicHandler, PanicStrategy};
pub use pool::{PoolEvent, PoolSignal, WorkerPool};
pub use program::{from_fn, ProgramRegistry, WorkerContext, WorkerProgram};
pub use worker::WorkerId;
