//! workpool - a fixed-capacity worker thread pool
//!
//! A pool owns a fixed set of worker threads that all run the same
//! program. Each submitted task goes to a free worker, or waits until one
//! frees up, and the caller gets a [`TaskHandle`] that settles with the
//! result and the identity of the worker that produced it.
//!
//! # Quick Start
//!
//! ```no_run
//! use workpool::prelude::*;
//!
//! let config = PoolConfig::builder().num_workers(4).build().unwrap();
//! let pool = WorkerPool::new(from_fn(|_: &WorkerContext, n: u64| Ok(n * n)), &config).unwrap();
//!
//! let handle = pool.submit(12);
//! let done = handle.wait().unwrap();
//! println!("{} computed on worker {}", done.result, done.worker);
//!
//! pool.terminate();
//! ```
//!
//! # Features
//!
//! - **Identity checks**: a report is only accepted from the worker the task
//!   was dispatched to
//! - **Saturation handling**: submissions wait for a `free` signal, or in a
//!   strict FIFO queue, with an optional bound
//! - **Failure policy**: workers that report an error are retired or
//!   recycled
//! - **Signals**: `create`, `error` and `free` events through [`EventBus`]

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod module;
pub mod prelude;

pub use config::{FailurePolicy, PoolConfig, PoolConfigBuilder, WaitPolicy};
pub use error::{Error, Result, TaskError};
pub use events::{EventBus, ListenerId};
pub use executor::{
    from_fn, Completion, PoolEvent, PoolSignal, ProgramRegistry, TaskHandle, WorkerContext,
    WorkerId, WorkerPool, WorkerProgram,
};
