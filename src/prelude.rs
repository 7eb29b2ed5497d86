pub use crate::config::{FailurePolicy, PoolConfig, PoolConfigBuilder, WaitPolicy};
pub use crate::error::{Error, Result, TaskError};
pub use crate::events::EventBus;
pub use crate::executor::{
    from_fn, Completion, PanicStrategy, PoolEvent, PoolSignal, ProgramRegistry, TaskHandle,
    WorkerContext, WorkerId, WorkerPool, WorkerProgram,
};
pub use crate::module::{Module, ModuleKind};
