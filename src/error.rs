use crate::executor::WorkerId;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure raised by a worker program while running one task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        TaskError::Failed(msg.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown worker program '{0}'")]
    UnknownProgram(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("task failed on worker {worker}: {source}")]
    Task {
        worker: WorkerId,
        #[source]
        source: TaskError,
    },

    #[error("received data from worker '{actual}' when it should be from worker '{expected}'")]
    IdentityMismatch { expected: WorkerId, actual: WorkerId },

    #[error("too many pending submissions (limit {limit})")]
    Saturated { limit: usize },

    #[error("worker pool terminated")]
    Terminated,
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn unknown_program<S: Into<String>>(name: S) -> Self {
        Error::UnknownProgram(name.into())
    }

    /// The task error carried by an execution failure, if any.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Error::Task { source, .. } => Some(source),
            _ => None,
        }
    }
}
