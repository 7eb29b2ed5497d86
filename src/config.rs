use crate::error::{Error, Result};
use crate::executor::PanicStrategy;

/// How a submission waits when every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Each waiting submission parks a one-shot listener on the `free`
    /// signal and retries dispatch when it fires. Every waiter wakes on each
    /// free signal and only one of them wins the worker, so waiters are not
    /// served in strict arrival order.
    #[default]
    Signal,

    /// Waiting submissions sit in an ordered queue and freed workers serve
    /// them strictly first-in first-out.
    Fifo,
}

/// What happens to a worker after its program reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The worker stays alive but never receives work again. Every error
    /// permanently shrinks the pool's effective capacity by one.
    #[default]
    Retire,

    /// The worker goes back to the free queue as if it had succeeded.
    Recycle,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_workers: Option<usize>,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub wait_policy: WaitPolicy,
    pub failure_policy: FailurePolicy,
    /// Upper bound on submissions waiting for a free worker. `None` means
    /// unbounded.
    pub max_pending: Option<usize>,
    pub panic_strategy: PanicStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: None,
            thread_name_prefix: "workpool-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
            wait_policy: WaitPolicy::default(),
            failure_policy: FailurePolicy::default(),
            max_pending: None,
            panic_strategy: PanicStrategy::default(),
        }
    }
}

impl PoolConfig {
    pub const MAX_WORKERS: usize = 1024;

    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Shorthand for a default config with a fixed worker count.
    pub fn with_workers(n: usize) -> Self {
        Self {
            num_workers: Some(n),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_workers {
            if n == 0 {
                return Err(Error::config("num_workers must be > 0"));
            }
            if n > Self::MAX_WORKERS {
                return Err(Error::config(format!(
                    "num_workers too large (max {})",
                    Self::MAX_WORKERS
                )));
            }
        }

        if self.max_pending == Some(0) {
            return Err(Error::config("max_pending must be > 0 when set"));
        }

        if self.thread_name_prefix.contains('\0') {
            return Err(Error::config("thread_name_prefix must not contain NUL"));
        }

        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.num_workers.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.config.num_workers = Some(n);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.config.wait_policy = policy;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn max_pending(mut self, limit: usize) -> Self {
        self.config.max_pending = Some(limit);
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
