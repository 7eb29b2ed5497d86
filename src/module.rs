//! Lifecycle boundary for pluggable client/server modules.
//!
//! Only the hook contract lives here. Resolving dependencies between
//! modules is left to whoever owns the module set.

use crate::events::EventBus;
use std::sync::Arc;
use tracing::{debug, warn};

/// Event name under which lifecycle failures are emitted.
pub const MODULE_ERROR: &str = "module.error";

pub type ModuleEvents = EventBus<&'static str, ModuleFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDependency {
    pub name: String,
    pub required: bool,
}

impl ModuleDependency {
    pub fn optional<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// A bare name is a required dependency.
impl From<&str> for ModuleDependency {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("missing functionality on lifecycle hook [{0}]")]
    MissingHook(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Payload of a [`MODULE_ERROR`] event.
#[derive(Debug, Clone)]
pub struct ModuleFailure {
    pub module: String,
    pub hook: &'static str,
    pub error: Arc<ModuleError>,
}

/// Hooks default to [`ModuleError::MissingHook`], which the lifecycle
/// helpers treat as "nothing to do".
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ModuleKind;

    fn dependencies(&self) -> &[ModuleDependency] {
        &[]
    }

    fn on_load(&self) -> Result<(), ModuleError> {
        Err(ModuleError::MissingHook("on_load"))
    }

    fn on_unload(&self) -> Result<(), ModuleError> {
        Err(ModuleError::MissingHook("on_unload"))
    }

    /// Called for messages the module asked to receive.
    fn on_message(&self, _message: &[u8]) -> Result<(), ModuleError> {
        Err(ModuleError::MissingHook("on_message"))
    }
}

/// Run `on_load`. Returns `false` if the hook failed.
pub fn init_module(module: &dyn Module, events: &ModuleEvents) -> bool {
    run_hook(module, "on_load", events, |m| m.on_load())
}

pub fn unload_module(module: &dyn Module, events: &ModuleEvents) -> bool {
    run_hook(module, "on_unload", events, |m| m.on_unload())
}

pub fn deliver_message(module: &dyn Module, message: &[u8], events: &ModuleEvents) -> bool {
    run_hook(module, "on_message", events, |m| m.on_message(message))
}

fn run_hook<F>(module: &dyn Module, hook: &'static str, events: &ModuleEvents, f: F) -> bool
where
    F: FnOnce(&dyn Module) -> Result<(), ModuleError>,
{
    match f(module) {
        Ok(()) => true,
        Err(ModuleError::MissingHook(_)) => {
            debug!(module = module.name(), hook, "hook not implemented");
            true
        }
        Err(error) => {
            warn!(module = module.name(), hook, %error, "module hook failed");
            events.emit(
                MODULE_ERROR,
                &ModuleFailure {
                    module: module.name().to_string(),
                    hook,
                    error: Arc::new(error),
                },
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Bare;

    impl Module for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn kind(&self) -> ModuleKind {
            ModuleKind::Client
        }
    }

    struct Flaky {
        deps: Vec<ModuleDependency>,
        loaded: Mutex<bool>,
    }

    impl Module for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn kind(&self) -> ModuleKind {
            ModuleKind::Server
        }

        fn dependencies(&self) -> &[ModuleDependency] {
            &self.deps
        }

        fn on_load(&self) -> Result<(), ModuleError> {
            *self.loaded.lock() = true;
            Ok(())
        }

        fn on_message(&self, message: &[u8]) -> Result<(), ModuleError> {
            if message.is_empty() {
                return Err(ModuleError::Failed("empty message".into()));
            }
            Ok(())
        }
    }

    fn recorder(events: &ModuleEvents) -> Arc<Mutex<Vec<ModuleFailure>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        events.on(MODULE_ERROR, move |failure: &ModuleFailure| sink.lock().push(failure.clone()));
        seen
    }

    #[test]
    fn test_missing_hooks_are_ignored() {
        let events = ModuleEvents::new();
        let seen = recorder(&events);

        assert!(init_module(&Bare, &events));
        assert!(unload_module(&Bare, &events));
        assert!(deliver_message(&Bare, b"hi", &events));
        assert!(seen.lock().is_empty());
        assert!(Bare.dependencies().is_empty());
    }

    #[test]
    fn test_hook_failure_is_emitted() {
        let events = ModuleEvents::new();
        let seen = recorder(&events);
        let module = Flaky {
            deps: vec!["auth".into(), ModuleDependency::optional("metrics")],
            loaded: Mutex::new(false),
        };

        assert!(init_module(&module, &events));
        assert!(*module.loaded.lock());
        assert!(deliver_message(&module, b"ping", &events));
        assert!(!deliver_message(&module, b"", &events));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].module, "flaky");
        assert_eq!(seen[0].hook, "on_message");
        assert_eq!(*seen[0].error, ModuleError::Failed("empty message".into()));
    }

    #[test]
    fn test_dependency_forms() {
        let required: ModuleDependency = "auth".into();
        assert!(required.required);
        assert!(!ModuleDependency::optional("metrics").required);
    }
}
