//! Event signalling used by the pool and by module lifecycle hooks.

pub mod bus;

pub use bus::{EventBus, ListenerId};
