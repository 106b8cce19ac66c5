//! Listener and event plumbing shared by the host crates

pub mod event;
pub mod listener;

pub use event::{EventDispatcher, PrintEvent};
pub use listener::{ListenerHandle, ListenerRegistry};
