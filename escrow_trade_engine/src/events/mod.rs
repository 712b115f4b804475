//! Lifecycle and messaging notifications.
//!
//! Any part of the system can register a hook (see [`EventHooks`]) that is called whenever a trade changes status or a
//! message is accepted into a conversation. Hooks run on their own tasks and never block the operation that produced
//! the event.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
