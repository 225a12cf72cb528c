mod channel;
mod event_types;
mod hooks;

pub use channel::{ScaEventDispatcher, ScaEventHook, ScaEventProducer};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
