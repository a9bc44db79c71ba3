//! Domain events and their distribution plumbing.
//!
//! State changes committed by the transition engine are observable outside the
//! store only through the events published here.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
