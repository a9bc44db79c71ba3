//! Serial unit storage.
//!
//! `SerialStore` is the single authority for lifecycle writes: everything
//! funnels through `compare_and_set_state`, no direct field mutation exists
//! outside it.

pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemorySerialStore;
pub use postgres::PostgresSerialStore;
pub use r#trait::{ExpectedState, SerialStore, SerialStoreError, TransitionFields};
