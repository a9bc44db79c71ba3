//! Infrastructure layer: serial storage, transition engine, queries, projections.

pub mod engine;
pub mod order_directory;
pub mod projections;
pub mod query;
pub mod serial_store;
