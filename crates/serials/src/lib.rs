//! `serialtrack-serials` — serialized-unit domain model.
//!
//! Owns the serial lifecycle: the authoritative `SerialState` enum, the
//! per-unit transition preconditions, the per-order-item quantity invariant,
//! and the domain events emitted for every committed transition.

pub mod event;
pub mod invariant;
pub mod unit;

pub use event::{
    SerialEvent, UnitAllocated, UnitAssigned, UnitReceived, UnitUnassigned, UnitWrittenOff,
};
pub use invariant::validate_quantity;
pub use unit::{SerialNumber, SerialState, SerialUnit, UnavailableReason};
