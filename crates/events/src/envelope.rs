use serde::{Deserialize, Serialize};
use uuid::Uuid;

use serialtrack_core::SerialUnitId;

/// Envelope for a published serial-unit event.
///
/// This is the unit consumers receive from the event bus.
///
/// Notes:
/// - `sequence_number` is the unit's store version after the transition was
///   committed, so it is monotonically increasing per unit.
/// - `payload` is the domain event itself (or its JSON rendering once it has
///   crossed a serialization boundary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    unit_id: SerialUnitId,

    /// Monotonically increasing position in the unit's transition history.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: Uuid, unit_id: SerialUnitId, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id,
            unit_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn unit_id(&self) -> SerialUnitId {
        self.unit_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
