use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use serialtrack_core::{ActorId, SerialUnitId};
use serialtrack_events::{Event, EventEnvelope};
use serialtrack_serials::{SerialEvent, SerialState};

/// One audited transition: who moved which unit from where to where, when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub unit_id: SerialUnitId,
    pub sequence_number: u64,
    pub event_type: &'static str,
    pub old_state: Option<SerialState>,
    pub new_state: SerialState,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit trail lock poisoned")]
    Poisoned,
}

/// Audit trail over published serial events.
///
/// Consumes envelopes and keeps a per-unit transition history. Idempotent for
/// at-least-once delivery: replays at or below a unit's cursor are ignored.
/// Sequence gaps are expected (failed-batch rollbacks consume store versions
/// without publishing events), so only duplicates are filtered, not gaps.
#[derive(Debug, Default)]
pub struct AuditTrail {
    records: RwLock<Vec<AuditRecord>>,
    cursors: RwLock<HashMap<SerialUnitId, u64>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a published envelope into the trail.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<SerialEvent>) -> Result<(), AuditError> {
        let unit_id = envelope.unit_id();
        let seq = envelope.sequence_number();

        let mut cursors = self.cursors.write().map_err(|_| AuditError::Poisoned)?;
        let last = *cursors.get(&unit_id).unwrap_or(&0);
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        cursors.insert(unit_id, seq);

        let event = envelope.payload();
        let record = AuditRecord {
            event_id: envelope.event_id(),
            unit_id,
            sequence_number: seq,
            event_type: event.event_type(),
            old_state: event.old_state(),
            new_state: event.new_state(),
            actor: event.actor(),
            occurred_at: event.occurred_at(),
        };

        let mut records = self.records.write().map_err(|_| AuditError::Poisoned)?;
        records.push(record);
        Ok(())
    }

    /// Transition history for one unit, in application order.
    pub fn for_unit(&self, unit_id: SerialUnitId) -> Vec<AuditRecord> {
        let records = match self.records.read() {
            Ok(r) => r,
            Err(_) => return vec![],
        };
        records
            .iter()
            .filter(|r| r.unit_id == unit_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialtrack_core::{OrderItemId, ProductId};
    use serialtrack_serials::{UnitAssigned, UnitReceived};

    fn received_envelope(unit_id: SerialUnitId, seq: u64) -> EventEnvelope<SerialEvent> {
        EventEnvelope::new(
            Uuid::now_v7(),
            unit_id,
            seq,
            SerialEvent::UnitReceived(UnitReceived {
                unit_id,
                product_id: ProductId::new(),
                serial_number: "SN-1".to_string(),
                actor: ActorId::new(),
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn records_transitions_per_unit() {
        let trail = AuditTrail::new();
        let unit_id = SerialUnitId::new();

        trail.apply_envelope(&received_envelope(unit_id, 1)).unwrap();

        let assigned = EventEnvelope::new(
            Uuid::now_v7(),
            unit_id,
            2,
            SerialEvent::UnitAssigned(UnitAssigned {
                unit_id,
                product_id: ProductId::new(),
                order_item_id: OrderItemId::new(),
                actor: ActorId::new(),
                occurred_at: Utc::now(),
            }),
        );
        trail.apply_envelope(&assigned).unwrap();

        let history = trail.for_unit(unit_id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_type, "serials.unit.received");
        assert_eq!(history[1].event_type, "serials.unit.assigned");
        assert_eq!(history[1].old_state, Some(SerialState::InStock));
        assert_eq!(history[1].new_state, SerialState::AssignedToOrderItem);
    }

    #[test]
    fn duplicate_deliveries_are_ignored() {
        let trail = AuditTrail::new();
        let unit_id = SerialUnitId::new();
        let envelope = received_envelope(unit_id, 1);

        trail.apply_envelope(&envelope).unwrap();
        trail.apply_envelope(&envelope).unwrap();

        assert_eq!(trail.for_unit(unit_id).len(), 1);
    }

    #[test]
    fn sequence_gaps_are_tolerated() {
        let trail = AuditTrail::new();
        let unit_id = SerialUnitId::new();

        trail.apply_envelope(&received_envelope(unit_id, 1)).unwrap();
        // Versions 2 and 3 were consumed by a rolled-back batch.
        trail.apply_envelope(&received_envelope(unit_id, 4)).unwrap();

        assert_eq!(trail.for_unit(unit_id).len(), 2);
    }
}
