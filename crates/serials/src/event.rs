use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use serialtrack_core::{ActorId, DealerAccountId, OrderItemId, ProductId, SerialUnitId};
use serialtrack_events::Event;

use crate::unit::{SerialState, UnavailableReason};

/// Event: UnitReceived (intake into stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReceived {
    pub unit_id: SerialUnitId,
    pub product_id: ProductId,
    pub serial_number: String,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitAssigned (reserved against an order line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAssigned {
    pub unit_id: SerialUnitId,
    pub product_id: ProductId,
    pub order_item_id: OrderItemId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitUnassigned (released back into stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitUnassigned {
    pub unit_id: SerialUnitId,
    pub order_item_id: OrderItemId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitAllocated (custody transferred to a dealer; terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAllocated {
    pub unit_id: SerialUnitId,
    pub order_item_id: OrderItemId,
    pub dealer_account_id: DealerAccountId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitWrittenOff (damaged or sold outside the dealer flow; terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitWrittenOff {
    pub unit_id: SerialUnitId,
    pub reason: UnavailableReason,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialEvent {
    UnitReceived(UnitReceived),
    UnitAssigned(UnitAssigned),
    UnitUnassigned(UnitUnassigned),
    UnitAllocated(UnitAllocated),
    UnitWrittenOff(UnitWrittenOff),
}

impl SerialEvent {
    pub fn unit_id(&self) -> SerialUnitId {
        match self {
            SerialEvent::UnitReceived(e) => e.unit_id,
            SerialEvent::UnitAssigned(e) => e.unit_id,
            SerialEvent::UnitUnassigned(e) => e.unit_id,
            SerialEvent::UnitAllocated(e) => e.unit_id,
            SerialEvent::UnitWrittenOff(e) => e.unit_id,
        }
    }

    pub fn actor(&self) -> ActorId {
        match self {
            SerialEvent::UnitReceived(e) => e.actor,
            SerialEvent::UnitAssigned(e) => e.actor,
            SerialEvent::UnitUnassigned(e) => e.actor,
            SerialEvent::UnitAllocated(e) => e.actor,
            SerialEvent::UnitWrittenOff(e) => e.actor,
        }
    }

    /// State the unit left. `None` for intake (the unit did not exist yet).
    pub fn old_state(&self) -> Option<SerialState> {
        match self {
            SerialEvent::UnitReceived(_) => None,
            SerialEvent::UnitAssigned(_) => Some(SerialState::InStock),
            SerialEvent::UnitUnassigned(_) => Some(SerialState::AssignedToOrderItem),
            SerialEvent::UnitAllocated(_) => Some(SerialState::AssignedToOrderItem),
            SerialEvent::UnitWrittenOff(_) => Some(SerialState::InStock),
        }
    }

    /// State the unit entered.
    pub fn new_state(&self) -> SerialState {
        match self {
            SerialEvent::UnitReceived(_) => SerialState::InStock,
            SerialEvent::UnitAssigned(_) => SerialState::AssignedToOrderItem,
            SerialEvent::UnitUnassigned(_) => SerialState::InStock,
            SerialEvent::UnitAllocated(_) => SerialState::AllocatedToDealer,
            SerialEvent::UnitWrittenOff(e) => e.reason.target_state(),
        }
    }
}

impl Event for SerialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SerialEvent::UnitReceived(_) => "serials.unit.received",
            SerialEvent::UnitAssigned(_) => "serials.unit.assigned",
            SerialEvent::UnitUnassigned(_) => "serials.unit.unassigned",
            SerialEvent::UnitAllocated(_) => "serials.unit.allocated",
            SerialEvent::UnitWrittenOff(_) => "serials.unit.written_off",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SerialEvent::UnitReceived(e) => e.occurred_at,
            SerialEvent::UnitAssigned(e) => e.occurred_at,
            SerialEvent::UnitUnassigned(e) => e.occurred_at,
            SerialEvent::UnitAllocated(e) => e.occurred_at,
            SerialEvent::UnitWrittenOff(e) => e.occurred_at,
        }
    }
}
