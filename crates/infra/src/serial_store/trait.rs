use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use serialtrack_core::{DealerAccountId, OrderItemId, ProductId, SerialUnitId};
use serialtrack_serials::{SerialState, SerialUnit};

/// Expected prior value for a compare-and-set write.
///
/// The compare covers the lifecycle state **and** the ownership link. Checking
/// the state alone would admit an ABA hazard: a unit unassigned and reassigned
/// to a different order item between a caller's read and its write would still
/// match on state, and the write would attribute the unit to the wrong line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedState {
    pub state: SerialState,
    pub order_item_id: Option<OrderItemId>,
}

impl ExpectedState {
    pub fn in_stock() -> Self {
        Self {
            state: SerialState::InStock,
            order_item_id: None,
        }
    }

    pub fn assigned_to(order_item_id: OrderItemId) -> Self {
        Self {
            state: SerialState::AssignedToOrderItem,
            order_item_id: Some(order_item_id),
        }
    }

    pub fn allocated_to(order_item_id: OrderItemId) -> Self {
        Self {
            state: SerialState::AllocatedToDealer,
            order_item_id: Some(order_item_id),
        }
    }

    pub fn written_off(state: SerialState) -> Self {
        Self {
            state,
            order_item_id: None,
        }
    }

    pub fn matches(&self, unit: &SerialUnit) -> bool {
        unit.state() == self.state && unit.order_item_id() == self.order_item_id
    }
}

/// Fields written alongside a state change: the values the unit's nullable
/// ownership columns take after the write, plus the commit timestamp.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransitionFields {
    pub order_item_id: Option<OrderItemId>,
    pub dealer_account_id: Option<DealerAccountId>,
    pub at: DateTime<Utc>,
}

impl TransitionFields {
    /// Reserve against an order line.
    pub fn assign(order_item_id: OrderItemId, at: DateTime<Utc>) -> Self {
        Self {
            order_item_id: Some(order_item_id),
            dealer_account_id: None,
            at,
        }
    }

    /// Release back into stock (or write off): both links cleared.
    pub fn release(at: DateTime<Utc>) -> Self {
        Self {
            order_item_id: None,
            dealer_account_id: None,
            at,
        }
    }

    /// Transfer custody to a dealer; the order-item link is retained so the
    /// unit keeps counting toward its line's quantity.
    pub fn allocate(
        order_item_id: OrderItemId,
        dealer_account_id: DealerAccountId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_item_id: Some(order_item_id),
            dealer_account_id: Some(dealer_account_id),
            at,
        }
    }
}

/// Serial store operation error.
#[derive(Debug, Error)]
pub enum SerialStoreError {
    /// No unit with the given id.
    #[error("serial unit not found: {0}")]
    NotFound(SerialUnitId),

    /// Compare-and-set found a different current state (optimistic concurrency).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Intake attempted to reuse a unit id.
    #[error("duplicate serial unit id: {0}")]
    DuplicateId(SerialUnitId),

    /// Intake attempted to reuse a serial number.
    #[error("duplicate serial number: {0}")]
    DuplicateSerialNumber(String),

    /// The write would leave a record violating field/state consistency.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// Backend failure (lock poisoning, connection loss, timeout). Retryable
    /// the same way a conflict is: re-read, then retry.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistent record of every serialized unit.
///
/// `compare_and_set_state` is the only write primitive for lifecycle fields.
/// Implementations must apply it atomically: the expected-state check and the
/// write are one indivisible step, and a losing writer gets `Conflict`.
pub trait SerialStore: Send + Sync {
    /// Create a unit at intake. The unit must be `InStock`; duplicate ids and
    /// duplicate serial numbers are rejected.
    fn insert(&self, unit: SerialUnit) -> Result<(), SerialStoreError>;

    fn get(&self, id: SerialUnitId) -> Result<Option<SerialUnit>, SerialStoreError>;

    /// Look up by printed serial number (globally unique).
    fn find_by_serial_number(&self, serial_number: &str)
    -> Result<Option<SerialUnit>, SerialStoreError>;

    /// All units of a product currently in `state`, ordered by serial number.
    fn get_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<Vec<SerialUnit>, SerialStoreError>;

    /// Units linked to an order item, optionally narrowed to one state,
    /// ordered by serial number.
    fn get_by_order_item(
        &self,
        order_item_id: OrderItemId,
        state: Option<SerialState>,
    ) -> Result<Vec<SerialUnit>, SerialStoreError>;

    /// Count units of a product currently in `state`.
    fn count_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<u64, SerialStoreError>;

    /// Atomically transition a unit whose current record matches `expected`.
    ///
    /// On success the unit's version is bumped and the updated record is
    /// returned. On mismatch nothing is written and `Conflict` is returned.
    fn compare_and_set_state(
        &self,
        id: SerialUnitId,
        expected: ExpectedState,
        new_state: SerialState,
        fields: TransitionFields,
    ) -> Result<SerialUnit, SerialStoreError>;
}

impl<S> SerialStore for Arc<S>
where
    S: SerialStore + ?Sized,
{
    fn insert(&self, unit: SerialUnit) -> Result<(), SerialStoreError> {
        (**self).insert(unit)
    }

    fn get(&self, id: SerialUnitId) -> Result<Option<SerialUnit>, SerialStoreError> {
        (**self).get(id)
    }

    fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<SerialUnit>, SerialStoreError> {
        (**self).find_by_serial_number(serial_number)
    }

    fn get_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        (**self).get_by_product(product_id, state)
    }

    fn get_by_order_item(
        &self,
        order_item_id: OrderItemId,
        state: Option<SerialState>,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        (**self).get_by_order_item(order_item_id, state)
    }

    fn count_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<u64, SerialStoreError> {
        (**self).count_by_product(product_id, state)
    }

    fn compare_and_set_state(
        &self,
        id: SerialUnitId,
        expected: ExpectedState,
        new_state: SerialState,
        fields: TransitionFields,
    ) -> Result<SerialUnit, SerialStoreError> {
        (**self).compare_and_set_state(id, expected, new_state, fields)
    }
}
