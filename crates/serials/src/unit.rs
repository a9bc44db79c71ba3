use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use serialtrack_core::{
    DealerAccountId, DomainError, DomainResult, Entity, OrderItemId, ProductId, SerialUnitId,
};

/// Lifecycle state of a serialized unit.
///
/// Forward path: `InStock → AssignedToOrderItem → AllocatedToDealer`.
/// The only backward transition is `AssignedToOrderItem → InStock` (unassign).
/// `AllocatedToDealer`, `Sold` and `Damaged` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerialState {
    InStock,
    AssignedToOrderItem,
    AllocatedToDealer,
    Sold,
    Damaged,
}

impl SerialState {
    /// Terminal states admit no further transition through the engine.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AllocatedToDealer | Self::Sold | Self::Damaged)
    }

    /// States that count against an order item's required quantity.
    pub fn counts_toward_order_item(self) -> bool {
        matches!(self, Self::AssignedToOrderItem | Self::AllocatedToDealer)
    }

    /// Stable wire name (matches the serde rendering).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InStock => "IN_STOCK",
            Self::AssignedToOrderItem => "ASSIGNED_TO_ORDER_ITEM",
            Self::AllocatedToDealer => "ALLOCATED_TO_DEALER",
            Self::Sold => "SOLD",
            Self::Damaged => "DAMAGED",
        }
    }
}

impl core::str::FromStr for SerialState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_STOCK" => Ok(Self::InStock),
            "ASSIGNED_TO_ORDER_ITEM" => Ok(Self::AssignedToOrderItem),
            "ALLOCATED_TO_DEALER" => Ok(Self::AllocatedToDealer),
            "SOLD" => Ok(Self::Sold),
            "DAMAGED" => Ok(Self::Damaged),
            other => Err(DomainError::validation(format!(
                "unknown serial state: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for SerialState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a unit is written off from stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnavailableReason {
    Damaged,
    Sold,
}

impl UnavailableReason {
    pub fn target_state(self) -> SerialState {
        match self {
            Self::Damaged => SerialState::Damaged,
            Self::Sold => SerialState::Sold,
        }
    }
}

/// Printed serial number stamped on a physical unit.
///
/// Globally unique per catalog; immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("serial number cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One physically identifiable, uniquely serialized product instance.
///
/// Ownership rule: `order_item_id` is set while the unit counts toward an
/// order item (`AssignedToOrderItem` and `AllocatedToDealer`) and is never
/// shared between two order items. `dealer_account_id` is set exactly when the
/// unit reaches `AllocatedToDealer` and is never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialUnit {
    id: SerialUnitId,
    serial_number: SerialNumber,
    product_id: ProductId,
    state: SerialState,
    order_item_id: Option<OrderItemId>,
    dealer_account_id: Option<DealerAccountId>,
    /// Store version, bumped once per committed write.
    version: u64,
    updated_at: DateTime<Utc>,
}

impl SerialUnit {
    /// Receive a new unit into stock (intake). The only way a unit is created.
    pub fn receive(
        id: SerialUnitId,
        serial_number: SerialNumber,
        product_id: ProductId,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            serial_number,
            product_id,
            state: SerialState::InStock,
            order_item_id: None,
            dealer_account_id: None,
            version: 1,
            updated_at: received_at,
        }
    }

    /// Rehydrate a unit from a stored record, validating field/state
    /// consistency on the way in.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: SerialUnitId,
        serial_number: SerialNumber,
        product_id: ProductId,
        state: SerialState,
        order_item_id: Option<OrderItemId>,
        dealer_account_id: Option<DealerAccountId>,
        version: u64,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let unit = Self {
            id,
            serial_number,
            product_id,
            state,
            order_item_id,
            dealer_account_id,
            version,
            updated_at,
        };
        unit.check_consistency()?;
        Ok(unit)
    }

    pub fn id_typed(&self) -> SerialUnitId {
        self.id
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn state(&self) -> SerialState {
        self.state
    }

    pub fn order_item_id(&self) -> Option<OrderItemId> {
        self.order_item_id
    }

    pub fn dealer_account_id(&self) -> Option<DealerAccountId> {
        self.dealer_account_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Precondition for assign / write-off: unit must currently be in stock.
    pub fn ensure_in_stock(&self) -> DomainResult<()> {
        if self.state != SerialState::InStock {
            return Err(DomainError::not_in_stock(format!(
                "serial {} is {}",
                self.serial_number, self.state
            )));
        }
        Ok(())
    }

    /// Precondition for assign: serial must belong to the order item's product.
    pub fn ensure_product(&self, product_id: ProductId) -> DomainResult<()> {
        if self.product_id != product_id {
            return Err(DomainError::product_mismatch(format!(
                "serial {} belongs to product {}, not {}",
                self.serial_number, self.product_id, product_id
            )));
        }
        Ok(())
    }

    /// Precondition for unassign / allocate: unit must be assigned to this
    /// order item right now. Allocated units fail here too; allocation is
    /// terminal and never reversed through the engine.
    pub fn ensure_assigned_to(&self, order_item_id: OrderItemId) -> DomainResult<()> {
        if self.state != SerialState::AssignedToOrderItem
            || self.order_item_id != Some(order_item_id)
        {
            return Err(DomainError::not_assigned(format!(
                "serial {} is not assigned to order item {order_item_id}",
                self.serial_number
            )));
        }
        Ok(())
    }

    /// Field/state consistency of a stored record.
    ///
    /// `order_item_id` must be present exactly while the unit counts toward an
    /// order item; `dealer_account_id` exactly once allocated.
    pub fn check_consistency(&self) -> DomainResult<()> {
        let owns = self.state.counts_toward_order_item();
        if owns != self.order_item_id.is_some() {
            return Err(DomainError::validation(format!(
                "serial {}: order_item_id presence does not match state {}",
                self.serial_number, self.state
            )));
        }

        let allocated = self.state == SerialState::AllocatedToDealer;
        if allocated != self.dealer_account_id.is_some() {
            return Err(DomainError::validation(format!(
                "serial {}: dealer_account_id presence does not match state {}",
                self.serial_number, self.state
            )));
        }

        Ok(())
    }

    /// Produce the record as it must look after a committed transition.
    ///
    /// Used by store implementations inside their compare-and-set; callers
    /// never mutate fields directly.
    pub fn with_transition(
        &self,
        new_state: SerialState,
        order_item_id: Option<OrderItemId>,
        dealer_account_id: Option<DealerAccountId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: self.id,
            serial_number: self.serial_number.clone(),
            product_id: self.product_id,
            state: new_state,
            order_item_id,
            dealer_account_id,
            version: self.version + 1,
            updated_at: at,
        }
    }
}

impl Entity for SerialUnit {
    type Id = SerialUnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
