use serde::{Deserialize, Serialize};

/// Aggregate fulfillment status of an order item, derived from its serial
/// counts. Never stored as an independently mutable field: recomputed from
/// the store after every transition batch so it cannot drift.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    Pending,
    Partial,
    Completed,
}

impl OrderItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Partial => "PARTIAL",
            Self::Completed => "COMPLETED",
        }
    }
}

impl core::fmt::Display for OrderItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project an order item's status from its serial counts.
///
/// `Completed` requires every required unit to be specifically allocated to
/// the dealer. Full assignment alone still projects `Partial`; allocation is
/// the fulfillment signal.
pub fn project_status(
    required_quantity: u32,
    assigned_count: u32,
    allocated_count: u32,
) -> OrderItemStatus {
    let committed = assigned_count + allocated_count;

    if committed == 0 {
        return OrderItemStatus::Pending;
    }
    if allocated_count >= required_quantity && assigned_count == 0 {
        return OrderItemStatus::Completed;
    }
    OrderItemStatus::Partial
}
