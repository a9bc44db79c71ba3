use serde::{Deserialize, Serialize};

use serialtrack_core::{DomainError, DomainResult, OrderId, OrderItemId, ProductId};

/// Reference to a line within an order (external Order domain).
///
/// Supplies exactly what allocation needs: the owning order, the product the
/// line sells, and the required serial count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRef {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Required serial count for the line.
    pub quantity: u32,
}

impl OrderItemRef {
    pub fn new(
        id: OrderItemId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(Self {
            id,
            order_id,
            product_id,
            quantity,
        })
    }
}
