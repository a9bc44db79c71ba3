//! Order-item status projection.
//!
//! Always recomputed from the store's committed serial counts; the status is
//! never stored as an independently mutable field, so it cannot drift from the
//! units underneath it.

use serialtrack_orders::{OrderItemRef, OrderItemStatus, project_status};
use serialtrack_serials::SerialState;

use crate::serial_store::{SerialStore, SerialStoreError};

/// Project an order item's aggregate status from the store.
pub fn project_order_item<S: SerialStore>(
    store: &S,
    item: &OrderItemRef,
) -> Result<OrderItemStatus, SerialStoreError> {
    let assigned = store
        .get_by_order_item(item.id, Some(SerialState::AssignedToOrderItem))?
        .len() as u32;
    let allocated = store
        .get_by_order_item(item.id, Some(SerialState::AllocatedToDealer))?
        .len() as u32;

    Ok(project_status(item.quantity, assigned, allocated))
}
