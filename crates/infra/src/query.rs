//! Read-side operations used by the admin client.
//!
//! No invariants of its own and no caching: every call reads the store's
//! latest committed state, because the admin UI re-fetches after every
//! transition batch instead of trusting client-side mutation.

use serde::Serialize;

use serialtrack_core::{OrderItemId, ProductId};
use serialtrack_serials::{SerialState, SerialUnit};

use crate::serial_store::{SerialStore, SerialStoreError};

/// Aggregate inventory counts for one product, for the Product domain's
/// stock displays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryCounts {
    pub available: u64,
    pub assigned: u64,
    pub allocated: u64,
    pub sold: u64,
    pub damaged: u64,
    pub total: u64,
}

/// Read façade over the serial store.
#[derive(Debug)]
pub struct QueryFacade<S> {
    store: S,
}

impl<S> QueryFacade<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: SerialStore> QueryFacade<S> {
    /// In-stock units of a product, ready to assign.
    pub fn available_serials(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        self.store.get_by_product(product_id, SerialState::InStock)
    }

    /// Units currently reserved against an order item.
    pub fn assigned_serials(
        &self,
        order_item_id: OrderItemId,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        self.store
            .get_by_order_item(order_item_id, Some(SerialState::AssignedToOrderItem))
    }

    /// Units already handed over to the dealer for an order item.
    pub fn allocated_serials(
        &self,
        order_item_id: OrderItemId,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        self.store
            .get_by_order_item(order_item_id, Some(SerialState::AllocatedToDealer))
    }

    /// Per-product inventory counts across all lifecycle states.
    pub fn inventory_counts(
        &self,
        product_id: ProductId,
    ) -> Result<InventoryCounts, SerialStoreError> {
        let available = self
            .store
            .count_by_product(product_id, SerialState::InStock)?;
        let assigned = self
            .store
            .count_by_product(product_id, SerialState::AssignedToOrderItem)?;
        let allocated = self
            .store
            .count_by_product(product_id, SerialState::AllocatedToDealer)?;
        let sold = self.store.count_by_product(product_id, SerialState::Sold)?;
        let damaged = self
            .store
            .count_by_product(product_id, SerialState::Damaged)?;

        Ok(InventoryCounts {
            available,
            assigned,
            allocated,
            sold,
            damaged,
            total: available + assigned + allocated + sold + damaged,
        })
    }

    /// Single-unit lookup by printed serial number (support/warranty flows).
    pub fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<SerialUnit>, SerialStoreError> {
        self.store.find_by_serial_number(serial_number)
    }
}
