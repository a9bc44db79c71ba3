//! Boundary to the external Order domain.
//!
//! The engine validates against order-item references supplied from here and
//! reports each freshly projected status back. Nothing else about orders is
//! owned by this subsystem.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serialtrack_core::OrderItemId;
use serialtrack_orders::{OrderItemRef, OrderItemStatus};

/// Order domain interface as seen from the allocation engine.
pub trait OrderDirectory: Send + Sync {
    /// Look up an order-item reference (owning order, product, required quantity).
    fn order_item(&self, id: OrderItemId) -> Option<OrderItemRef>;

    /// Receive a freshly projected status for storage on the order item.
    fn record_status(&self, id: OrderItemId, status: OrderItemStatus);
}

impl<D> OrderDirectory for Arc<D>
where
    D: OrderDirectory + ?Sized,
{
    fn order_item(&self, id: OrderItemId) -> Option<OrderItemRef> {
        (**self).order_item(id)
    }

    fn record_status(&self, id: OrderItemId, status: OrderItemStatus) {
        (**self).record_status(id, status)
    }
}

#[derive(Debug, Clone)]
struct DirectoryEntry {
    item: OrderItemRef,
    status: Option<OrderItemStatus>,
}

/// In-memory order directory for tests/dev and for deployments where the
/// Order domain pushes its lines over the API.
#[derive(Debug, Default)]
pub struct InMemoryOrderDirectory {
    entries: RwLock<HashMap<OrderItemId, DirectoryEntry>>,
}

impl InMemoryOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or refresh) an order-item reference.
    pub fn register(&self, item: OrderItemRef) {
        if let Ok(mut entries) = self.entries.write() {
            let status = entries.get(&item.id).and_then(|e| e.status);
            entries.insert(item.id, DirectoryEntry { item, status });
        }
    }

    /// Last status reported for an order item, if any batch touched it yet.
    pub fn status(&self, id: OrderItemId) -> Option<OrderItemStatus> {
        let entries = self.entries.read().ok()?;
        entries.get(&id).and_then(|e| e.status)
    }
}

impl OrderDirectory for InMemoryOrderDirectory {
    fn order_item(&self, id: OrderItemId) -> Option<OrderItemRef> {
        let entries = self.entries.read().ok()?;
        entries.get(&id).map(|e| e.item.clone())
    }

    fn record_status(&self, id: OrderItemId, status: OrderItemStatus) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(&id) {
                entry.status = Some(status);
            }
        }
    }
}
