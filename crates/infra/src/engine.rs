//! Batch transition execution (application-level orchestration).
//!
//! The engine owns every lifecycle write. Each batch runs the same pipeline:
//!
//! ```text
//! resolve order item → pre-validate every unit → quantity invariant check
//!   → compare-and-set each unit (rolling back on a mid-batch failure)
//!   → reproject the order item's status → publish domain events
//! ```
//!
//! Batches are all-or-nothing from the caller's perspective: the full batch is
//! validated before the first write, and a CAS loss part-way through rolls the
//! already-written units back before the error returns. The caller observes
//! either full success or the pre-batch state.
//!
//! The engine never retries. A `Conflict` means another admin session got
//! there first; the caller re-fetches the available/assigned lists and decides
//! whether to retry, because the lists themselves may have changed.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use serialtrack_core::{
    ActorId, DealerAccountId, DomainError, OrderItemId, ProductId, SerialUnitId,
};
use serialtrack_events::{EventBus, EventEnvelope};
use serialtrack_orders::{OrderItemRef, OrderItemStatus};
use serialtrack_serials::{
    SerialEvent, SerialNumber, SerialState, SerialUnit, UnavailableReason, UnitAllocated,
    UnitAssigned, UnitReceived, UnitUnassigned, UnitWrittenOff, validate_quantity,
};

use crate::order_directory::OrderDirectory;
use crate::projections::order_item_status::project_order_item;
use crate::serial_store::{ExpectedState, SerialStore, SerialStoreError, TransitionFields};

#[derive(Debug)]
pub enum EngineError {
    /// Optimistic concurrency collision; retryable after a fresh read.
    Conflict(String),
    /// Malformed request (empty batch, duplicate ids, bad serial number).
    Validation(String),
    /// Unknown serial unit or order item.
    NotFound,
    /// A unit is not in the source state required for assign / write-off.
    NotInStock(String),
    /// A unit is not assigned to the expected order item.
    NotAssigned(String),
    /// Serial belongs to a different product than the order item.
    ProductMismatch(String),
    /// The batch would violate the per-order-item quantity invariant.
    QuantityExceeded(String),
    /// Store failure outside the compare-and-set protocol.
    Store(SerialStoreError),
    /// Publication failed after a successful commit (at-least-once; the
    /// transitions are durable, consumers must tolerate redelivery).
    Publish(String),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                EngineError::Validation(msg)
            }
            DomainError::NotFound => EngineError::NotFound,
            DomainError::NotInStock(msg) => EngineError::NotInStock(msg),
            DomainError::NotAssigned(msg) => EngineError::NotAssigned(msg),
            DomainError::ProductMismatch(msg) => EngineError::ProductMismatch(msg),
            DomainError::QuantityExceeded(msg) => EngineError::QuantityExceeded(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<SerialStoreError> for EngineError {
    fn from(value: SerialStoreError) -> Self {
        match value {
            SerialStoreError::Conflict(msg) => EngineError::Conflict(msg),
            // Backend failures (timeouts, poisoned locks) are conflict-class:
            // retryable after a fresh read, never a silent no-op.
            SerialStoreError::Backend(msg) => EngineError::Conflict(msg),
            SerialStoreError::NotFound(_) => EngineError::NotFound,
            other => EngineError::Store(other),
        }
    }
}

/// One planned compare-and-set, with its inverse for batch rollback.
struct CasStep {
    id: SerialUnitId,
    expected: ExpectedState,
    new_state: SerialState,
    fields: TransitionFields,
    rollback_expected: ExpectedState,
    rollback_state: SerialState,
    rollback_fields: TransitionFields,
}

/// Transition engine over a serial store, an event bus and the Order domain.
#[derive(Debug)]
pub struct TransitionEngine<S, B, D> {
    store: S,
    bus: B,
    orders: D,
}

impl<S, B, D> TransitionEngine<S, B, D> {
    pub fn new(store: S, bus: B, orders: D) -> Self {
        Self { store, bus, orders }
    }

    pub fn into_parts(self) -> (S, B, D) {
        (self.store, self.bus, self.orders)
    }
}

impl<S, B, D> TransitionEngine<S, B, D>
where
    S: SerialStore,
    B: EventBus<EventEnvelope<SerialEvent>>,
    D: OrderDirectory,
{
    /// Intake: create new units in stock.
    ///
    /// Serial numbers are pre-checked for uniqueness; a concurrent duplicate
    /// intake still loses at the store's unique constraint. Units created
    /// before such a collision stay received: they are inert stock, not a
    /// partially applied transition.
    pub fn receive_into_stock(
        &self,
        product_id: ProductId,
        serial_numbers: Vec<SerialNumber>,
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        if serial_numbers.is_empty() {
            return Err(EngineError::Validation("no serial numbers in batch".to_string()));
        }
        for (idx, sn) in serial_numbers.iter().enumerate() {
            if serial_numbers[..idx].contains(sn) {
                return Err(EngineError::Validation(format!(
                    "duplicate serial number in batch: {sn}"
                )));
            }
            if self.store.find_by_serial_number(sn.as_str())?.is_some() {
                return Err(EngineError::Validation(format!(
                    "serial number already exists: {sn}"
                )));
            }
        }

        let now = Utc::now();
        let mut received = Vec::with_capacity(serial_numbers.len());
        for sn in serial_numbers {
            let unit = SerialUnit::receive(SerialUnitId::new(), sn, product_id, now);
            self.store.insert(unit.clone())?;
            received.push(unit);
        }

        self.publish(&received, |unit| {
            SerialEvent::UnitReceived(UnitReceived {
                unit_id: unit.id_typed(),
                product_id: unit.product_id(),
                serial_number: unit.serial_number().as_str().to_string(),
                actor,
                occurred_at: now,
            })
        })?;

        Ok(received)
    }

    /// Reserve in-stock units against an order line.
    pub fn assign_to_order_item(
        &self,
        order_item_id: OrderItemId,
        product_id: ProductId,
        serial_ids: &[SerialUnitId],
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        let units = self.load_batch(serial_ids)?;
        let item = self
            .orders
            .order_item(order_item_id)
            .ok_or(EngineError::NotFound)?;

        if item.product_id != product_id {
            return Err(EngineError::ProductMismatch(format!(
                "order item {order_item_id} sells product {}, not {product_id}",
                item.product_id
            )));
        }
        for unit in &units {
            unit.ensure_in_stock()?;
            unit.ensure_product(product_id)?;
        }

        let committed = self.store.get_by_order_item(order_item_id, None)?.len() as u32;
        validate_quantity(item.quantity, committed, serial_ids.len() as i64)?;

        let now = Utc::now();
        let steps = serial_ids
            .iter()
            .map(|&id| CasStep {
                id,
                expected: ExpectedState::in_stock(),
                new_state: SerialState::AssignedToOrderItem,
                fields: TransitionFields::assign(order_item_id, now),
                rollback_expected: ExpectedState::assigned_to(order_item_id),
                rollback_state: SerialState::InStock,
                rollback_fields: TransitionFields::release(now),
            })
            .collect();

        let updated = self.apply_batch(steps)?;
        self.reproject(&item)?;

        self.publish(&updated, |unit| {
            SerialEvent::UnitAssigned(UnitAssigned {
                unit_id: unit.id_typed(),
                product_id: unit.product_id(),
                order_item_id,
                actor,
                occurred_at: now,
            })
        })?;

        Ok(updated)
    }

    /// Release assigned units back into stock.
    pub fn unassign_from_order_item(
        &self,
        order_item_id: OrderItemId,
        serial_ids: &[SerialUnitId],
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        let units = self.load_batch(serial_ids)?;
        let item = self
            .orders
            .order_item(order_item_id)
            .ok_or(EngineError::NotFound)?;

        for unit in &units {
            unit.ensure_assigned_to(order_item_id)?;
        }

        let committed = self.store.get_by_order_item(order_item_id, None)?.len() as u32;
        validate_quantity(item.quantity, committed, -(serial_ids.len() as i64))?;

        let now = Utc::now();
        let steps = serial_ids
            .iter()
            .map(|&id| CasStep {
                id,
                expected: ExpectedState::assigned_to(order_item_id),
                new_state: SerialState::InStock,
                fields: TransitionFields::release(now),
                rollback_expected: ExpectedState::in_stock(),
                rollback_state: SerialState::AssignedToOrderItem,
                rollback_fields: TransitionFields::assign(order_item_id, now),
            })
            .collect();

        let updated = self.apply_batch(steps)?;
        self.reproject(&item)?;

        self.publish(&updated, |unit| {
            SerialEvent::UnitUnassigned(UnitUnassigned {
                unit_id: unit.id_typed(),
                order_item_id,
                actor,
                occurred_at: now,
            })
        })?;

        Ok(updated)
    }

    /// Transfer custody of assigned units to a dealer. Terminal: no engine
    /// operation moves an allocated unit anywhere else afterwards.
    ///
    /// The batch may span order items; every touched item's status is
    /// reprojected, marking a line `COMPLETED` once its full required quantity
    /// is allocated.
    pub fn allocate_to_dealer(
        &self,
        serial_ids: &[SerialUnitId],
        dealer_account_id: DealerAccountId,
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        let units = self.load_batch(serial_ids)?;

        // Pair every unit with its owning order item up front; the CAS plan,
        // the reprojection set and the events all derive from this pairing.
        let mut owners: Vec<(SerialUnitId, OrderItemId)> = Vec::with_capacity(units.len());
        let mut touched_items: Vec<OrderItemRef> = Vec::new();
        for unit in &units {
            let owning = match (unit.state(), unit.order_item_id()) {
                (SerialState::AssignedToOrderItem, Some(owning)) => owning,
                _ => {
                    return Err(EngineError::NotAssigned(format!(
                        "serial {} is not assigned to an order item",
                        unit.serial_number()
                    )));
                }
            };
            if !touched_items.iter().any(|i| i.id == owning) {
                let item = self.orders.order_item(owning).ok_or(EngineError::NotFound)?;
                touched_items.push(item);
            }
            owners.push((unit.id_typed(), owning));
        }

        let now = Utc::now();
        let steps = owners
            .iter()
            .map(|&(id, owning)| CasStep {
                id,
                expected: ExpectedState::assigned_to(owning),
                new_state: SerialState::AllocatedToDealer,
                fields: TransitionFields::allocate(owning, dealer_account_id, now),
                rollback_expected: ExpectedState::allocated_to(owning),
                rollback_state: SerialState::AssignedToOrderItem,
                rollback_fields: TransitionFields::assign(owning, now),
            })
            .collect();

        let updated = self.apply_batch(steps)?;
        for item in &touched_items {
            self.reproject(item)?;
        }

        for (unit, &(_, owning)) in updated.iter().zip(&owners) {
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                unit.id_typed(),
                unit.version(),
                SerialEvent::UnitAllocated(UnitAllocated {
                    unit_id: unit.id_typed(),
                    order_item_id: owning,
                    dealer_account_id,
                    actor,
                    occurred_at: now,
                }),
            );
            self.bus
                .publish(envelope)
                .map_err(|e| EngineError::Publish(format!("{e:?}")))?;
        }

        Ok(updated)
    }

    /// Write off in-stock units as damaged or sold outside the dealer flow.
    pub fn mark_unavailable(
        &self,
        serial_ids: &[SerialUnitId],
        reason: UnavailableReason,
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        let units = self.load_batch(serial_ids)?;
        for unit in &units {
            unit.ensure_in_stock()?;
        }

        let now = Utc::now();
        let target = reason.target_state();
        let steps = serial_ids
            .iter()
            .map(|&id| CasStep {
                id,
                expected: ExpectedState::in_stock(),
                new_state: target,
                fields: TransitionFields::release(now),
                rollback_expected: ExpectedState::written_off(target),
                rollback_state: SerialState::InStock,
                rollback_fields: TransitionFields::release(now),
            })
            .collect();

        let updated = self.apply_batch(steps)?;

        self.publish(&updated, |unit| {
            SerialEvent::UnitWrittenOff(UnitWrittenOff {
                unit_id: unit.id_typed(),
                reason,
                actor,
                occurred_at: now,
            })
        })?;

        Ok(updated)
    }

    /// Load and sanity-check a batch of unit ids (non-empty, no duplicates,
    /// all known).
    fn load_batch(&self, serial_ids: &[SerialUnitId]) -> Result<Vec<SerialUnit>, EngineError> {
        if serial_ids.is_empty() {
            return Err(EngineError::Validation("no serial ids in batch".to_string()));
        }

        let mut units = Vec::with_capacity(serial_ids.len());
        for (idx, &id) in serial_ids.iter().enumerate() {
            if serial_ids[..idx].contains(&id) {
                return Err(EngineError::Validation(format!(
                    "duplicate serial id in batch: {id}"
                )));
            }
            let unit = self.store.get(id)?.ok_or(EngineError::NotFound)?;
            units.push(unit);
        }
        Ok(units)
    }

    /// Issue the batch's compare-and-set writes, unwinding on failure.
    ///
    /// A failed step rolls back the already-applied steps newest-first so the
    /// caller observes the pre-batch state. A rollback write can itself lose a
    /// race (another session touched the unit in the window); that is logged
    /// and skipped, since the unit is then owned by whoever won, not stranded.
    fn apply_batch(&self, steps: Vec<CasStep>) -> Result<Vec<SerialUnit>, EngineError> {
        let mut updated = Vec::with_capacity(steps.len());

        for (idx, step) in steps.iter().enumerate() {
            match self
                .store
                .compare_and_set_state(step.id, step.expected, step.new_state, step.fields)
            {
                Ok(unit) => updated.push(unit),
                Err(err) => {
                    for done in steps[..idx].iter().rev() {
                        if let Err(rollback_err) = self.store.compare_and_set_state(
                            done.id,
                            done.rollback_expected,
                            done.rollback_state,
                            done.rollback_fields,
                        ) {
                            warn!(
                                unit = %done.id,
                                error = %rollback_err,
                                "failed to roll back unit after partial batch"
                            );
                        }
                    }
                    return Err(err.into());
                }
            }
        }

        Ok(updated)
    }

    /// Recompute the order item's status from the store and hand it to the
    /// Order domain.
    fn reproject(&self, item: &OrderItemRef) -> Result<OrderItemStatus, EngineError> {
        let status = project_order_item(&self.store, item)?;
        self.orders.record_status(item.id, status);
        Ok(status)
    }

    fn publish(
        &self,
        updated: &[SerialUnit],
        make_event: impl Fn(&SerialUnit) -> SerialEvent,
    ) -> Result<(), EngineError> {
        for unit in updated {
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                unit.id_typed(),
                unit.version(),
                make_event(unit),
            );
            self.bus
                .publish(envelope)
                .map_err(|e| EngineError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serialtrack_core::OrderId;
    use serialtrack_events::InMemoryEventBus;

    use crate::order_directory::InMemoryOrderDirectory;
    use crate::serial_store::InMemorySerialStore;

    type TestEngine<S> = TransitionEngine<
        Arc<S>,
        Arc<InMemoryEventBus<EventEnvelope<SerialEvent>>>,
        Arc<InMemoryOrderDirectory>,
    >;

    struct Fixture<S: SerialStore> {
        engine: TestEngine<S>,
        store: Arc<S>,
        bus: Arc<InMemoryEventBus<EventEnvelope<SerialEvent>>>,
        orders: Arc<InMemoryOrderDirectory>,
        actor: ActorId,
    }

    fn fixture() -> Fixture<InMemorySerialStore> {
        fixture_with_store(InMemorySerialStore::new())
    }

    fn fixture_with_store<S: SerialStore>(store: S) -> Fixture<S> {
        let store = Arc::new(store);
        let bus = Arc::new(InMemoryEventBus::new());
        let orders = Arc::new(InMemoryOrderDirectory::new());
        let engine = TransitionEngine::new(store.clone(), bus.clone(), orders.clone());
        Fixture {
            engine,
            store,
            bus,
            orders,
            actor: ActorId::new(),
        }
    }

    fn register_item(fx: &Fixture<impl SerialStore>, product: ProductId, quantity: u32) -> OrderItemId {
        let item =
            OrderItemRef::new(OrderItemId::new(), OrderId::new(), product, quantity).unwrap();
        let id = item.id;
        fx.orders.register(item);
        id
    }

    fn receive(fx: &Fixture<impl SerialStore>, product: ProductId, n: usize) -> Vec<SerialUnitId> {
        let serial_numbers = (0..n)
            .map(|i| SerialNumber::new(format!("SN-{i:03}")).unwrap())
            .collect();
        fx.engine
            .receive_into_stock(product, serial_numbers, fx.actor)
            .unwrap()
            .iter()
            .map(|u| u.id_typed())
            .collect()
    }

    #[test]
    fn intake_creates_units_in_stock_and_publishes_events() {
        let fx = fixture();
        let subscription = fx.bus.subscribe();
        let product = ProductId::new();

        let ids = receive(&fx, product, 2);

        for id in &ids {
            let unit = fx.store.get(*id).unwrap().unwrap();
            assert_eq!(unit.state(), SerialState::InStock);
        }

        let first = subscription.try_recv().unwrap();
        assert!(matches!(first.payload(), SerialEvent::UnitReceived(_)));
        assert_eq!(first.sequence_number(), 1);
    }

    #[test]
    fn intake_rejects_duplicate_serial_numbers() {
        let fx = fixture();
        let product = ProductId::new();
        receive(&fx, product, 1);

        let err = fx
            .engine
            .receive_into_stock(
                product,
                vec![SerialNumber::new("SN-000").unwrap()],
                fx.actor,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn assign_reserves_units_and_projects_partial() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 3);
        let ids = receive(&fx, product, 2);

        let updated = fx
            .engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();

        assert_eq!(updated.len(), 2);
        for unit in &updated {
            assert_eq!(unit.state(), SerialState::AssignedToOrderItem);
            assert_eq!(unit.order_item_id(), Some(item));
        }
        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Partial));
    }

    #[test]
    fn assign_rejects_batch_exceeding_quantity() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 3);

        let err = fx
            .engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::QuantityExceeded(_)));

        // Nothing moved.
        for id in &ids {
            let unit = fx.store.get(*id).unwrap().unwrap();
            assert_eq!(unit.state(), SerialState::InStock);
        }
    }

    #[test]
    fn assign_counts_allocated_units_against_quantity() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 3);

        fx.engine
            .assign_to_order_item(item, product, &ids[..2], fx.actor)
            .unwrap();
        fx.engine
            .allocate_to_dealer(&ids[..2], DealerAccountId::new(), fx.actor)
            .unwrap();

        // The line is fully covered by allocated units; one more assign must
        // not slip in.
        let err = fx
            .engine
            .assign_to_order_item(item, product, &ids[2..], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::QuantityExceeded(_)));
    }

    #[test]
    fn assign_rejects_product_mismatch() {
        let fx = fixture();
        let product = ProductId::new();
        let other_product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, other_product, 1);

        // Serial belongs to another product.
        let err = fx
            .engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::ProductMismatch(_)));

        // Request product disagrees with the order item.
        let err = fx
            .engine
            .assign_to_order_item(item, other_product, &ids, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::ProductMismatch(_)));
    }

    #[test]
    fn reissued_assign_is_rejected_not_reapplied() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 1);

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();

        let err = fx
            .engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInStock(_)));

        let unit = fx.store.get(ids[0]).unwrap().unwrap();
        assert_eq!(unit.state(), SerialState::AssignedToOrderItem);
    }

    #[test]
    fn unassign_returns_units_to_stock() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 2);

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();
        fx.engine
            .unassign_from_order_item(item, &ids, fx.actor)
            .unwrap();

        for id in &ids {
            let unit = fx.store.get(*id).unwrap().unwrap();
            assert_eq!(unit.state(), SerialState::InStock);
            assert_eq!(unit.order_item_id(), None);
        }
        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Pending));
    }

    #[test]
    fn unassign_rejects_units_assigned_elsewhere() {
        let fx = fixture();
        let product = ProductId::new();
        let mine = register_item(&fx, product, 2);
        let theirs = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 1);

        fx.engine
            .assign_to_order_item(mine, product, &ids, fx.actor)
            .unwrap();

        let err = fx
            .engine
            .unassign_from_order_item(theirs, &ids, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));
    }

    #[test]
    fn allocation_completes_the_order_item() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 2);
        let dealer = DealerAccountId::new();

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();
        // Fully assigned is not fulfilled yet.
        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Partial));

        let updated = fx
            .engine
            .allocate_to_dealer(&ids, dealer, fx.actor)
            .unwrap();
        for unit in &updated {
            assert_eq!(unit.state(), SerialState::AllocatedToDealer);
            assert_eq!(unit.dealer_account_id(), Some(dealer));
            assert_eq!(unit.order_item_id(), Some(item));
        }
        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Completed));
    }

    #[test]
    fn partial_allocation_projects_partial() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 2);

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();
        fx.engine
            .allocate_to_dealer(&ids[..1], DealerAccountId::new(), fx.actor)
            .unwrap();

        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Partial));
    }

    #[test]
    fn allocation_is_terminal() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 2);
        let dealer = DealerAccountId::new();

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();
        fx.engine.allocate_to_dealer(&ids, dealer, fx.actor).unwrap();

        let err = fx
            .engine
            .unassign_from_order_item(item, &ids[..1], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));

        let err = fx
            .engine
            .allocate_to_dealer(&ids[..1], dealer, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));
    }

    #[test]
    fn allocate_requires_assignment_first() {
        let fx = fixture();
        let product = ProductId::new();
        register_item(&fx, product, 2);
        let ids = receive(&fx, product, 1);

        let err = fx
            .engine
            .allocate_to_dealer(&ids, DealerAccountId::new(), fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));
    }

    #[test]
    fn mark_unavailable_writes_off_stock() {
        let fx = fixture();
        let product = ProductId::new();
        let ids = receive(&fx, product, 2);

        fx.engine
            .mark_unavailable(&ids[..1], UnavailableReason::Damaged, fx.actor)
            .unwrap();
        fx.engine
            .mark_unavailable(&ids[1..], UnavailableReason::Sold, fx.actor)
            .unwrap();

        assert_eq!(
            fx.store.get(ids[0]).unwrap().unwrap().state(),
            SerialState::Damaged
        );
        assert_eq!(
            fx.store.get(ids[1]).unwrap().unwrap().state(),
            SerialState::Sold
        );

        // Written-off units can never be assigned.
        let item = register_item(&fx, product, 2);
        let err = fx
            .engine
            .assign_to_order_item(item, product, &ids[..1], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInStock(_)));
    }

    #[test]
    fn mark_unavailable_rejects_assigned_units() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 1);

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();

        let err = fx
            .engine
            .mark_unavailable(&ids, UnavailableReason::Damaged, fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInStock(_)));
    }

    #[test]
    fn unknown_ids_and_empty_batches_are_rejected() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);

        let err = fx
            .engine
            .assign_to_order_item(item, product, &[], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = fx
            .engine
            .assign_to_order_item(item, product, &[SerialUnitId::new()], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound));

        let ids = receive(&fx, product, 1);
        let err = fx
            .engine
            .assign_to_order_item(item, product, &[ids[0], ids[0]], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn events_carry_actor_and_transition_endpoints() {
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 1);
        let ids = receive(&fx, product, 1);

        let subscription = fx.bus.subscribe();
        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();

        let envelope = subscription.try_recv().unwrap();
        let event = envelope.payload();
        assert_eq!(event.actor(), fx.actor);
        assert_eq!(event.old_state(), Some(SerialState::InStock));
        assert_eq!(event.new_state(), SerialState::AssignedToOrderItem);
        assert_eq!(envelope.unit_id(), ids[0]);
    }

    #[test]
    fn full_lifecycle_scenario() {
        // Order item O needs 2 units of product P.
        let fx = fixture();
        let product = ProductId::new();
        let item = register_item(&fx, product, 2);
        let ids = receive(&fx, product, 2);
        let dealer = DealerAccountId::new();

        fx.engine
            .assign_to_order_item(item, product, &ids, fx.actor)
            .unwrap();
        // Assigned but not allocated: PARTIAL, not COMPLETED.
        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Partial));

        fx.engine.allocate_to_dealer(&ids, dealer, fx.actor).unwrap();
        assert_eq!(fx.orders.status(item), Some(OrderItemStatus::Completed));

        let err = fx
            .engine
            .unassign_from_order_item(item, &ids[..1], fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAssigned(_)));
    }

    /// Store wrapper that makes the forward CAS fail for one designated unit,
    /// simulating a concurrent writer winning mid-batch.
    struct FailingStore {
        inner: InMemorySerialStore,
        fail_on: std::sync::Mutex<Option<SerialUnitId>>,
    }

    impl FailingStore {
        fn new(fail_on: SerialUnitId) -> Self {
            Self {
                inner: InMemorySerialStore::new(),
                fail_on: std::sync::Mutex::new(Some(fail_on)),
            }
        }
    }

    impl SerialStore for FailingStore {
        fn insert(&self, unit: SerialUnit) -> Result<(), SerialStoreError> {
            self.inner.insert(unit)
        }

        fn get(&self, id: SerialUnitId) -> Result<Option<SerialUnit>, SerialStoreError> {
            self.inner.get(id)
        }

        fn find_by_serial_number(
            &self,
            serial_number: &str,
        ) -> Result<Option<SerialUnit>, SerialStoreError> {
            self.inner.find_by_serial_number(serial_number)
        }

        fn get_by_product(
            &self,
            product_id: ProductId,
            state: SerialState,
        ) -> Result<Vec<SerialUnit>, SerialStoreError> {
            self.inner.get_by_product(product_id, state)
        }

        fn get_by_order_item(
            &self,
            order_item_id: OrderItemId,
            state: Option<SerialState>,
        ) -> Result<Vec<SerialUnit>, SerialStoreError> {
            self.inner.get_by_order_item(order_item_id, state)
        }

        fn count_by_product(
            &self,
            product_id: ProductId,
            state: SerialState,
        ) -> Result<u64, SerialStoreError> {
            self.inner.count_by_product(product_id, state)
        }

        fn compare_and_set_state(
            &self,
            id: SerialUnitId,
            expected: ExpectedState,
            new_state: SerialState,
            fields: TransitionFields,
        ) -> Result<SerialUnit, SerialStoreError> {
            let mut fail_on = self.fail_on.lock().unwrap();
            if *fail_on == Some(id) {
                // One-shot: later calls (rollbacks, retries) proceed normally.
                *fail_on = None;
                return Err(SerialStoreError::Conflict(format!(
                    "unit {id}: taken by a concurrent session"
                )));
            }
            self.inner
                .compare_and_set_state(id, expected, new_state, fields)
        }
    }

    #[test]
    fn mid_batch_cas_failure_rolls_back_committed_units() {
        let product = ProductId::new();

        let fail_fx = fixture_with_store(FailingStore::new(SerialUnitId::new()));
        let item = register_item(&fail_fx, product, 3);
        let ids = receive(&fail_fx, product, 3);
        // Arm the failure on the third unit only now that its id is known.
        *fail_fx.store.fail_on.lock().unwrap() = Some(ids[2]);

        let subscription = fail_fx.bus.subscribe();
        let err = fail_fx
            .engine
            .assign_to_order_item(item, product, &ids, fail_fx.actor)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        // Units 1 and 2 were committed and must be back in stock.
        for id in &ids {
            let unit = fail_fx.store.get(*id).unwrap().unwrap();
            assert_eq!(unit.state(), SerialState::InStock);
            assert_eq!(unit.order_item_id(), None);
        }

        // No assignment events escaped the failed batch.
        assert!(subscription.try_recv().is_err());

        // The order item still accepts a clean retry afterwards.
        fail_fx
            .engine
            .assign_to_order_item(item, product, &ids, fail_fx.actor)
            .unwrap();
    }
}
