use std::sync::{Arc, Mutex};

use serialtrack_core::{ActorId, DealerAccountId, OrderItemId, ProductId, SerialUnitId};
use serialtrack_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use serialtrack_infra::{
    engine::{EngineError, TransitionEngine},
    order_directory::{InMemoryOrderDirectory, OrderDirectory},
    projections::{AuditRecord, AuditTrail, project_order_item},
    query::{InventoryCounts, QueryFacade},
    serial_store::{InMemorySerialStore, SerialStore, SerialStoreError},
};
use serialtrack_orders::{OrderItemRef, OrderItemStatus};
use serialtrack_serials::{SerialEvent, SerialNumber, SerialUnit, UnavailableReason};

#[cfg(feature = "postgres")]
use serialtrack_infra::serial_store::PostgresSerialStore;

type Bus = Arc<InMemoryEventBus<EventEnvelope<SerialEvent>>>;

/// Service wiring over one store backend.
///
/// The audit trail is fed synchronously: the engine publishes to the bus and
/// the request that caused the transition drains the feed before responding,
/// so there is no background consumer.
pub struct Services<S: SerialStore + Clone> {
    store: S,
    engine: TransitionEngine<S, Bus, Arc<InMemoryOrderDirectory>>,
    facade: QueryFacade<S>,
    orders: Arc<InMemoryOrderDirectory>,
    audit: AuditTrail,
    audit_feed: Mutex<Subscription<EventEnvelope<SerialEvent>>>,
}

impl<S: SerialStore + Clone> Services<S> {
    fn new(store: S) -> Self {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let orders = Arc::new(InMemoryOrderDirectory::new());
        let audit_feed = Mutex::new(bus.subscribe());
        let engine = TransitionEngine::new(store.clone(), bus, orders.clone());
        let facade = QueryFacade::new(store.clone());

        Self {
            store,
            engine,
            facade,
            orders,
            audit: AuditTrail::new(),
            audit_feed,
        }
    }

    fn drain_audit(&self) {
        if let Ok(feed) = self.audit_feed.lock() {
            while let Ok(envelope) = feed.try_recv() {
                if let Err(e) = self.audit.apply_envelope(&envelope) {
                    tracing::warn!(error = %e, "failed to record audit envelope");
                }
            }
        }
    }

    fn order_item_status(
        &self,
        id: OrderItemId,
    ) -> Result<Option<(OrderItemRef, OrderItemStatus)>, SerialStoreError> {
        let Some(item) = self.orders.order_item(id) else {
            return Ok(None);
        };
        let status = project_order_item(&self.store, &item)?;
        Ok(Some((item, status)))
    }
}

/// Application services behind the HTTP handlers.
///
/// In-memory by default; the `postgres` feature adds a persistent backend
/// selected at startup via `USE_PERSISTENT_STORES` + `DATABASE_URL`.
pub enum AppServices {
    InMemory(Services<Arc<InMemorySerialStore>>),
    #[cfg(feature = "postgres")]
    Postgres(Services<PostgresSerialStore>),
}

macro_rules! with_services {
    ($self:expr, $services:ident => $body:expr) => {
        match $self {
            AppServices::InMemory($services) => $body,
            #[cfg(feature = "postgres")]
            AppServices::Postgres($services) => $body,
        }
    };
}

impl AppServices {
    // Transition engine operations. Each drains the audit feed after the
    // engine returns so the trail reflects this request's transitions.

    pub fn receive_serials(
        &self,
        product_id: ProductId,
        serial_numbers: Vec<SerialNumber>,
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        with_services!(self, s => {
            let result = s.engine.receive_into_stock(product_id, serial_numbers, actor);
            s.drain_audit();
            result
        })
    }

    pub fn assign_serials(
        &self,
        order_item_id: OrderItemId,
        product_id: ProductId,
        serial_ids: &[SerialUnitId],
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        with_services!(self, s => {
            let result = s
                .engine
                .assign_to_order_item(order_item_id, product_id, serial_ids, actor);
            s.drain_audit();
            result
        })
    }

    pub fn unassign_serials(
        &self,
        order_item_id: OrderItemId,
        serial_ids: &[SerialUnitId],
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        with_services!(self, s => {
            let result = s
                .engine
                .unassign_from_order_item(order_item_id, serial_ids, actor);
            s.drain_audit();
            result
        })
    }

    pub fn allocate_serials(
        &self,
        serial_ids: &[SerialUnitId],
        dealer_account_id: DealerAccountId,
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        with_services!(self, s => {
            let result = s
                .engine
                .allocate_to_dealer(serial_ids, dealer_account_id, actor);
            s.drain_audit();
            result
        })
    }

    pub fn mark_unavailable(
        &self,
        serial_ids: &[SerialUnitId],
        reason: UnavailableReason,
        actor: ActorId,
    ) -> Result<Vec<SerialUnit>, EngineError> {
        with_services!(self, s => {
            let result = s.engine.mark_unavailable(serial_ids, reason, actor);
            s.drain_audit();
            result
        })
    }

    // Query façade reads.

    pub fn available_serials(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        with_services!(self, s => s.facade.available_serials(product_id))
    }

    pub fn assigned_serials(
        &self,
        order_item_id: OrderItemId,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        with_services!(self, s => s.facade.assigned_serials(order_item_id))
    }

    pub fn allocated_serials(
        &self,
        order_item_id: OrderItemId,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        with_services!(self, s => s.facade.allocated_serials(order_item_id))
    }

    pub fn inventory_counts(
        &self,
        product_id: ProductId,
    ) -> Result<InventoryCounts, SerialStoreError> {
        with_services!(self, s => s.facade.inventory_counts(product_id))
    }

    pub fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<SerialUnit>, SerialStoreError> {
        with_services!(self, s => s.facade.find_by_serial_number(serial_number))
    }

    // Order domain boundary.

    pub fn register_order_item(&self, item: OrderItemRef) {
        with_services!(self, s => s.orders.register(item))
    }

    pub fn order_item_status(
        &self,
        id: OrderItemId,
    ) -> Result<Option<(OrderItemRef, OrderItemStatus)>, SerialStoreError> {
        with_services!(self, s => s.order_item_status(id))
    }

    // Audit trail.

    pub fn unit_history(&self, unit_id: SerialUnitId) -> Vec<AuditRecord> {
        with_services!(self, s => {
            s.drain_audit();
            s.audit.for_unit(unit_id)
        })
    }
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            return build_postgres_services().await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
        }
    }

    AppServices::InMemory(Services::new(Arc::new(InMemorySerialStore::new())))
}

#[cfg(feature = "postgres")]
async fn build_postgres_services() -> AppServices {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let pool = sqlx::PgPool::connect(&url)
        .await
        .expect("failed to connect to postgres");

    AppServices::Postgres(Services::new(PostgresSerialStore::new(pool)))
}
