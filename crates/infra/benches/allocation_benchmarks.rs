use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use serialtrack_core::{ActorId, DealerAccountId, OrderId, OrderItemId, ProductId, SerialUnitId};
use serialtrack_events::{EventEnvelope, InMemoryEventBus};
use serialtrack_infra::engine::TransitionEngine;
use serialtrack_infra::order_directory::InMemoryOrderDirectory;
use serialtrack_infra::query::QueryFacade;
use serialtrack_infra::serial_store::InMemorySerialStore;
use serialtrack_orders::OrderItemRef;
use serialtrack_serials::{SerialEvent, SerialNumber};

type BenchEngine = TransitionEngine<
    Arc<InMemorySerialStore>,
    Arc<InMemoryEventBus<EventEnvelope<SerialEvent>>>,
    Arc<InMemoryOrderDirectory>,
>;

struct Setup {
    engine: BenchEngine,
    store: Arc<InMemorySerialStore>,
    orders: Arc<InMemoryOrderDirectory>,
    product: ProductId,
    actor: ActorId,
}

fn setup(stock: usize) -> Setup {
    let store = Arc::new(InMemorySerialStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let orders = Arc::new(InMemoryOrderDirectory::new());
    let engine = TransitionEngine::new(store.clone(), bus.clone(), orders.clone());

    let product = ProductId::new();
    let actor = ActorId::new();
    let serial_numbers = (0..stock)
        .map(|i| SerialNumber::new(format!("SN-{i:06}")).unwrap())
        .collect();
    engine
        .receive_into_stock(product, serial_numbers, actor)
        .unwrap();

    Setup {
        engine,
        store,
        orders,
        product,
        actor,
    }
}

fn register_item(setup: &Setup, quantity: u32) -> OrderItemId {
    let item = OrderItemRef::new(OrderItemId::new(), OrderId::new(), setup.product, quantity)
        .unwrap();
    let id = item.id;
    setup.orders.register(item);
    id
}

fn bench_assign_unassign_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign_unassign_cycle");

    for batch_size in [1usize, 5, 20] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let s = setup(batch_size);
                let item = register_item(&s, batch_size as u32);
                let facade = QueryFacade::new(s.store.clone());
                let ids: Vec<SerialUnitId> = facade
                    .available_serials(s.product)
                    .unwrap()
                    .iter()
                    .map(|u| u.id_typed())
                    .collect();

                b.iter(|| {
                    s.engine
                        .assign_to_order_item(item, s.product, black_box(&ids), s.actor)
                        .unwrap();
                    s.engine
                        .unassign_from_order_item(item, black_box(&ids), s.actor)
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_allocation_pipeline(c: &mut Criterion) {
    c.bench_function("assign_then_allocate_batch_of_10", |b| {
        b.iter_batched(
            || {
                let s = setup(10);
                let item = register_item(&s, 10);
                let facade = QueryFacade::new(s.store.clone());
                let ids: Vec<SerialUnitId> = facade
                    .available_serials(s.product)
                    .unwrap()
                    .iter()
                    .map(|u| u.id_typed())
                    .collect();
                (s, item, ids)
            },
            |(s, item, ids)| {
                s.engine
                    .assign_to_order_item(item, s.product, &ids, s.actor)
                    .unwrap();
                s.engine
                    .allocate_to_dealer(&ids, DealerAccountId::new(), s.actor)
                    .unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_inventory_counts(c: &mut Criterion) {
    c.bench_function("inventory_counts_1000_units", |b| {
        let s = setup(1000);
        let facade = QueryFacade::new(s.store.clone());

        b.iter(|| facade.inventory_counts(black_box(s.product)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_assign_unassign_cycle,
    bench_allocation_pipeline,
    bench_inventory_counts
);
criterion_main!(benches);
