//! Inventory events delivered through the in-memory broker.

use flowstate::broker::{BrokerBridge, BrokerMessage, Disposition, MemoryBroker};
use flowstate::config::BrokerConfig;
use flowstate::domain::inventory::{
    inventory_actions, inventory_routes, inventory_table, InventoryItem, InventoryStatus,
    MovementKind,
};
use flowstate::engine::WorkflowEngine;
use flowstate::store::MemoryStore;
use serde_json::json;
use std::sync::Arc;

fn config() -> BrokerConfig {
    BrokerConfig {
        max_deliveries: 3,
        partitions: 2,
        backoff_ms: 1,
        channel_capacity: 16,
    }
}

async fn bridge_with_item(sku: &str) -> (Arc<BrokerBridge<InventoryItem>>, String) {
    let store = Arc::new(MemoryStore::new("inventory", InventoryItem::new));
    let engine = WorkflowEngine::builder(inventory_table().unwrap(), store)
        .actions(inventory_actions())
        .build();
    let item = engine
        .create(|item| item.describe(sku, "Widget", 2.5))
        .await
        .unwrap();
    let bridge = Arc::new(BrokerBridge::new(engine, inventory_routes(), config()));
    (bridge, item.urn)
}

#[tokio::test]
async fn dispatch_settles_each_message_once() {
    let (bridge, urn) = bridge_with_item("SKU-1").await;

    let received = BrokerMessage::event("inventory.stock.received", "SKU-1", json!({"quantity": 10}));
    assert_eq!(bridge.dispatch(&received).await, Disposition::Applied);

    let audit = BrokerMessage::event("inventory.audit.requested", "SKU-1", json!({"requestedBy": "ops"}));
    assert_eq!(bridge.dispatch(&audit).await, Disposition::Applied);
    assert_eq!(bridge.dispatch(&audit).await, Disposition::Ignored);

    let unknown_sku = BrokerMessage::event("inventory.stock.received", "SKU-404", json!({"quantity": 1}));
    assert_eq!(bridge.dispatch(&unknown_sku).await, Disposition::Unroutable);

    let unknown_topic = BrokerMessage::event("inventory.stock.counted", "SKU-1", json!({}));
    assert_eq!(bridge.dispatch(&unknown_topic).await, Disposition::Unroutable);

    let item = bridge.engine().load(&urn).await.unwrap();
    assert_eq!(item.status, InventoryStatus::Auditing);
    assert_eq!(item.audit.unwrap().requested_by, "ops");
    assert!(bridge.dead_letters().await.is_empty());
}

#[tokio::test]
async fn producer_envelopes_are_unwrapped() {
    let (bridge, urn) = bridge_with_item("SKU-1").await;

    let received = BrokerMessage::new(
        "inventory.stock.received",
        "SKU-1",
        json!({"key": "SKU-1", "event": {"sku": "SKU-1", "quantity": 10, "batchNumber": "B-7"}}),
    );
    assert_eq!(bridge.dispatch(&received).await, Disposition::Applied);

    let item = bridge.engine().load(&urn).await.unwrap();
    assert_eq!(item.status, InventoryStatus::Available);
    assert_eq!(item.quantity, 10);
    assert_eq!(item.available, 10);
    assert_eq!(item.batch_number.as_deref(), Some("B-7"));
}

#[tokio::test]
async fn bare_event_bodies_are_dead_lettered_not_ignored() {
    let (bridge, urn) = bridge_with_item("SKU-1").await;

    let bare = BrokerMessage::new("inventory.stock.received", "SKU-1", json!({"quantity": 10}));
    assert_eq!(bridge.dispatch(&bare).await, Disposition::DeadLettered);
    assert!(bridge.dead_letters().await[0].error.contains("envelope"));

    let item = bridge.engine().load(&urn).await.unwrap();
    assert_eq!(item.quantity, 0);
}

#[tokio::test]
async fn rejected_payloads_are_dead_lettered_not_retried() {
    let (bridge, urn) = bridge_with_item("SKU-2").await;
    bridge
        .dispatch(&BrokerMessage::event("inventory.stock.received", "SKU-2", json!({"quantity": 4})))
        .await;

    let missing_delta = BrokerMessage::event("inventory.stock.adjusted", "SKU-2", json!({"reason": "recount"}));
    assert_eq!(bridge.dispatch(&missing_delta).await, Disposition::DeadLettered);

    let letters = bridge.dead_letters().await;
    assert_eq!(letters.len(), 1);
    assert!(letters[0].error.contains("adjustmentQuantity is required"));
    assert_eq!(letters[0].message.attempt, 1);

    let item = bridge.engine().load(&urn).await.unwrap();
    assert_eq!(item.quantity, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workers_apply_in_order_and_commit_offsets() {
    let (bridge, urn) = bridge_with_item("SKU-3").await;
    let broker = Arc::new(MemoryBroker::new(&config()));
    let workers = Arc::clone(&bridge).spawn_workers(Arc::clone(&broker));
    assert_eq!(workers.len(), 2);

    let messages = [
        ("inventory.stock.received", json!({"quantity": 10, "batchNumber": "B-1"})),
        ("inventory.stock.received", json!({"quantity": 5})),
        ("inventory.stock.adjusted", json!({"adjustmentQuantity": -2, "reason": "breakage"})),
        ("inventory.stock.adjusted", json!({"reason": "no delta"})),
    ];
    let mut last = None;
    for (topic, value) in messages {
        last = Some(broker.publish(topic, "SKU-3", value).await.unwrap());
    }
    let (partition, offset) = last.unwrap();
    assert_eq!(offset, 3);

    broker.close().await;
    let mut settled = 0;
    for worker in workers {
        settled += worker.await.unwrap();
    }
    assert_eq!(settled, 4);
    assert_eq!(broker.committed_offset(partition), Some(3));

    let item = bridge.engine().load(&urn).await.unwrap();
    assert_eq!(item.status, InventoryStatus::Available);
    assert_eq!(item.quantity, 13);
    assert_eq!(item.available, 13);
    assert_eq!(item.batch_number.as_deref(), Some("B-1"));
    let kinds: Vec<_> = item.movements.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![MovementKind::In, MovementKind::In, MovementKind::Adjustment]
    );

    let letters = bridge.dead_letters().await;
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].message.offset, 3);
}
