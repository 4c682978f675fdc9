//! Order Fulfillment
//!
//! This example runs an order through the saga and feeds warehouse events
//! through the broker.
//!
//! Key concepts:
//! - Pricing and validating an order draft
//! - Payment with a declined first attempt and a retry
//! - Stock reservation, shipment and delivery
//! - Cancellation compensations (stock release and refund)
//! - Inventory events routed by SKU across broker partitions
//!
//! Run with: cargo run --example order_fulfillment
//! Set `RUST_LOG=debug` or `FLOWSTATE__LOG__JSON=true` to change the output.

use flowstate::broker::{BrokerBridge, MemoryBroker};
use flowstate::collaborators::{
    MemoryInventoryLedger, MemoryNotificationSender, MemoryPaymentGateway,
    MemoryShippingProvider, PaymentOutcome, ShippingMethod,
};
use flowstate::config::FlowstateConfig;
use flowstate::domain::inventory::{
    inventory_actions, inventory_routes, inventory_table, InventoryItem,
};
use flowstate::domain::order::{Order, OrderDraft, OrderServices};
use flowstate::engine::WorkflowEngine;
use flowstate::saga::OrderSaga;
use flowstate::store::{EntityStore, MemoryStore};
use flowstate::telemetry::init_tracing;
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = FlowstateConfig::load(None)?;
    init_tracing(&config.log)?;

    println!("=== Order Fulfillment ===\n");
    order_saga(&config).await?;

    println!("\n=== Warehouse Events ===\n");
    inventory_events(&config).await?;

    Ok(())
}

async fn order_saga(config: &FlowstateConfig) -> Result<(), Box<dyn Error>> {
    let payments = Arc::new(MemoryPaymentGateway::with_outcomes([PaymentOutcome::Decline(
        "insufficient funds".to_string(),
    )]));
    let inventory = Arc::new(MemoryInventoryLedger::with_stock([
        ("SKU-WIDGET", 25),
        ("SKU-GADGET", 4),
    ]));
    let shipping = Arc::new(MemoryShippingProvider::new());
    let notifications = Arc::new(MemoryNotificationSender::new());
    let services = OrderServices {
        payments: payments.clone(),
        shipping: shipping.clone(),
        inventory: inventory.clone(),
        notifications: notifications.clone(),
        policy: config.collaborators.call_policy(),
    };
    let store = Arc::new(MemoryStore::new("order", Order::new));
    let saga = OrderSaga::assemble(store, services, config)?;

    let draft = OrderDraft::new("cust-42", "sam@example.com")
        .item("SKU-WIDGET", "Widget", 3, 19.99)
        .item("SKU-GADGET", "Gadget", 1, 249.0)
        .shipping(ShippingMethod::Express, "42 Harbour Road");
    let order = saga.create_order(draft).await?;
    println!(
        "Created {} (subtotal {:.2}, tax {:.2}, shipping {:.2}, total {:.2})",
        order.order_number, order.subtotal, order.tax, order.shipping_cost, order.total
    );

    let order = saga.initiate_payment(&order.urn).await?;
    println!(
        "First payment attempt: {} ({})",
        order.status,
        order.payment.failure_reason.as_deref().unwrap_or("-")
    );

    let order = saga.retry_payment(&order.urn).await?;
    println!(
        "Retry: {} with transaction {}",
        order.status,
        order.payment.transaction_id.as_deref().unwrap_or("-")
    );

    saga.complete_processing(&order.urn).await?;
    let order = saga.ship(&order.urn).await?;
    if let Some(shipment) = &order.shipping.shipment {
        println!(
            "Shipped with {} as {}, due {}",
            shipment.carrier,
            shipment.tracking_number,
            shipment.estimated_delivery.format("%Y-%m-%d")
        );
    }
    saga.out_for_delivery(&order.urn).await?;
    let order = saga.deliver(&order.urn).await?;
    println!("Final status: {}", order.status);

    println!("\nTimeline:");
    for entry in &order.timeline {
        println!("  {:<20} {}", entry.event, entry.description);
    }

    let second = saga
        .create_order(
            OrderDraft::new("cust-43", "kim@example.com")
                .item("SKU-GADGET", "Gadget", 2, 249.0)
                .shipping(ShippingMethod::Standard, "7 Mill Lane"),
        )
        .await?;
    saga.initiate_payment(&second.urn).await?;
    let cancelled = saga.cancel(&second.urn, "customer request").await?;
    let gadget = inventory.level("SKU-GADGET").await.unwrap_or_default();
    println!(
        "\nSecond order {} -> {}; refunded {:.2}; gadgets available again: {}",
        cancelled.order_number, cancelled.status, cancelled.payment.refunded, gadget.available
    );

    println!(
        "Notifications sent: {}",
        notifications
            .sent()
            .await
            .iter()
            .map(|n| n.template.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

async fn inventory_events(config: &FlowstateConfig) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new("inventory", InventoryItem::new));
    let engine = WorkflowEngine::builder(inventory_table()?, store)
        .actions(inventory_actions())
        .config(config.engine.clone())
        .build();

    for (sku, name) in [("SKU-WIDGET", "Widget"), ("SKU-GADGET", "Gadget")] {
        engine.create(|item| item.describe(sku, name, 4.5)).await?;
    }

    let bridge = Arc::new(BrokerBridge::new(
        engine.clone(),
        inventory_routes(),
        config.broker.clone(),
    ));
    let broker = Arc::new(MemoryBroker::new(&config.broker));
    let workers = Arc::clone(&bridge).spawn_workers(Arc::clone(&broker));

    let events = [
        ("inventory.stock.received", "SKU-WIDGET", json!({"quantity": 120, "batchNumber": "B-2024-07"})),
        ("inventory.stock.received", "SKU-GADGET", json!({"quantity": 12})),
        ("inventory.stock.adjusted", "SKU-WIDGET", json!({"adjustmentQuantity": -3, "reason": "damaged in handling"})),
        ("inventory.audit.requested", "SKU-GADGET", json!({"requestedBy": "night-shift"})),
        ("inventory.audit.requested", "SKU-GADGET", json!({"requestedBy": "night-shift"})),
        ("inventory.stock.received", "SKU-UNKNOWN", json!({"quantity": 1})),
        ("inventory.stock.adjusted", "SKU-WIDGET", json!({"reason": "missing delta"})),
    ];
    for (topic, key, value) in events {
        let (partition, offset) = broker.publish(topic, key, value).await?;
        println!("Published {topic} for {key} at {partition}/{offset}");
    }

    broker.close().await;
    let mut settled = 0;
    for worker in workers {
        settled += worker.await?;
    }
    println!("\nSettled {settled} messages");

    for partition in 0..broker.partitions() {
        println!(
            "Partition {partition} committed through {:?}",
            broker.committed_offset(partition)
        );
    }
    for item in engine.store().find_all().await? {
        println!(
            "{:<12} {:<10} on hand {:>4}, available {:>4}",
            item.sku, item.status, item.quantity, item.available
        );
    }
    for letter in bridge.dead_letters().await {
        println!("Dead letter: {} ({})", letter.message.topic, letter.error);
    }
    Ok(())
}
