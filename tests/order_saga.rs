//! End-to-end order fulfilment scenarios against the in-memory collaborators.

use flowstate::collaborators::{
    CollaboratorError, MemoryInventoryLedger, MemoryNotificationSender, MemoryPaymentGateway,
    MemoryShippingProvider, PaymentOutcome, ShippingMethod,
};
use flowstate::config::FlowstateConfig;
use flowstate::domain::order::{Order, OrderDraft, OrderServices, OrderStatus};
use flowstate::enforcement::CallPolicy;
use flowstate::saga::{OrderSaga, SagaError};
use flowstate::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    saga: OrderSaga,
    payments: Arc<MemoryPaymentGateway>,
    inventory: Arc<MemoryInventoryLedger>,
    shipping: Arc<MemoryShippingProvider>,
    notifications: Arc<MemoryNotificationSender>,
}

impl Harness {
    fn new() -> Self {
        Self::with_payments(MemoryPaymentGateway::new())
    }

    fn with_payments(payments: MemoryPaymentGateway) -> Self {
        let inventory = MemoryInventoryLedger::with_stock([("SKU-A", 10), ("SKU-B", 1)]);
        Self::build(payments, inventory, FlowstateConfig::default())
    }

    fn build(
        payments: MemoryPaymentGateway,
        inventory: MemoryInventoryLedger,
        config: FlowstateConfig,
    ) -> Self {
        let payments = Arc::new(payments);
        let inventory = Arc::new(inventory);
        let shipping = Arc::new(MemoryShippingProvider::new());
        let notifications = Arc::new(MemoryNotificationSender::new());
        let services = OrderServices {
            payments: payments.clone(),
            shipping: shipping.clone(),
            inventory: inventory.clone(),
            notifications: notifications.clone(),
            policy: CallPolicy::builder()
                .timeout(Duration::from_millis(200))
                .max_attempts(3)
                .backoff(Duration::from_millis(1))
                .build(),
        };
        let store = Arc::new(MemoryStore::new("order", Order::new));
        let saga = OrderSaga::assemble(store, services, &config).unwrap();
        Self {
            saga,
            payments,
            inventory,
            shipping,
            notifications,
        }
    }

    async fn available(&self, sku: &str) -> u32 {
        self.inventory.level(sku).await.unwrap().available
    }

    async fn paid_order(&self) -> Order {
        let order = self.saga.create_order(widgets(2)).await.unwrap();
        self.saga.initiate_payment(&order.urn).await.unwrap()
    }

    async fn delivered_order(&self) -> Order {
        let order = self.paid_order().await;
        self.saga.complete_processing(&order.urn).await.unwrap();
        self.saga.ship(&order.urn).await.unwrap();
        self.saga.out_for_delivery(&order.urn).await.unwrap();
        self.saga.deliver(&order.urn).await.unwrap()
    }
}

fn widgets(quantity: u32) -> OrderDraft {
    OrderDraft::new("cust-1", "ana@example.com")
        .item("SKU-A", "Widget", quantity, 50.0)
        .shipping(ShippingMethod::Standard, "1 Main St")
}

fn declined() -> PaymentOutcome {
    PaymentOutcome::Decline("card declined".to_string())
}

#[tokio::test]
async fn happy_path_reaches_delivered() {
    let h = Harness::new();
    let order = h.saga.create_order(widgets(2)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.total > 0.0);

    let order = h.saga.initiate_payment(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment.attempts, 1);
    assert_eq!(order.payment.captured, order.total);
    assert_eq!(h.available("SKU-A").await, 8);

    let order = h.saga.complete_processing(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::ReadyToShip);

    let order = h.saga.ship(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
    let shipment = order.shipping.shipment.clone().unwrap();
    assert!(!shipment.tracking_number.is_empty());
    assert_eq!(h.shipping.shipments().await.len(), 1);
    assert_eq!(h.inventory.level("SKU-A").await.unwrap().allocated, 2);

    h.saga.out_for_delivery(&order.urn).await.unwrap();
    let order = h.saga.deliver(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.shipping.delivered_at.is_some());

    let templates = h.notifications.templates_sent_to("ana@example.com").await;
    assert!(templates.contains(&"order.shipped".to_string()));
    assert!(templates.contains(&"order.delivered".to_string()));
    assert!(h.payments.refunds().await.is_empty());
}

#[tokio::test]
async fn declined_payment_can_be_retried() {
    let h = Harness::with_payments(MemoryPaymentGateway::with_outcomes([declined()]));
    let order = h.saga.create_order(widgets(1)).await.unwrap();

    let failed = h.saga.initiate_payment(&order.urn).await.unwrap();
    assert_eq!(failed.status, OrderStatus::PaymentFailed);
    assert_eq!(failed.payment.attempts, 1);
    assert!(failed.payment.failure_reason.as_deref().unwrap().contains("card declined"));

    let paid = h.saga.retry_payment(&order.urn).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Processing);
    assert_eq!(paid.payment.attempts, 2);
    assert!(paid.payment.transaction_id.is_some());
    assert_eq!(h.payments.payments().await.len(), 2);
}

#[tokio::test]
async fn transient_gateway_errors_are_retried_within_one_attempt() {
    let h = Harness::with_payments(MemoryPaymentGateway::with_outcomes([
        PaymentOutcome::Unavailable("gateway busy".to_string()),
        PaymentOutcome::Unavailable("gateway busy".to_string()),
    ]));
    let order = h.saga.create_order(widgets(1)).await.unwrap();

    let order = h.saga.initiate_payment(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment.attempts, 1);
    assert_eq!(h.payments.payments().await.len(), 3);
}

#[tokio::test]
async fn exhausted_payment_attempts_cancel_the_order() {
    let h = Harness::with_payments(MemoryPaymentGateway::with_outcomes([
        declined(),
        declined(),
        declined(),
    ]));
    let order = h.saga.create_order(widgets(1)).await.unwrap();

    h.saga.initiate_payment(&order.urn).await.unwrap();
    h.saga.retry_payment(&order.urn).await.unwrap();
    let order = h.saga.retry_payment(&order.urn).await.unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment.attempts, 3);
    assert!(order
        .cancellation_reason
        .as_deref()
        .unwrap()
        .contains("payment failed after 3 attempts"));
    assert!(h.payments.refunds().await.is_empty());
    assert_eq!(h.available("SKU-A").await, 10);

    let error = h.saga.retry_payment(&order.urn).await.unwrap_err();
    assert!(matches!(error, SagaError::Rejected { .. }));
}

#[tokio::test]
async fn cancel_restores_stock_and_refunds_exactly_once() {
    let h = Harness::new();
    let order = h.paid_order().await;
    assert_eq!(h.available("SKU-A").await, 8);

    let cancelled = h.saga.cancel(&order.urn, "changed my mind").await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.reservations.is_empty());
    assert_eq!(cancelled.payment.refunded, order.total);
    assert_eq!(h.available("SKU-A").await, 10);
    assert_eq!(h.inventory.level("SKU-A").await.unwrap().reserved, 0);

    let refunds = h.payments.refunds_for(&order.urn).await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, order.total);
    assert_eq!(refunds[0].reason, "changed my mind");

    let replay = h.saga.cancel(&order.urn, "again").await.unwrap_err();
    assert_eq!(replay.class().http_status(), 400);
    assert_eq!(h.payments.refunds_for(&order.urn).await.len(), 1);
    assert_eq!(h.available("SKU-A").await, 10);
}

#[tokio::test]
async fn cancel_after_shipping_is_rejected() {
    let h = Harness::new();
    let order = h.paid_order().await;
    h.saga.complete_processing(&order.urn).await.unwrap();
    h.saga.ship(&order.urn).await.unwrap();

    let error = h.saga.cancel(&order.urn, "too late").await.unwrap_err();
    assert_eq!(
        error,
        SagaError::Rejected {
            urn: order.urn.clone(),
            event: "order.cancel".to_string(),
            status: "shipped".to_string(),
        }
    );
    assert!(h.payments.refunds().await.is_empty());
    let stored = h.saga.engine().load(&order.urn).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn return_refunds_exactly_the_requested_amount() {
    let h = Harness::new();
    let order = h.delivered_order().await;

    let returned = h.saga.initiate_return(&order.urn, "damaged").await.unwrap();
    assert_eq!(returned.status, OrderStatus::Returned);
    assert_eq!(returned.return_reason.as_deref(), Some("damaged"));

    let refunded = h.saga.complete_return(&order.urn, 40.0).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.payment.refunded, 40.0);

    let refunds = h.payments.refunds_for(&order.urn).await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, 40.0);
}

#[tokio::test]
async fn return_refund_above_captured_amount_fails_without_committing() {
    let h = Harness::new();
    let order = h.delivered_order().await;
    h.saga.initiate_return(&order.urn, "damaged").await.unwrap();

    let error = h
        .saga
        .complete_return(&order.urn, order.total + 1.0)
        .await
        .unwrap_err();
    assert!(matches!(error, SagaError::Workflow(_)));
    assert!(h.payments.refunds().await.is_empty());
    let stored = h.saga.engine().load(&order.urn).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Returned);
    assert_eq!(stored.payment.refunded, 0.0);
    assert_eq!(h.inventory.level("SKU-A").await.unwrap().allocated, 2);
}

#[tokio::test]
async fn rejected_refund_while_processing_keeps_stock_reserved() {
    let h = Harness::new();
    let order = h.paid_order().await;

    let error = h
        .saga
        .process_refund(&order.urn, Some(1_000_000.0))
        .await
        .unwrap_err();
    assert_eq!(error.class().http_status(), 400);
    assert!(h.payments.refunds().await.is_empty());

    let stored = h.saga.engine().load(&order.urn).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.reservations.len(), 1);
    let level = h.inventory.level("SKU-A").await.unwrap();
    assert_eq!((level.available, level.reserved), (8, 2));

    h.saga.complete_processing(&order.urn).await.unwrap();
    let shipped = h.saga.ship(&order.urn).await.unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(h.inventory.level("SKU-A").await.unwrap().allocated, 2);
}

#[tokio::test]
async fn partial_refund_while_processing_releases_stock() {
    let h = Harness::new();
    let order = h.paid_order().await;

    let refunded = h.saga.process_refund(&order.urn, Some(10.0)).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.payment.refunded, 10.0);
    assert_eq!(h.payments.refunds_for(&order.urn).await[0].amount, 10.0);
    assert_eq!(h.available("SKU-A").await, 10);
}

#[tokio::test]
async fn stock_shortage_cancels_and_refunds() {
    let h = Harness::new();
    let draft = OrderDraft::new("cust-2", "bo@example.com")
        .item("SKU-B", "Gadget", 3, 25.0)
        .shipping(ShippingMethod::Express, "2 Side St");
    let order = h.saga.create_order(draft).await.unwrap();

    let order = h.saga.initiate_payment(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order
        .cancellation_reason
        .as_deref()
        .unwrap()
        .starts_with("inventory unavailable"));
    assert_eq!(h.payments.refunds_for(&order.urn).await.len(), 1);
    assert_eq!(h.available("SKU-B").await, 1);
}

#[tokio::test]
async fn reservation_timeout_releases_every_reserved_line() {
    let inventory = MemoryInventoryLedger::with_stock([("SKU-A", 10), ("SKU-B", 1), ("SKU-C", 5)])
        .with_latency(Duration::from_millis(120));
    let mut config = FlowstateConfig::default();
    config.engine.action_timeout_ms = 300;
    let h = Harness::build(MemoryPaymentGateway::new(), inventory, config);

    let draft = OrderDraft::new("cust-3", "cy@example.com")
        .item("SKU-A", "Widget", 2, 10.0)
        .item("SKU-B", "Gadget", 1, 10.0)
        .item("SKU-C", "Gizmo", 1, 10.0)
        .shipping(ShippingMethod::Standard, "3 Low Rd");
    let order = h.saga.create_order(draft).await.unwrap();

    let order = h.saga.initiate_payment(&order.urn).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.reservations.is_empty());
    assert!(h.inventory.open_reservations().await.is_empty());
    assert_eq!(h.available("SKU-A").await, 10);
    assert_eq!(h.available("SKU-B").await, 1);
    assert_eq!(h.available("SKU-C").await, 5);
    assert_eq!(h.payments.refunds_for(&order.urn).await.len(), 1);
}

#[tokio::test]
async fn slow_refund_is_issued_once_across_cancel_retries() {
    let h = Harness::new();
    let order = h.paid_order().await;
    h.payments.set_latency(Some(Duration::from_millis(400))).await;

    let error = h.saga.cancel(&order.urn, "changed my mind").await.unwrap_err();
    assert!(matches!(error, SagaError::Workflow(_)));
    assert_eq!(h.payments.refunds_for(&order.urn).await.len(), 1);
    let stored = h.saga.engine().load(&order.urn).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);

    h.payments.set_latency(None).await;
    let cancelled = h.saga.cancel(&order.urn, "changed my mind").await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment.refunded, order.total);
    assert_eq!(h.payments.refunds_for(&order.urn).await.len(), 1);
    assert_eq!(h.available("SKU-A").await, 10);
}

#[tokio::test]
async fn shipment_failure_leaves_order_ready_to_ship() {
    let h = Harness::new();
    let order = h.paid_order().await;
    h.saga.complete_processing(&order.urn).await.unwrap();
    h.shipping
        .fail_next(CollaboratorError::Declined {
            operation: "create_shipment".to_string(),
            reason: "address rejected".to_string(),
        })
        .await;

    assert!(h.saga.ship(&order.urn).await.is_err());
    let stored = h.saga.engine().load(&order.urn).await.unwrap();
    assert_eq!(stored.status, OrderStatus::ReadyToShip);
    assert!(!h.saga.engine().reconciliation_items().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cancels_refund_once() {
    let h = Harness::new();
    let order = h.paid_order().await;

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let saga = h.saga.clone();
            let urn = order.urn.clone();
            tokio::spawn(async move { saga.cancel(&urn, format!("cancel #{i}")).await })
        })
        .collect();

    let mut cancelled = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::Cancelled);
                cancelled += 1;
            }
            Err(error) => assert!(matches!(error, SagaError::Rejected { .. })),
        }
    }

    assert_eq!(cancelled, 1);
    assert_eq!(h.payments.refunds_for(&order.urn).await.len(), 1);
    assert_eq!(h.available("SKU-A").await, 10);
}
