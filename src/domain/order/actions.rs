//! Order business actions and their compensations.

use super::keys;
use super::{round_cents, Order, OrderEvent, OrderStatus};
use crate::actions::{ActionError, ActionHandler, ActionRegistry, Compensation, FnAction};
use crate::collaborators::{
    InventoryLedger, Notification, NotificationSender, PaymentGateway, RefundRequest,
    Reservation, ShipmentRequest, ShippingProvider,
};
use crate::core::{Payload, Status};
use crate::enforcement::CallPolicy;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators the order actions depend on.
#[derive(Clone)]
pub struct OrderServices {
    pub payments: Arc<dyn PaymentGateway>,
    pub shipping: Arc<dyn ShippingProvider>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub notifications: Arc<dyn NotificationSender>,
    pub policy: CallPolicy,
}

impl fmt::Debug for OrderServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderServices")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Holds stock for every order line. Lines that already hold a reservation
/// are skipped; if any line cannot be reserved, the reservations taken by
/// this call are released again.
pub struct ReserveInventory {
    inventory: Arc<dyn InventoryLedger>,
    policy: CallPolicy,
}

impl ReserveInventory {
    pub const NAME: &'static str = "reserve_inventory";

    pub fn new(inventory: Arc<dyn InventoryLedger>, policy: CallPolicy) -> Self {
        Self { inventory, policy }
    }

    async fn undo(&self, taken: &[Reservation]) {
        for reservation in taken {
            let inventory = &self.inventory;
            if let Err(error) = self
                .policy
                .run("inventory.release", move || inventory.release(reservation))
                .await
            {
                warn!(reservation = %reservation.reservation_id, %error, "could not release partial reservation");
            }
        }
    }
}

#[async_trait]
impl ActionHandler<Order> for ReserveInventory {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, mut order: Order, _payload: &Payload) -> Result<Order, ActionError> {
        let mut taken = Vec::new();
        for item in &order.items {
            if order.reservations.iter().any(|r| r.sku == item.sku) {
                debug!(sku = %item.sku, "line already reserved");
                continue;
            }
            let inventory = &self.inventory;
            let (sku, quantity, urn) = (item.sku.as_str(), item.quantity, order.urn.as_str());
            match self
                .policy
                .run("inventory.reserve", move || inventory.reserve(sku, quantity, urn))
                .await
            {
                Ok(reservation) => taken.push(reservation),
                Err(error) => {
                    self.undo(&taken).await;
                    return Err(ActionError::collaborator(Self::NAME, error));
                }
            }
        }

        let lines = taken.len();
        order.reservations.extend(taken);
        order.log("processing_started", format!("Reserved stock for {lines} line(s)"));
        Ok(order)
    }
}

/// Returns held stock to the ledger.
///
/// Releases by order urn rather than by the reservations recorded on the
/// order, so stock reserved by an abandoned [`ReserveInventory`] call is
/// freed too. Registered both as the compensation for [`ReserveInventory`]
/// and as a refund step; it does nothing once stock has been allocated to a
/// shipment.
#[derive(Clone)]
pub struct ReleaseInventory {
    inventory: Arc<dyn InventoryLedger>,
    policy: CallPolicy,
}

impl ReleaseInventory {
    pub const NAME: &'static str = "release_inventory";

    pub fn new(inventory: Arc<dyn InventoryLedger>, policy: CallPolicy) -> Self {
        Self { inventory, policy }
    }

    async fn release(&self, mut order: Order) -> Result<Order, ActionError> {
        if order.allocated {
            return Ok(order);
        }
        let inventory = &self.inventory;
        let urn = order.urn.as_str();
        let released = self
            .policy
            .run("inventory.release_order", move || inventory.release_order(urn))
            .await
            .map_err(|e| ActionError::collaborator(Self::NAME, e))?;
        order.reservations.clear();
        if released > 0 {
            order.log("inventory_released", format!("Released stock for {released} line(s)"));
        }
        Ok(order)
    }
}

#[async_trait]
impl ActionHandler<Order> for ReleaseInventory {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, order: Order, _payload: &Payload) -> Result<Order, ActionError> {
        self.release(order).await
    }
}

#[async_trait]
impl Compensation<Order> for ReleaseInventory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn forward(&self) -> &str {
        ReserveInventory::NAME
    }

    fn applies(&self, order: &Order) -> bool {
        !order.allocated
    }

    async fn compensate(&self, order: Order, _payload: &Payload) -> Result<Order, ActionError> {
        self.release(order).await
    }
}

/// Commits held stock to the outgoing shipment.
pub struct AllocateInventory {
    inventory: Arc<dyn InventoryLedger>,
    policy: CallPolicy,
}

impl AllocateInventory {
    pub const NAME: &'static str = "allocate_inventory";

    pub fn new(inventory: Arc<dyn InventoryLedger>, policy: CallPolicy) -> Self {
        Self { inventory, policy }
    }
}

#[async_trait]
impl ActionHandler<Order> for AllocateInventory {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, mut order: Order, _payload: &Payload) -> Result<Order, ActionError> {
        if order.allocated {
            return Ok(order);
        }
        for reservation in &order.reservations {
            let inventory = &self.inventory;
            self.policy
                .run("inventory.allocate", move || inventory.allocate(reservation))
                .await
                .map_err(|e| ActionError::collaborator(Self::NAME, e))?;
        }
        order.allocated = true;
        Ok(order)
    }
}

/// Books the shipment with the carrier for the order's shipping method.
pub struct CreateShipment {
    shipping: Arc<dyn ShippingProvider>,
    policy: CallPolicy,
}

impl CreateShipment {
    pub const NAME: &'static str = "create_shipment";

    pub fn new(shipping: Arc<dyn ShippingProvider>, policy: CallPolicy) -> Self {
        Self { shipping, policy }
    }
}

#[async_trait]
impl ActionHandler<Order> for CreateShipment {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, mut order: Order, _payload: &Payload) -> Result<Order, ActionError> {
        if order.shipping.shipment.is_some() {
            return Ok(order);
        }
        let request = ShipmentRequest {
            order_urn: order.urn.clone(),
            order_number: order.order_number.clone(),
            method: order.shipping.method,
            address: order.shipping.address.clone(),
        };
        let shipping = &self.shipping;
        let request = &request;
        let shipment = self
            .policy
            .run("shipping.create_shipment", move || shipping.create_shipment(request))
            .await
            .map_err(|e| ActionError::collaborator(Self::NAME, e))?;

        info!(
            order = %order.order_number,
            tracking = %shipment.tracking_number,
            carrier = %shipment.carrier,
            "shipment created"
        );
        order.log(
            "order_shipped",
            format!(
                "Shipped via {}, tracking {}",
                shipment.carrier, shipment.tracking_number
            ),
        );
        order.shipping.shipment = Some(shipment);
        Ok(order)
    }
}

async fn refund(
    payments: &Arc<dyn PaymentGateway>,
    policy: &CallPolicy,
    action: &str,
    mut order: Order,
    amount: f64,
    reason: String,
) -> Result<Order, ActionError> {
    let request = RefundRequest {
        order_urn: order.urn.clone(),
        transaction_id: order.payment.transaction_id.clone(),
        amount: round_cents(amount),
        reason,
        idempotency_key: format!("{}:refund:{}", order.urn, order.payment.refunds),
    };
    let request = &request;
    let receipt = policy
        .without_timeout_retries()
        .run("payments.refund", move || payments.refund(request))
        .await
        .map_err(|e| ActionError::collaborator(action, e))?;

    order.payment.refunded = round_cents(order.payment.refunded + receipt.amount);
    order.payment.refunds += 1;
    info!(
        order = %order.order_number,
        amount = receipt.amount,
        refund = %receipt.refund_id,
        "payment refunded"
    );
    order.log(
        "payment_refunded",
        format!("Refunded {:.2} ({})", receipt.amount, receipt.refund_id),
    );
    Ok(order)
}

/// Returns every captured, unrefunded cent when an order is cancelled.
pub struct RefundPayment {
    payments: Arc<dyn PaymentGateway>,
    policy: CallPolicy,
}

impl RefundPayment {
    pub const NAME: &'static str = "refund_payment";

    pub fn new(payments: Arc<dyn PaymentGateway>, policy: CallPolicy) -> Self {
        Self { payments, policy }
    }
}

#[async_trait]
impl Compensation<Order> for RefundPayment {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn forward(&self) -> &str {
        "record_payment"
    }

    fn applies(&self, order: &Order) -> bool {
        order.payment.refundable() > 0.0
    }

    async fn compensate(&self, order: Order, payload: &Payload) -> Result<Order, ActionError> {
        let amount = order.payment.refundable();
        let reason = payload
            .str(keys::CANCELLATION_REASON)
            .unwrap_or("order cancelled")
            .to_string();
        refund(&self.payments, &self.policy, Self::NAME, order, amount, reason).await
    }
}

/// Refunds `refundAmount` from the payload.
///
/// When the amount is optional, a missing amount refunds the remainder.
/// The amount must be positive and no more than the refundable balance.
pub struct IssueRefund {
    payments: Arc<dyn PaymentGateway>,
    policy: CallPolicy,
    amount_required: bool,
}

impl IssueRefund {
    pub const NAME: &'static str = "issue_refund";

    /// The payload must carry `refundAmount`.
    pub fn required(payments: Arc<dyn PaymentGateway>, policy: CallPolicy) -> Self {
        Self {
            payments,
            policy,
            amount_required: true,
        }
    }

    /// `refundAmount` defaults to the refundable balance.
    pub fn optional(payments: Arc<dyn PaymentGateway>, policy: CallPolicy) -> Self {
        Self {
            payments,
            policy,
            amount_required: false,
        }
    }
}

#[async_trait]
impl ActionHandler<Order> for IssueRefund {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, order: Order, payload: &Payload) -> Result<Order, ActionError> {
        let amount = refund_amount(&order, payload, self.amount_required)?;
        let reason = payload
            .str(keys::RETURN_REASON)
            .map(str::to_string)
            .or_else(|| order.return_reason.clone())
            .unwrap_or_else(|| "refund requested".to_string());
        refund(&self.payments, &self.policy, Self::NAME, order, amount, reason).await
    }
}

/// Amount a refund request asks for, checked against the refundable
/// balance.
fn refund_amount(order: &Order, payload: &Payload, required: bool) -> Result<f64, ActionError> {
    let refundable = order.payment.refundable();
    let amount = match payload.f64(keys::REFUND_AMOUNT) {
        Some(amount) => amount,
        None if required => {
            return Err(ActionError::rejected(IssueRefund::NAME, "refundAmount is required"));
        }
        None => refundable,
    };
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ActionError::rejected(
            IssueRefund::NAME,
            format!("refund amount must be positive, got {amount}"),
        ));
    }
    if round_cents(amount) > refundable {
        return Err(ActionError::rejected(
            IssueRefund::NAME,
            format!("refund of {amount:.2} exceeds refundable {refundable:.2}"),
        ));
    }
    Ok(amount)
}

fn check_refund_amount(order: &mut Order, payload: &Payload) -> Result<(), ActionError> {
    refund_amount(order, payload, false).map(|_| ())
}

/// Sends a templated notification to the customer. Delivery failures are
/// logged and never fail the transition.
pub struct Notify {
    notifications: Arc<dyn NotificationSender>,
    policy: CallPolicy,
    template: String,
}

impl Notify {
    pub fn new(
        notifications: Arc<dyn NotificationSender>,
        policy: CallPolicy,
        template: impl Into<String>,
    ) -> Self {
        Self {
            notifications,
            policy,
            template: template.into(),
        }
    }
}

#[async_trait]
impl ActionHandler<Order> for Notify {
    fn name(&self) -> &str {
        &self.template
    }

    async fn handle(&self, order: Order, _payload: &Payload) -> Result<Order, ActionError> {
        let notification = Notification {
            recipient: order.customer_email.clone(),
            template: self.template.clone(),
            data: Payload::new()
                .with("orderNumber", order.order_number.clone())
                .with("status", order.status.name())
                .with("total", order.total),
        };
        let notifications = &self.notifications;
        let notification = &notification;
        if let Err(error) = self
            .policy
            .run("notifications.send", move || notifications.send(notification))
            .await
        {
            warn!(order = %order.order_number, template = %self.template, %error, "notification not sent");
        }
        Ok(order)
    }
}

fn count_payment_attempt(order: &mut Order, _payload: &Payload) -> Result<(), ActionError> {
    order.payment.attempts += 1;
    order.payment.failure_reason = None;
    let description = format!(
        "Payment attempt {} of {}",
        order.payment.attempts, order.payment.max_attempts
    );
    order.log("payment_initiated", description);
    Ok(())
}

fn record_payment(order: &mut Order, payload: &Payload) -> Result<(), ActionError> {
    let transaction_id = payload
        .str(keys::TRANSACTION_ID)
        .ok_or_else(|| ActionError::rejected("record_payment", "transactionId is required"))?;
    let amount = payload.f64(keys::AMOUNT).unwrap_or(order.payment.amount);

    order.payment.transaction_id = Some(transaction_id.to_string());
    order.payment.captured = round_cents(amount);
    order.payment.processed_at = Some(Utc::now());
    order.log(
        "payment_completed",
        format!("Captured {:.2} ({transaction_id})", order.payment.captured),
    );
    Ok(())
}

fn record_payment_failure(order: &mut Order, payload: &Payload) -> Result<(), ActionError> {
    let reason = payload
        .str(keys::FAILURE_REASON)
        .unwrap_or("payment declined")
        .to_string();
    order.log("payment_failed", format!("Payment failed: {reason}"));
    order.payment.failure_reason = Some(reason);
    Ok(())
}

fn record_processing_complete(order: &mut Order, _payload: &Payload) -> Result<(), ActionError> {
    order.log("processing_complete", "Order packed and ready to ship");
    Ok(())
}

fn record_out_for_delivery(order: &mut Order, _payload: &Payload) -> Result<(), ActionError> {
    order.log("out_for_delivery", "Order is out for delivery");
    Ok(())
}

fn mark_delivered(order: &mut Order, _payload: &Payload) -> Result<(), ActionError> {
    order.shipping.delivered_at = Some(Utc::now());
    order.log("order_delivered", "Order delivered");
    Ok(())
}

fn record_cancellation(order: &mut Order, payload: &Payload) -> Result<(), ActionError> {
    let reason = payload
        .str(keys::CANCELLATION_REASON)
        .unwrap_or("cancelled on request")
        .to_string();
    order.log("order_cancelled", format!("Order cancelled: {reason}"));
    order.cancellation_reason = Some(reason);
    Ok(())
}

fn record_return(order: &mut Order, payload: &Payload) -> Result<(), ActionError> {
    let reason = payload
        .str(keys::RETURN_REASON)
        .unwrap_or("unspecified")
        .to_string();
    order.log("return_initiated", format!("Return started: {reason}"));
    order.return_reason = Some(reason);
    Ok(())
}

/// The order action registry.
///
/// Compensations are registered in forward order (payment, then stock) and
/// run newest first when an order is cancelled.
pub fn order_actions(services: &OrderServices) -> ActionRegistry<Order> {
    use OrderStatus::*;

    let policy = services.policy.clone();
    let release = ReleaseInventory::new(Arc::clone(&services.inventory), policy.clone());
    let notify = |template: &str| {
        Notify::new(
            Arc::clone(&services.notifications),
            policy.clone(),
            template,
        )
    };

    ActionRegistry::new()
        .on_event(
            OrderEvent::InitiatePayment,
            FnAction::new("count_payment_attempt", count_payment_attempt),
        )
        .on_event(
            OrderEvent::RetryPayment,
            FnAction::new("count_payment_attempt", count_payment_attempt),
        )
        .on_event(
            OrderEvent::PaymentSuccess,
            FnAction::new("record_payment", record_payment),
        )
        .on_event(
            OrderEvent::PaymentFailed,
            FnAction::new("record_payment_failure", record_payment_failure),
        )
        .on_event(
            OrderEvent::StartProcessing,
            ReserveInventory::new(Arc::clone(&services.inventory), policy.clone()),
        )
        .on_event(
            OrderEvent::CompleteProcessing,
            FnAction::new("record_processing_complete", record_processing_complete),
        )
        .on_event(
            OrderEvent::Ship,
            AllocateInventory::new(Arc::clone(&services.inventory), policy.clone()),
        )
        .on_event(
            OrderEvent::Ship,
            CreateShipment::new(Arc::clone(&services.shipping), policy.clone()),
        )
        .on_event(
            OrderEvent::OutForDelivery,
            FnAction::new("record_out_for_delivery", record_out_for_delivery),
        )
        .on_event(
            OrderEvent::Deliver,
            FnAction::new("mark_delivered", mark_delivered),
        )
        .on_event(
            OrderEvent::Cancel,
            FnAction::new("record_cancellation", record_cancellation),
        )
        .on_event(
            OrderEvent::ProcessRefund,
            FnAction::new("check_refund_amount", check_refund_amount),
        )
        .on_event(
            OrderEvent::ProcessRefund,
            IssueRefund::optional(Arc::clone(&services.payments), policy.clone()),
        )
        .on_event(OrderEvent::ProcessRefund, release.clone())
        .on_event(
            OrderEvent::InitiateReturn,
            FnAction::new("record_return", record_return),
        )
        .on_event(
            OrderEvent::CompleteReturn,
            IssueRefund::required(Arc::clone(&services.payments), policy.clone()),
        )
        .on_status_change(ReadyToShip, Shipped, notify("order.shipped"))
        .on_status_change(OutForDelivery, Delivered, notify("order.delivered"))
        .on_status_changes(
            [Created, PaymentPending, PaymentFailed, Paid, Processing].map(|from| (from, Cancelled)),
            notify("order.cancelled"),
        )
        .on_status_changes(
            [Paid, Processing, ReadyToShip, Delivered, Returned].map(|from| (from, Refunded)),
            notify("order.refunded"),
        )
        .compensation(RefundPayment::new(
            Arc::clone(&services.payments),
            policy.clone(),
        ))
        .compensation(release)
        .compensate_on(OrderEvent::Cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        CollaboratorError, MemoryInventoryLedger, MemoryNotificationSender, MemoryPaymentGateway,
        MemoryShippingProvider, ShippingMethod,
    };
    use crate::domain::order::OrderItem;
    use std::time::Duration;

    struct Fixture {
        payments: Arc<MemoryPaymentGateway>,
        shipping: Arc<MemoryShippingProvider>,
        inventory: Arc<MemoryInventoryLedger>,
        notifications: Arc<MemoryNotificationSender>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                payments: Arc::new(MemoryPaymentGateway::new()),
                shipping: Arc::new(MemoryShippingProvider::new()),
                inventory: Arc::new(MemoryInventoryLedger::with_stock([("SKU-A", 10), ("SKU-B", 1)])),
                notifications: Arc::new(MemoryNotificationSender::new()),
            }
        }

        fn policy() -> CallPolicy {
            CallPolicy::builder()
                .timeout(Duration::from_millis(200))
                .max_attempts(2)
                .backoff(Duration::from_millis(1))
                .build()
        }

        fn services(&self) -> OrderServices {
            OrderServices {
                payments: self.payments.clone(),
                shipping: self.shipping.clone(),
                inventory: self.inventory.clone(),
                notifications: self.notifications.clone(),
                policy: Self::policy(),
            }
        }
    }

    fn order() -> Order {
        let mut order = Order::new("urn:order:t");
        order.customer_email = "ana@example.com".into();
        order.items = vec![
            OrderItem::new("SKU-A", "Widget", 2, 50.0),
            OrderItem::new("SKU-B", "Gadget", 1, 25.0),
        ];
        order.shipping.method = ShippingMethod::Express;
        order
    }

    #[tokio::test]
    async fn reserve_takes_every_line_once() {
        let fx = Fixture::new();
        let action = ReserveInventory::new(fx.inventory.clone(), Fixture::policy());

        let reserved = action.handle(order(), &Payload::new()).await.unwrap();
        assert_eq!(reserved.reservations.len(), 2);

        let again = action.handle(reserved, &Payload::new()).await.unwrap();
        assert_eq!(again.reservations.len(), 2);
        assert_eq!(fx.inventory.level("SKU-A").await.unwrap().reserved, 2);
    }

    #[tokio::test]
    async fn reserve_failure_releases_partial_reservations() {
        let fx = Fixture::new();
        let action = ReserveInventory::new(fx.inventory.clone(), Fixture::policy());
        let mut greedy = order();
        greedy.items[1].quantity = 5;

        let error = action.handle(greedy, &Payload::new()).await.unwrap_err();
        assert_eq!(error.action(), ReserveInventory::NAME);
        assert!(!error.is_transient());

        let level = fx.inventory.level("SKU-A").await.unwrap();
        assert_eq!(level.available, 10);
        assert_eq!(level.reserved, 0);
    }

    #[tokio::test]
    async fn release_compensation_frees_stock_until_allocated() {
        let fx = Fixture::new();
        let reserve = ReserveInventory::new(fx.inventory.clone(), Fixture::policy());
        let release = ReleaseInventory::new(fx.inventory.clone(), Fixture::policy());

        let held = reserve.handle(order(), &Payload::new()).await.unwrap();
        assert!(Compensation::applies(&release, &held));

        let released = release.compensate(held, &Payload::new()).await.unwrap();
        assert!(released.reservations.is_empty());
        assert_eq!(fx.inventory.level("SKU-B").await.unwrap().available, 1);

        let mut shipped = order();
        shipped.allocated = true;
        assert!(!Compensation::applies(&release, &shipped));
    }

    #[tokio::test]
    async fn release_frees_reservations_the_order_never_recorded() {
        let fx = Fixture::new();
        let release = ReleaseInventory::new(fx.inventory.clone(), Fixture::policy());
        let unrecorded = order();
        fx.inventory.reserve("SKU-A", 2, &unrecorded.urn).await.unwrap();

        let released = release.compensate(unrecorded, &Payload::new()).await.unwrap();
        assert!(released.has_timeline_event("inventory_released"));
        assert_eq!(fx.inventory.level("SKU-A").await.unwrap().available, 10);
        assert!(fx.inventory.open_reservations().await.is_empty());
    }

    #[tokio::test]
    async fn refund_compensation_returns_the_captured_balance() {
        let fx = Fixture::new();
        let compensation = RefundPayment::new(fx.payments.clone(), Fixture::policy());
        let mut paid = order();
        paid.payment.captured = 80.0;
        paid.payment.refunded = 30.0;

        let refunded = compensation
            .compensate(paid, &Payload::new().with(keys::CANCELLATION_REASON, "changed mind"))
            .await
            .unwrap();

        let refunds = fx.payments.refunds().await;
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 50.0);
        assert_eq!(refunds[0].reason, "changed mind");
        assert_eq!(refunded.payment.refundable(), 0.0);
        assert!(!compensation.applies(&refunded));
    }

    #[tokio::test]
    async fn required_refund_amount_is_enforced() {
        let fx = Fixture::new();
        let action = IssueRefund::required(fx.payments.clone(), Fixture::policy());
        let mut paid = order();
        paid.payment.captured = 100.0;

        let missing = action.handle(paid.clone(), &Payload::new()).await.unwrap_err();
        assert!(matches!(missing, ActionError::Rejected { .. }));

        let excessive = action
            .handle(paid.clone(), &Payload::new().with(keys::REFUND_AMOUNT, 150.0))
            .await
            .unwrap_err();
        assert!(matches!(excessive, ActionError::Rejected { .. }));
        assert!(fx.payments.refunds().await.is_empty());

        let partial = action
            .handle(paid, &Payload::new().with(keys::REFUND_AMOUNT, 40.0))
            .await
            .unwrap();
        assert_eq!(partial.payment.refunded, 40.0);
        assert_eq!(partial.payment.refunds, 1);
    }

    #[test]
    fn refund_is_checked_before_stock_is_released() {
        let fx = Fixture::new();
        let registry = order_actions(&fx.services());
        let names: Vec<_> = registry
            .event_handlers(&OrderEvent::ProcessRefund)
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["check_refund_amount", IssueRefund::NAME, ReleaseInventory::NAME]
        );

        let mut paid = order();
        paid.payment.captured = 20.0;
        let too_much = Payload::new().with(keys::REFUND_AMOUNT, 1_000_000.0);
        assert!(check_refund_amount(&mut paid, &too_much).is_err());
        assert!(check_refund_amount(&mut paid, &Payload::new()).is_ok());
    }

    #[tokio::test]
    async fn optional_refund_defaults_to_balance() {
        let fx = Fixture::new();
        let action = IssueRefund::optional(fx.payments.clone(), Fixture::policy());
        let mut paid = order();
        paid.payment.captured = 64.5;

        let refunded = action.handle(paid, &Payload::new()).await.unwrap();
        assert_eq!(refunded.payment.refunded, 64.5);
    }

    #[tokio::test]
    async fn shipment_is_created_once() {
        let fx = Fixture::new();
        let action = CreateShipment::new(fx.shipping.clone(), Fixture::policy());

        let shipped = action.handle(order(), &Payload::new()).await.unwrap();
        let shipment = shipped.shipping.shipment.clone().unwrap();
        assert_eq!(shipment.carrier, "UPS");
        assert!(shipped.has_timeline_event("order_shipped"));

        action.handle(shipped, &Payload::new()).await.unwrap();
        assert_eq!(fx.shipping.shipments().await.len(), 1);
    }

    #[tokio::test]
    async fn transient_shipping_failure_is_retried() {
        let fx = Fixture::new();
        fx.shipping
            .fail_next(CollaboratorError::Unavailable {
                operation: "create_shipment".into(),
                reason: "carrier api down".into(),
            })
            .await;
        let action = CreateShipment::new(fx.shipping.clone(), Fixture::policy());

        let shipped = action.handle(order(), &Payload::new()).await.unwrap();
        assert!(shipped.shipping.shipment.is_some());
    }

    #[tokio::test]
    async fn notify_is_best_effort() {
        let fx = Fixture::new();
        let action = Notify::new(fx.notifications.clone(), Fixture::policy(), "order.shipped");

        let order = action.handle(order(), &Payload::new()).await.unwrap();
        assert_eq!(
            fx.notifications.templates_sent_to(&order.customer_email).await,
            vec!["order.shipped".to_string()]
        );
    }

    #[test]
    fn record_payment_requires_transaction_id() {
        let mut order = order();
        let error = record_payment(&mut order, &Payload::new()).unwrap_err();
        assert!(matches!(error, ActionError::Rejected { .. }));

        let payload = Payload::new()
            .with(keys::TRANSACTION_ID, "TXN-1")
            .with(keys::AMOUNT, 143.56);
        record_payment(&mut order, &payload).unwrap();
        assert_eq!(order.payment.captured, 143.56);
        assert_eq!(order.payment.transaction_id.as_deref(), Some("TXN-1"));
    }

    #[test]
    fn registry_binds_cancel_compensations() {
        let fx = Fixture::new();
        let registry = order_actions(&fx.services());

        assert!(registry.compensates_on(&OrderEvent::Cancel));
        let names: Vec<_> = registry.compensations().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec![RefundPayment::NAME, ReleaseInventory::NAME]);
        assert_eq!(registry.event_handlers(&OrderEvent::Ship).len(), 2);
        assert_eq!(
            registry
                .status_change_handlers(&OrderStatus::Returned, &OrderStatus::Refunded)
                .len(),
            1
        );
    }
}
