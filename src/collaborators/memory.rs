//! In-process collaborator simulations.
//!
//! Each simulation records what it was asked to do so tests can assert on
//! side effects (refund issued exactly once, stock restored, and so on).

use super::{
    CollaboratorError, InventoryLedger, Notification, NotificationSender, PaymentGateway,
    PaymentReceipt, PaymentRequest, RefundReceipt, RefundRequest, Reservation, Shipment,
    ShipmentRequest, ShippingProvider,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_uppercase()
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// Scripted result for the next payment capture.
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentOutcome {
    Approve,
    Decline(String),
    Unavailable(String),
}

#[derive(Default)]
struct PaymentState {
    script: VecDeque<PaymentOutcome>,
    payments: Vec<PaymentRequest>,
    refunds: Vec<RefundRequest>,
    captures: HashMap<String, PaymentReceipt>,
    refund_receipts: HashMap<String, RefundReceipt>,
    latency: Option<Duration>,
}

/// Payment gateway that approves unless told otherwise.
///
/// Outcomes queued with [`with_outcomes`](Self::with_outcomes) or
/// [`push_outcome`](Self::push_outcome) are consumed one per capture
/// attempt; once the queue is empty every capture is approved.
///
/// Requests are applied before the configured latency elapses, so a caller
/// that times out still leaves its capture or refund behind. Repeats of an
/// approved idempotency key return the first receipt.
#[derive(Default)]
pub struct MemoryPaymentGateway {
    state: Mutex<PaymentState>,
}

impl MemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = PaymentOutcome>) -> Self {
        Self {
            state: Mutex::new(PaymentState {
                script: outcomes.into_iter().collect(),
                ..PaymentState::default()
            }),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.state.get_mut().latency = Some(latency);
        self
    }

    /// Change how long later calls take to answer.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    pub async fn push_outcome(&self, outcome: PaymentOutcome) {
        self.state.lock().await.script.push_back(outcome);
    }

    /// Every capture attempt received, including declined ones.
    pub async fn payments(&self) -> Vec<PaymentRequest> {
        self.state.lock().await.payments.clone()
    }

    pub async fn refunds(&self) -> Vec<RefundRequest> {
        self.state.lock().await.refunds.clone()
    }

    pub async fn refunds_for(&self, order_urn: &str) -> Vec<RefundRequest> {
        self.state
            .lock()
            .await
            .refunds
            .iter()
            .filter(|r| r.order_urn == order_urn)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PaymentGateway for MemoryPaymentGateway {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, CollaboratorError> {
        let (result, latency) = {
            let mut state = self.state.lock().await;
            if let Some(receipt) = state.captures.get(&request.idempotency_key) {
                debug!(key = %request.idempotency_key, "duplicate capture request");
                return Ok(receipt.clone());
            }
            state.payments.push(request.clone());
            let outcome = state.script.pop_front().unwrap_or(PaymentOutcome::Approve);
            debug!(order = %request.order_number, amount = request.amount, ?outcome, "payment capture");

            let result = match outcome {
                PaymentOutcome::Approve => {
                    let receipt = PaymentReceipt {
                        transaction_id: format!("TXN-{}", short_id()),
                        amount: request.amount,
                    };
                    state
                        .captures
                        .insert(request.idempotency_key.clone(), receipt.clone());
                    Ok(receipt)
                }
                PaymentOutcome::Decline(reason) => Err(CollaboratorError::Declined {
                    operation: "process_payment".into(),
                    reason,
                }),
                PaymentOutcome::Unavailable(reason) => Err(CollaboratorError::Unavailable {
                    operation: "process_payment".into(),
                    reason,
                }),
            };
            (result, state.latency)
        };
        simulate_latency(latency).await;
        result
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, CollaboratorError> {
        if request.amount <= 0.0 {
            return Err(CollaboratorError::Declined {
                operation: "refund".into(),
                reason: format!("refund amount must be positive, got {}", request.amount),
            });
        }
        let (receipt, latency) = {
            let mut state = self.state.lock().await;
            if let Some(receipt) = state.refund_receipts.get(&request.idempotency_key) {
                debug!(key = %request.idempotency_key, "duplicate refund request");
                return Ok(receipt.clone());
            }
            state.refunds.push(request.clone());
            let receipt = RefundReceipt {
                refund_id: format!("REF-{}", short_id()),
                amount: request.amount,
            };
            state
                .refund_receipts
                .insert(request.idempotency_key.clone(), receipt.clone());
            debug!(order = %request.order_urn, amount = request.amount, "refund issued");
            (receipt, state.latency)
        };
        simulate_latency(latency).await;
        Ok(receipt)
    }
}

/// Quantities held for one SKU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub available: u32,
    pub reserved: u32,
    pub allocated: u32,
}

#[derive(Default)]
struct LedgerState {
    stock: HashMap<String, StockLevel>,
    open: HashMap<String, Reservation>,
    allocated: HashSet<String>,
}

/// Per-SKU stock ledger.
///
/// All operations take one lock, which serializes them per SKU (and across
/// SKUs). Releasing or allocating an already handled reservation is a no-op.
#[derive(Default)]
pub struct MemoryInventoryLedger {
    state: Mutex<LedgerState>,
    latency: Option<Duration>,
}

impl MemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock<I, S>(stock: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let stock = stock
            .into_iter()
            .map(|(sku, available)| {
                (
                    sku.into(),
                    StockLevel {
                        available,
                        ..StockLevel::default()
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(LedgerState {
                stock,
                ..LedgerState::default()
            }),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn restock(&self, sku: &str, quantity: u32) {
        let mut state = self.state.lock().await;
        let level = state.stock.entry(sku.to_string()).or_default();
        level.available = level.available.saturating_add(quantity);
    }

    pub async fn level(&self, sku: &str) -> Option<StockLevel> {
        self.state.lock().await.stock.get(sku).copied()
    }

    /// Reservations neither released nor allocated yet.
    pub async fn open_reservations(&self) -> Vec<Reservation> {
        self.state.lock().await.open.values().cloned().collect()
    }
}

#[async_trait]
impl InventoryLedger for MemoryInventoryLedger {
    async fn reserve(
        &self,
        sku: &str,
        quantity: u32,
        order_urn: &str,
    ) -> Result<Reservation, CollaboratorError> {
        simulate_latency(self.latency).await;
        let mut state = self.state.lock().await;
        let level = state
            .stock
            .get_mut(sku)
            .ok_or_else(|| CollaboratorError::Declined {
                operation: "reserve".into(),
                reason: format!("unknown sku {sku}"),
            })?;

        if level.available < quantity {
            return Err(CollaboratorError::Declined {
                operation: "reserve".into(),
                reason: format!(
                    "insufficient stock for {sku}: requested {quantity}, available {}",
                    level.available
                ),
            });
        }

        level.available -= quantity;
        level.reserved += quantity;

        let reservation = Reservation {
            reservation_id: format!("RSV-{}", short_id()),
            sku: sku.to_string(),
            quantity,
            order_urn: order_urn.to_string(),
        };
        state
            .open
            .insert(reservation.reservation_id.clone(), reservation.clone());
        debug!(sku, quantity, order = order_urn, "stock reserved");
        Ok(reservation)
    }

    async fn release(&self, reservation: &Reservation) -> Result<(), CollaboratorError> {
        simulate_latency(self.latency).await;
        let mut state = self.state.lock().await;
        if state.open.remove(&reservation.reservation_id).is_none() {
            debug!(reservation = %reservation.reservation_id, "release of settled reservation ignored");
            return Ok(());
        }
        let level = state.stock.entry(reservation.sku.clone()).or_default();
        level.reserved = level.reserved.saturating_sub(reservation.quantity);
        level.available = level.available.saturating_add(reservation.quantity);
        debug!(sku = %reservation.sku, quantity = reservation.quantity, "stock released");
        Ok(())
    }

    async fn release_order(&self, order_urn: &str) -> Result<usize, CollaboratorError> {
        simulate_latency(self.latency).await;
        let mut state = self.state.lock().await;
        let held: Vec<String> = state
            .open
            .values()
            .filter(|r| r.order_urn == order_urn)
            .map(|r| r.reservation_id.clone())
            .collect();
        for id in &held {
            if let Some(reservation) = state.open.remove(id) {
                let level = state.stock.entry(reservation.sku.clone()).or_default();
                level.reserved = level.reserved.saturating_sub(reservation.quantity);
                level.available = level.available.saturating_add(reservation.quantity);
            }
        }
        debug!(order = order_urn, released = held.len(), "order stock released");
        Ok(held.len())
    }

    async fn allocate(&self, reservation: &Reservation) -> Result<(), CollaboratorError> {
        simulate_latency(self.latency).await;
        let mut state = self.state.lock().await;
        if state.allocated.contains(&reservation.reservation_id) {
            return Ok(());
        }
        if state.open.remove(&reservation.reservation_id).is_none() {
            return Err(CollaboratorError::Declined {
                operation: "allocate".into(),
                reason: format!("unknown reservation {}", reservation.reservation_id),
            });
        }
        state.allocated.insert(reservation.reservation_id.clone());
        let level = state.stock.entry(reservation.sku.clone()).or_default();
        level.reserved = level.reserved.saturating_sub(reservation.quantity);
        level.allocated = level.allocated.saturating_add(reservation.quantity);
        Ok(())
    }
}

/// Shipping provider that books every shipment with the method's carrier.
#[derive(Default)]
pub struct MemoryShippingProvider {
    shipments: Mutex<Vec<(ShipmentRequest, Shipment)>>,
    failures: Mutex<VecDeque<CollaboratorError>>,
}

impl MemoryShippingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_shipment` call fail with `error`.
    pub async fn fail_next(&self, error: CollaboratorError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn shipments(&self) -> Vec<(ShipmentRequest, Shipment)> {
        self.shipments.lock().await.clone()
    }
}

#[async_trait]
impl ShippingProvider for MemoryShippingProvider {
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Shipment, CollaboratorError> {
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let carrier = request.method.carrier();
        let prefix: String = carrier
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(3)
            .collect::<String>()
            .to_uppercase();
        let now = Utc::now();
        let shipment = Shipment {
            tracking_number: format!("{prefix}-{}", short_id()),
            carrier: carrier.to_string(),
            estimated_delivery: now + ChronoDuration::days(request.method.delivery_days()),
            shipped_at: now,
        };
        self.shipments
            .lock()
            .await
            .push((request.clone(), shipment.clone()));
        Ok(shipment)
    }
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct MemoryNotificationSender {
    sent: Mutex<Vec<Notification>>,
    failures: Mutex<VecDeque<CollaboratorError>>,
}

impl MemoryNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `send` call fail with `error`.
    pub async fn fail_next(&self, error: CollaboratorError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn templates_sent_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.recipient == recipient)
            .map(|n| n.template.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSender for MemoryNotificationSender {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        debug!(recipient = %notification.recipient, template = %notification.template, "notification recorded");
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
