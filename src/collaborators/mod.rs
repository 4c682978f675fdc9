//! Contracts for the external services business actions depend on.
//!
//! The orchestrator consumes these services but does not implement them.
//! Every call is fallible and may time out; callers bound them with a
//! [`CallPolicy`](crate::enforcement::CallPolicy). The [`memory`] module
//! provides scriptable in-process simulations for tests and demos.

mod error;
pub mod memory;

pub use error::CollaboratorError;
pub use memory::{
    MemoryInventoryLedger, MemoryNotificationSender, MemoryPaymentGateway,
    MemoryShippingProvider, PaymentOutcome, StockLevel,
};

use crate::core::Payload;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request to capture payment for an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_urn: String,
    pub order_number: String,
    pub amount: f64,
    pub currency: String,
    pub method: String,
    /// Repeating a request with the same key returns the first capture
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount: f64,
}

/// A request to return captured funds, fully or partially.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_urn: String,
    pub transaction_id: Option<String>,
    pub amount: f64,
    pub reason: String,
    /// Repeating a request with the same key returns the first refund
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount: f64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, CollaboratorError>;

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, CollaboratorError>;
}

/// Delivery speed chosen at checkout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
    Overnight,
    Pickup,
}

impl ShippingMethod {
    /// Base shipping cost before the order-value surcharge.
    pub fn base_cost(&self) -> f64 {
        match self {
            Self::Overnight => 29.99,
            Self::Express => 14.99,
            Self::Standard => 5.99,
            Self::Pickup => 0.0,
        }
    }

    pub fn delivery_days(&self) -> i64 {
        match self {
            Self::Overnight => 1,
            Self::Express => 2,
            Self::Standard => 5,
            Self::Pickup => 0,
        }
    }

    pub fn carrier(&self) -> &'static str {
        match self {
            Self::Overnight => "FedEx",
            Self::Express => "UPS",
            Self::Standard => "USPS",
            Self::Pickup => "In-Store",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub order_urn: String,
    pub order_number: String,
    pub method: ShippingMethod,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub tracking_number: String,
    pub carrier: String,
    pub estimated_delivery: DateTime<Utc>,
    pub shipped_at: DateTime<Utc>,
}

#[async_trait]
pub trait ShippingProvider: Send + Sync {
    async fn create_shipment(&self, request: &ShipmentRequest)
        -> Result<Shipment, CollaboratorError>;
}

/// Stock held for one order line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub sku: String,
    pub quantity: u32,
    pub order_urn: String,
}

/// Stock bookkeeping shared by all orders.
///
/// Implementations serialize operations per SKU. `release`, `release_order`
/// and `allocate` must tolerate being called again for a reservation they
/// already handled.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn reserve(
        &self,
        sku: &str,
        quantity: u32,
        order_urn: &str,
    ) -> Result<Reservation, CollaboratorError>;

    async fn release(&self, reservation: &Reservation) -> Result<(), CollaboratorError>;

    /// Release every open reservation held for `order_urn`, including ones
    /// the caller never saw because its reserve call was abandoned.
    /// Returns how many were released.
    async fn release_order(&self, order_urn: &str) -> Result<usize, CollaboratorError>;

    async fn allocate(&self, reservation: &Reservation) -> Result<(), CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub template: String,
    pub data: Payload,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}
