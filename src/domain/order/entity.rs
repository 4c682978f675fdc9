//! The order aggregate and checkout pricing.

use super::OrderStatus;
use crate::collaborators::{Reservation, Shipment, ShippingMethod};
use crate::config::PaymentConfig;
use crate::core::{Entity, StatusChange, StatusHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use uuid::Uuid;

/// Sales tax applied to the order subtotal.
pub const TAX_RATE: f64 = 0.1;

/// Round a currency amount to whole cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl OrderItem {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    pub fn subtotal(&self) -> f64 {
        round_cents(self.unit_price * f64::from(self.quantity))
    }
}

/// Checkout totals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: f64,
    pub tax: f64,
    pub shipping: f64,
    pub total: f64,
}

impl Pricing {
    /// Price a basket.
    ///
    /// Shipping is the method's base cost plus 10% of it for every 1000 of
    /// subtotal, rounded to cents.
    ///
    /// ```
    /// use flowstate::collaborators::ShippingMethod;
    /// use flowstate::domain::order::{OrderItem, Pricing};
    ///
    /// let items = vec![
    ///     OrderItem::new("SKU-A", "Widget", 2, 50.0),
    ///     OrderItem::new("SKU-B", "Gadget", 1, 25.0),
    /// ];
    /// let pricing = Pricing::quote(&items, ShippingMethod::Standard);
    /// assert_eq!(pricing.subtotal, 125.0);
    /// assert_eq!(pricing.tax, 12.5);
    /// assert_eq!(pricing.shipping, 6.06);
    /// assert_eq!(pricing.total, 143.56);
    /// ```
    pub fn quote(items: &[OrderItem], method: ShippingMethod) -> Self {
        let subtotal = round_cents(items.iter().map(OrderItem::subtotal).sum());
        let tax = round_cents(subtotal * TAX_RATE);
        let shipping = round_cents(method.base_cost() * (1.0 + subtotal / 1000.0 * 0.1));
        Self {
            subtotal,
            tax,
            shipping,
            total: round_cents(subtotal + tax + shipping),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: String,
    pub amount: f64,
    pub currency: String,
    /// Capture attempts started so far
    pub attempts: u32,
    pub max_attempts: u32,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Amount captured by the gateway
    pub captured: f64,
    /// Amount returned to the customer so far
    pub refunded: f64,
    /// Refunds issued so far
    #[serde(default)]
    pub refunds: u32,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentInfo {
    /// Captured funds not yet refunded.
    pub fn refundable(&self) -> f64 {
        round_cents(self.captured - self.refunded).max(0.0)
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

impl Default for PaymentInfo {
    fn default() -> Self {
        let config = PaymentConfig::default();
        Self {
            method: "credit_card".to_string(),
            amount: 0.0,
            currency: config.currency,
            attempts: 0,
            max_attempts: config.max_payment_attempts,
            transaction_id: None,
            failure_reason: None,
            captured: 0.0,
            refunded: 0.0,
            refunds: 0,
            processed_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub method: ShippingMethod,
    pub address: String,
    pub shipment: Option<Shipment>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Default for ShippingInfo {
    fn default() -> Self {
        Self {
            method: ShippingMethod::Standard,
            address: String::new(),
            shipment: None,
            delivered_at: None,
        }
    }
}

/// Human readable audit trail entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub event: String,
    pub description: String,
}

/// A customer order moving through payment, fulfilment and returns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub urn: String,
    /// Customer facing number, used as the secondary key
    pub order_number: String,
    pub customer_id: String,
    pub customer_email: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub shipping_cost: f64,
    pub total: f64,
    pub payment: PaymentInfo,
    pub shipping: ShippingInfo,
    /// Stock currently held for this order
    pub reservations: Vec<Reservation>,
    /// Whether the held stock has been committed to the shipment
    pub allocated: bool,
    pub cancellation_reason: Option<String>,
    pub return_reason: Option<String>,
    pub notes: Option<String>,
    pub timeline: Vec<TimelineEntry>,
    pub history: StatusHistory<OrderStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// An empty order in `created` status.
    pub fn new(urn: impl Into<String>) -> Self {
        let now = Utc::now();
        let number = Uuid::new_v4().simple().to_string()[..10].to_uppercase();
        Self {
            urn: urn.into(),
            order_number: format!("ORD-{number}"),
            customer_id: String::new(),
            customer_email: String::new(),
            status: OrderStatus::Created,
            items: Vec::new(),
            subtotal: 0.0,
            tax: 0.0,
            shipping_cost: 0.0,
            total: 0.0,
            payment: PaymentInfo::default(),
            shipping: ShippingInfo::default(),
            reservations: Vec::new(),
            allocated: false,
            cancellation_reason: None,
            return_reason: None,
            notes: None,
            timeline: Vec::new(),
            history: StatusHistory::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fill the order from a checkout draft and price it.
    pub fn apply_draft(&mut self, draft: &OrderDraft, payments: &PaymentConfig) {
        let pricing = Pricing::quote(&draft.items, draft.shipping_method);
        self.customer_id = draft.customer_id.clone();
        self.customer_email = draft.customer_email.clone();
        self.items = draft.items.clone();
        self.notes = draft.notes.clone();
        self.subtotal = pricing.subtotal;
        self.tax = pricing.tax;
        self.shipping_cost = pricing.shipping;
        self.total = pricing.total;
        self.payment = PaymentInfo {
            method: draft.payment_method.clone(),
            amount: pricing.total,
            currency: payments.currency.clone(),
            max_attempts: payments.max_payment_attempts,
            ..PaymentInfo::default()
        };
        self.shipping = ShippingInfo {
            method: draft.shipping_method,
            address: draft.address.clone(),
            ..ShippingInfo::default()
        };
        self.log("order_created", format!("Order created, total {:.2}", self.total));
    }

    /// Append a timeline entry.
    pub fn log(&mut self, event: impl Into<String>, description: impl Into<String>) {
        let at = Utc::now();
        self.timeline.push(TimelineEntry {
            at,
            event: event.into(),
            description: description.into(),
        });
        self.updated_at = at;
    }

    pub fn has_timeline_event(&self, event: &str) -> bool {
        self.timeline.iter().any(|entry| entry.event == event)
    }
}

impl Entity for Order {
    type Status = OrderStatus;
    type Event = super::OrderEvent;

    fn urn(&self) -> &str {
        &self.urn
    }

    fn status(&self) -> OrderStatus {
        self.status
    }

    fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.order_number)
    }

    fn record_change(&mut self, change: StatusChange<OrderStatus>) {
        self.updated_at = change.at;
        self.history = self.history.record(change);
    }
}

/// Checkout input for a new order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub shipping_method: ShippingMethod,
    pub address: String,
    pub payment_method: String,
    pub notes: Option<String>,
}

impl OrderDraft {
    pub fn new(customer_id: impl Into<String>, customer_email: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            customer_email: customer_email.into(),
            items: Vec::new(),
            shipping_method: ShippingMethod::Standard,
            address: String::new(),
            payment_method: "credit_card".to_string(),
            notes: None,
        }
    }

    pub fn item(mut self, sku: impl Into<String>, name: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        self.items.push(OrderItem::new(sku, name, quantity, unit_price));
        self
    }

    pub fn shipping(mut self, method: ShippingMethod, address: impl Into<String>) -> Self {
        self.shipping_method = method;
        self.address = address.into();
        self
    }

    pub fn payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = method.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the draft, accumulating every problem.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<String>> {
        let mut checks: Vec<Validation<(), NonEmptyVec<String>>> = Vec::new();

        if self.customer_id.trim().is_empty() {
            checks.push(Validation::fail("customer id is empty".to_string()));
        }
        if !self.customer_email.contains('@') {
            checks.push(Validation::fail(format!(
                "customer email '{}' is not an address",
                self.customer_email
            )));
        }
        if self.items.is_empty() {
            checks.push(Validation::fail("order has no items".to_string()));
        }
        for item in &self.items {
            if item.quantity == 0 {
                checks.push(Validation::fail(format!("item {} has zero quantity", item.sku)));
            }
            if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                checks.push(Validation::fail(format!("item {} has an invalid price", item.sku)));
            }
        }
        if self.shipping_method != ShippingMethod::Pickup && self.address.trim().is_empty() {
            checks.push(Validation::fail("shipping address is empty".to_string()));
        }

        if checks.is_empty() {
            checks.push(Validation::success(()));
        }
        Validation::all_vec(checks).map(|_| ())
    }
}
