//! Order fulfilment.
//!
//! ```text
//! created -> payment_pending -> paid -> processing -> ready_to_ship
//!                 |    ^                                   |
//!                 v    |                                   v
//!            payment_failed                             shipped -> out_for_delivery -> delivered
//!
//! cancel:   created | payment_pending | payment_failed | paid | processing -> cancelled
//! refund:   paid | processing | ready_to_ship | delivered -> refunded
//! return:   delivered -> returned -> refunded
//! ```
//!
//! Cancellation runs the registered compensations (release reserved stock,
//! refund captured payment) before the cancel commits.

mod actions;
mod entity;
mod table;

pub use actions::{
    order_actions, AllocateInventory, CreateShipment, IssueRefund, Notify, OrderServices,
    RefundPayment, ReleaseInventory, ReserveInventory,
};
pub use entity::{
    round_cents, Order, OrderDraft, OrderItem, PaymentInfo, Pricing, ShippingInfo, TimelineEntry,
    TAX_RATE,
};
pub use table::order_table;

use crate::{workflow_event, workflow_status};

workflow_status! {
    pub enum OrderStatus {
        Created => "created",
        PaymentPending => "payment_pending",
        PaymentFailed => "payment_failed",
        Paid => "paid",
        Processing => "processing",
        ReadyToShip => "ready_to_ship",
        Shipped => "shipped",
        OutForDelivery => "out_for_delivery",
        Delivered => "delivered",
        Cancelled => "cancelled",
        Refunded => "refunded",
        Returned => "returned",
    }
    final: [Cancelled, Refunded]
    failed: [Cancelled]
}

workflow_event! {
    pub enum OrderEvent {
        InitiatePayment => "order.initiate.payment",
        PaymentSuccess => "order.payment.success",
        PaymentFailed => "order.payment.failed",
        RetryPayment => "order.retry.payment",
        StartProcessing => "order.start.processing",
        CompleteProcessing => "order.complete.processing",
        /// Accepted on the wire; no transition uses it.
        PrepareShipment => "order.prepare.shipment",
        Ship => "order.ship",
        OutForDelivery => "order.out.for.delivery",
        Deliver => "order.deliver",
        Cancel => "order.cancel",
        /// Accepted on the wire; no transition uses it.
        RequestRefund => "order.request.refund",
        ProcessRefund => "order.process.refund",
        InitiateReturn => "order.initiate.return",
        CompleteReturn => "order.complete.return",
    }
}

/// Payload keys understood by the order actions and guards.
pub mod keys {
    pub const TRANSACTION_ID: &str = "transactionId";
    pub const AMOUNT: &str = "amount";
    pub const FAILURE_REASON: &str = "failureReason";
    pub const PAYMENT_ATTEMPTS: &str = "paymentAttempts";
    pub const MAX_PAYMENT_ATTEMPTS: &str = "maxPaymentAttempts";
    pub const CANCELLATION_REASON: &str = "cancellationReason";
    pub const RETURN_REASON: &str = "returnReason";
    pub const REFUND_AMOUNT: &str = "refundAmount";
    pub const NOTE: &str = "note";
}
