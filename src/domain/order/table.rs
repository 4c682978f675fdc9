//! Order transition table.

use super::keys;
use super::{Order, OrderEvent, OrderStatus};
use crate::core::Payload;
use crate::table::{BuildError, TableBuilder, TransitionBuilder, TransitionTable};

/// Whether another capture attempt is allowed.
///
/// Counters in the payload take precedence over the order's own, so a
/// caller can replay a retry decision made elsewhere.
fn retry_allowed(order: &Order, payload: &Payload) -> bool {
    let attempts = payload
        .u64(keys::PAYMENT_ATTEMPTS)
        .unwrap_or_else(|| u64::from(order.payment.attempts));
    let max_attempts = payload
        .u64(keys::MAX_PAYMENT_ATTEMPTS)
        .unwrap_or_else(|| u64::from(order.payment.max_attempts));
    attempts < max_attempts
}

pub fn order_table() -> Result<TransitionTable<Order>, BuildError> {
    TableBuilder::<Order>::new()
        .initial(OrderStatus::Created)
        // payment
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::Created)
                .on(OrderEvent::InitiatePayment)
                .to(OrderStatus::PaymentPending),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::PaymentPending)
                .on(OrderEvent::PaymentSuccess)
                .to(OrderStatus::Paid),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::PaymentPending)
                .on(OrderEvent::PaymentFailed)
                .to(OrderStatus::PaymentFailed),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::PaymentFailed)
                .on(OrderEvent::RetryPayment)
                .to(OrderStatus::PaymentPending)
                .when("payment attempts remain", retry_allowed),
        )?
        // fulfilment
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::Paid)
                .on(OrderEvent::StartProcessing)
                .to(OrderStatus::Processing),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::Processing)
                .on(OrderEvent::CompleteProcessing)
                .to(OrderStatus::ReadyToShip),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::ReadyToShip)
                .on(OrderEvent::Ship)
                .to(OrderStatus::Shipped),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::Shipped)
                .on(OrderEvent::OutForDelivery)
                .to(OrderStatus::OutForDelivery),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::OutForDelivery)
                .on(OrderEvent::Deliver)
                .to(OrderStatus::Delivered),
        )?
        // cancellation, refunds and returns
        .transition(
            TransitionBuilder::new()
                .from_any([
                    OrderStatus::Created,
                    OrderStatus::PaymentPending,
                    OrderStatus::PaymentFailed,
                    OrderStatus::Paid,
                    OrderStatus::Processing,
                ])
                .on(OrderEvent::Cancel)
                .to(OrderStatus::Cancelled),
        )?
        .transition(
            TransitionBuilder::new()
                .from_any([
                    OrderStatus::Paid,
                    OrderStatus::Processing,
                    OrderStatus::ReadyToShip,
                    OrderStatus::Delivered,
                ])
                .on(OrderEvent::ProcessRefund)
                .to(OrderStatus::Refunded),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::Delivered)
                .on(OrderEvent::InitiateReturn)
                .to(OrderStatus::Returned),
        )?
        .transition(
            TransitionBuilder::new()
                .from(OrderStatus::Returned)
                .on(OrderEvent::CompleteReturn)
                .to(OrderStatus::Refunded),
        )?
        .build()
}
