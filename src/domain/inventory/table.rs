//! Inventory transition table.

use super::keys;
use super::{InventoryEvent, InventoryItem, InventoryStatus};
use crate::core::Payload;
use crate::table::{BuildError, TableBuilder, TransitionBuilder, TransitionTable};

fn requested(payload: &Payload) -> u64 {
    payload.u64(keys::QUANTITY).unwrap_or(1)
}

pub fn inventory_table() -> Result<TransitionTable<InventoryItem>, BuildError> {
    use InventoryStatus::*;

    TableBuilder::<InventoryItem>::new()
        .initial(Receiving)
        // receiving
        .transition(
            TransitionBuilder::new()
                .from(Receiving)
                .on(InventoryEvent::StockReceived)
                .to(Available)
                .when("stock on hand after receipt", |item: &InventoryItem, payload| {
                    u64::from(item.quantity) + payload.u64(keys::QUANTITY).unwrap_or(0) > 0
                }),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Available)
                .on(InventoryEvent::StockReceived)
                .to(Available),
        )?
        // reservation and allocation
        .transition(
            TransitionBuilder::new()
                .from(Available)
                .on(InventoryEvent::Reserve)
                .to(Reserved)
                .when("stock available", |item: &InventoryItem, payload| {
                    item.available > 0 && u64::from(item.available) >= requested(payload)
                }),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Reserved)
                .on(InventoryEvent::StockAllocated)
                .to(Allocated)
                .when("stock reserved", |item: &InventoryItem, payload| {
                    item.reserved > 0 && u64::from(item.reserved) >= requested(payload)
                }),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Allocated)
                .on(InventoryEvent::Ship)
                .to(InTransit),
        )?
        .transition(
            TransitionBuilder::new()
                .from_any([Reserved, Allocated])
                .on(InventoryEvent::StockReleased)
                .to(Available),
        )?
        // adjustment and audit
        .transition(
            TransitionBuilder::new()
                .from_any([Available, Reserved])
                .on(InventoryEvent::StockAdjusted)
                .to(Available),
        )?
        .transition(
            TransitionBuilder::new()
                .from_any([Available, Reserved])
                .on(InventoryEvent::AuditRequested)
                .to(Auditing),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Auditing)
                .on(InventoryEvent::AuditComplete)
                .to(Available),
        )?
        // quarantine
        .transition(
            TransitionBuilder::new()
                .from_any([Available, Receiving])
                .on(InventoryEvent::Quarantine)
                .to(Quarantine)
                .when("reason given", |_: &InventoryItem, payload: &Payload| {
                    payload.contains(keys::REASON)
                }),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Quarantine)
                .on(InventoryEvent::ReleaseFromQuarantine)
                .to(Available),
        )?
        // damage, expiry and reorder
        .transition(
            TransitionBuilder::new()
                .from_any([Quarantine, Available, Reserved, Allocated])
                .on(InventoryEvent::DamageReported)
                .to(Damaged),
        )?
        .transition(
            TransitionBuilder::new()
                .from_any([Available, Reserved])
                .on(InventoryEvent::Expire)
                .to(Expired)
                .when("past expiration date", |item: &InventoryItem, _| item.is_expired()),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Available)
                .on(InventoryEvent::ReorderTriggered)
                .to(ReorderPending)
                .when("low stock", |item: &InventoryItem, _| item.is_low_stock()),
        )?
        .transition(
            TransitionBuilder::new()
                .from(ReorderPending)
                .on(InventoryEvent::StockReceived)
                .to(Reordered),
        )?
        .build()
}
