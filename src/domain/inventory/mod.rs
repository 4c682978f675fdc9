//! Warehouse stock records driven by broker events.
//!
//! Items start in `receiving`. Stock movements arrive on six broker topics
//! (see [`inventory_routes`]); the remaining events are raised internally.

mod actions;
mod entity;
mod table;

pub use actions::inventory_actions;
pub use entity::{AuditInfo, InventoryItem, Location, MovementKind, ReorderInfo, StockMovement};
pub use table::inventory_table;

use crate::broker::TopicRoute;
use crate::{workflow_event, workflow_status};

workflow_status! {
    pub enum InventoryStatus {
        Available => "available",
        Reserved => "reserved",
        Allocated => "allocated",
        InTransit => "in_transit",
        Receiving => "receiving",
        Quarantine => "quarantine",
        Damaged => "damaged",
        Expired => "expired",
        Auditing => "auditing",
        ReorderPending => "reorder_pending",
        Reordered => "reordered",
    }
    final: [InTransit, Damaged, Expired, Reordered]
    failed: [Damaged]
}

workflow_event! {
    pub enum InventoryEvent {
        StockReceived => "inventory.stock.received",
        StockAllocated => "inventory.stock.allocated",
        StockReleased => "inventory.stock.released",
        StockAdjusted => "inventory.stock.adjusted",
        AuditRequested => "inventory.audit.requested",
        ReorderTriggered => "inventory.reorder.triggered",
        Reserve => "inventory.reserve",
        Ship => "inventory.ship",
        DamageReported => "inventory.damage.reported",
        Expire => "inventory.expire",
        AuditComplete => "inventory.audit.complete",
        Quarantine => "inventory.quarantine",
        ReleaseFromQuarantine => "inventory.release.quarantine",
    }
}

/// Payload keys understood by the inventory actions and guards.
pub mod keys {
    pub const QUANTITY: &str = "quantity";
    pub const BATCH_NUMBER: &str = "batchNumber";
    pub const EXPIRATION_DATE: &str = "expirationDate";
    pub const UNIT_COST: &str = "unitCost";
    pub const ORDER_ID: &str = "orderId";
    pub const REASON: &str = "reason";
    pub const ADJUSTMENT_QUANTITY: &str = "adjustmentQuantity";
    pub const PERFORMED_BY: &str = "performedBy";
    pub const REQUESTED_BY: &str = "requestedBy";
    pub const NOTES: &str = "notes";
    pub const ACTUAL_QUANTITY: &str = "actualQuantity";
    pub const REORDER_QUANTITY: &str = "reorderQuantity";
    pub const SUPPLIER: &str = "supplier";
}

/// Broker topics that feed inventory events. Each topic carries the event
/// of the same name.
pub fn inventory_routes() -> Vec<TopicRoute<InventoryItem>> {
    [
        InventoryEvent::StockReceived,
        InventoryEvent::StockAllocated,
        InventoryEvent::StockReleased,
        InventoryEvent::StockAdjusted,
        InventoryEvent::AuditRequested,
        InventoryEvent::ReorderTriggered,
    ]
    .into_iter()
    .map(|event| TopicRoute::new(crate::core::Event::name(&event), event))
    .collect()
}
