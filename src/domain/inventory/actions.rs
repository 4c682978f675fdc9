//! Inventory bookkeeping actions.
//!
//! All inventory actions are local record keeping; none call out to a
//! collaborator, so they are plain [`FnAction`]s.

use super::keys;
use super::{AuditInfo, InventoryEvent, InventoryItem, InventoryStatus, MovementKind};
use crate::actions::{ActionError, ActionRegistry, FnAction};
use crate::core::Payload;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

fn quantity(action: &str, payload: &Payload) -> Result<u32, ActionError> {
    let quantity = payload
        .u64(keys::QUANTITY)
        .ok_or_else(|| ActionError::rejected(action, "quantity is required"))?;
    u32::try_from(quantity)
        .map_err(|_| ActionError::rejected(action, format!("quantity {quantity} is too large")))
}

fn requested_quantity(action: &str, payload: &Payload) -> Result<u32, ActionError> {
    match payload.u64(keys::QUANTITY) {
        None => Ok(1),
        Some(_) => quantity(action, payload),
    }
}

fn text(payload: &Payload, key: &str) -> Option<String> {
    payload.str(key).map(str::to_string)
}

fn receive_stock(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let received = quantity("receive_stock", payload)?;
    if let Some(raw) = payload.str(keys::EXPIRATION_DATE) {
        let expires = DateTime::parse_from_rfc3339(raw).map_err(|e| {
            ActionError::rejected("receive_stock", format!("invalid expirationDate '{raw}': {e}"))
        })?;
        item.expires_at = Some(expires.with_timezone(&Utc));
    }
    if let Some(batch) = text(payload, keys::BATCH_NUMBER) {
        item.batch_number = Some(batch);
    }
    if let Some(cost) = payload.f64(keys::UNIT_COST) {
        item.unit_cost = cost;
    }

    item.receive(received);
    let reference = item.batch_number.clone();
    item.add_movement(MovementKind::In, i64::from(received), "stock received", reference);
    info!(sku = %item.sku, received, on_hand = item.quantity, "stock received");
    Ok(())
}

fn reserve_stock(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let wanted = requested_quantity("reserve_stock", payload)?;
    if !item.reserve(wanted) {
        return Err(ActionError::rejected(
            "reserve_stock",
            format!("only {} of {} available", item.available, wanted),
        ));
    }
    Ok(())
}

fn allocate_stock(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let wanted = requested_quantity("allocate_stock", payload)?;
    if !item.allocate(wanted) {
        return Err(ActionError::rejected(
            "allocate_stock",
            format!("only {} of {} reserved", item.reserved, wanted),
        ));
    }
    item.add_movement(
        MovementKind::Out,
        i64::from(wanted),
        "allocated to order",
        text(payload, keys::ORDER_ID),
    );
    if item.is_low_stock() {
        warn!(sku = %item.sku, available = item.available, "stock is low");
    }
    Ok(())
}

fn release_stock(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let released = payload
        .u64(keys::QUANTITY)
        .map_or(item.reserved, |q| u32::try_from(q).unwrap_or(u32::MAX));
    item.release(released);
    Ok(())
}

fn adjust_stock(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let delta = payload
        .i64(keys::ADJUSTMENT_QUANTITY)
        .ok_or_else(|| ActionError::rejected("adjust_stock", "adjustmentQuantity is required"))?;
    let reason = payload.str(keys::REASON).unwrap_or("manual adjustment");

    item.adjust(delta);
    item.add_movement(
        MovementKind::Adjustment,
        delta,
        reason,
        text(payload, keys::PERFORMED_BY),
    );
    info!(sku = %item.sku, delta, reason, "stock adjusted");
    Ok(())
}

fn request_audit(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    item.audit = Some(AuditInfo {
        requested_by: payload
            .str(keys::REQUESTED_BY)
            .unwrap_or("system")
            .to_string(),
        requested_at: Utc::now(),
        completed_at: None,
        discrepancy: None,
        notes: text(payload, keys::NOTES),
    });
    Ok(())
}

/// Reconcile the counted quantity with the record. A discrepancy becomes an
/// adjustment movement.
fn complete_audit(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let counted = payload.i64(keys::ACTUAL_QUANTITY);
    let discrepancy = counted.map(|counted| counted - i64::from(item.quantity));

    if let Some(delta) = discrepancy.filter(|d| *d != 0) {
        item.adjust(delta);
        item.add_movement(MovementKind::Adjustment, delta, "audit discrepancy", None);
        warn!(sku = %item.sku, discrepancy = delta, "audit found a discrepancy");
    }

    let audit = item.audit.get_or_insert_with(|| AuditInfo {
        requested_by: "system".to_string(),
        requested_at: Utc::now(),
        completed_at: None,
        discrepancy: None,
        notes: None,
    });
    audit.completed_at = Some(Utc::now());
    audit.discrepancy = discrepancy;
    if let Some(notes) = text(payload, keys::NOTES) {
        audit.notes = Some(notes);
    }
    Ok(())
}

fn quarantine(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    item.quarantine_reason = text(payload, keys::REASON);
    Ok(())
}

fn release_quarantine(item: &mut InventoryItem, _payload: &Payload) -> Result<(), ActionError> {
    item.quarantine_reason = None;
    Ok(())
}

fn report_damage(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let report = payload.str(keys::REASON).unwrap_or("damage reported");
    item.damage_report = Some(report.to_string());
    warn!(sku = %item.sku, report, "stock written off as damaged");
    Ok(())
}

fn trigger_reorder(item: &mut InventoryItem, payload: &Payload) -> Result<(), ActionError> {
    let Some(reorder) = item.reorder.as_mut() else {
        return Err(ActionError::rejected("trigger_reorder", "no reorder point set"));
    };
    if let Some(quantity) = payload.u64(keys::REORDER_QUANTITY) {
        reorder.reorder_quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
    }
    if let Some(supplier) = text(payload, keys::SUPPLIER) {
        reorder.supplier = Some(supplier);
    }
    reorder.last_reorder_at = Some(Utc::now());
    info!(
        sku = %item.sku,
        quantity = reorder.reorder_quantity,
        supplier = reorder.supplier.as_deref().unwrap_or("unknown"),
        "reorder placed"
    );
    Ok(())
}

fn mark_shipped(item: &mut InventoryItem, _payload: &Payload) -> Result<(), ActionError> {
    item.shipped_at = Some(Utc::now());
    Ok(())
}

/// The inventory action registry.
pub fn inventory_actions() -> ActionRegistry<InventoryItem> {
    use InventoryStatus::*;

    ActionRegistry::new()
        .on_event(
            InventoryEvent::StockReceived,
            FnAction::new("receive_stock", receive_stock),
        )
        .on_event(
            InventoryEvent::Reserve,
            FnAction::new("reserve_stock", reserve_stock),
        )
        .on_event(
            InventoryEvent::StockAllocated,
            FnAction::new("allocate_stock", allocate_stock),
        )
        .on_event(
            InventoryEvent::StockReleased,
            FnAction::new("release_stock", release_stock),
        )
        .on_event(
            InventoryEvent::StockAdjusted,
            FnAction::new("adjust_stock", adjust_stock),
        )
        .on_event(
            InventoryEvent::AuditRequested,
            FnAction::new("request_audit", request_audit),
        )
        .on_event(
            InventoryEvent::AuditComplete,
            FnAction::new("complete_audit", complete_audit),
        )
        .on_event(
            InventoryEvent::Quarantine,
            FnAction::new("quarantine", quarantine),
        )
        .on_status_change(
            Quarantine,
            Available,
            FnAction::new("release_quarantine", release_quarantine),
        )
        .on_event(
            InventoryEvent::DamageReported,
            FnAction::new("report_damage", report_damage),
        )
        .on_event(
            InventoryEvent::ReorderTriggered,
            FnAction::new("trigger_reorder", trigger_reorder),
        )
        .on_status_change(Allocated, InTransit, FnAction::new("mark_shipped", mark_shipped))
}
