//! The inventory record.

use super::{InventoryEvent, InventoryStatus};
use crate::core::{Entity, StatusChange, StatusHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub warehouse: String,
    pub zone: String,
    pub shelf: String,
    pub bin: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    In,
    Out,
    Adjustment,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub kind: MovementKind,
    /// Signed for adjustments, positive otherwise
    pub quantity: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Counted minus recorded quantity
    pub discrepancy: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReorderInfo {
    pub reorder_point: u32,
    pub reorder_quantity: u32,
    pub supplier: Option<String>,
    pub last_reorder_at: Option<DateTime<Utc>>,
}

/// Stock of one SKU at one location.
///
/// `quantity` is stock on hand. `available + reserved` never exceeds it;
/// allocated stock has already left `quantity`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub urn: String,
    pub sku: String,
    pub product_name: String,
    pub status: InventoryStatus,
    pub quantity: u32,
    pub available: u32,
    pub reserved: u32,
    pub allocated: u32,
    pub unit_cost: f64,
    pub location: Location,
    pub batch_number: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub quarantine_reason: Option<String>,
    pub damage_report: Option<String>,
    pub audit: Option<AuditInfo>,
    pub reorder: Option<ReorderInfo>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub movements: Vec<StockMovement>,
    pub history: StatusHistory<InventoryStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// An empty record awaiting its first delivery.
    pub fn new(urn: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            urn: urn.into(),
            sku: format!("SKU-{}", &Uuid::new_v4().simple().to_string()[..8]),
            product_name: String::new(),
            status: InventoryStatus::Receiving,
            quantity: 0,
            available: 0,
            reserved: 0,
            allocated: 0,
            unit_cost: 0.0,
            location: Location::default(),
            batch_number: None,
            expires_at: None,
            quarantine_reason: None,
            damage_report: None,
            audit: None,
            reorder: None,
            shipped_at: None,
            movements: Vec::new(),
            history: StatusHistory::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn describe(&mut self, sku: impl Into<String>, product_name: impl Into<String>, unit_cost: f64) {
        self.sku = sku.into();
        self.product_name = product_name.into();
        self.unit_cost = unit_cost;
    }

    /// Enable low-stock detection. The reorder quantity defaults to twice
    /// the reorder point.
    pub fn set_reorder_point(&mut self, reorder_point: u32, reorder_quantity: Option<u32>, supplier: Option<String>) {
        self.reorder = Some(ReorderInfo {
            reorder_point,
            reorder_quantity: reorder_quantity.unwrap_or(reorder_point.saturating_mul(2)),
            supplier,
            last_reorder_at: None,
        });
    }

    pub fn total_value(&self) -> f64 {
        f64::from(self.quantity) * self.unit_cost
    }

    pub fn is_low_stock(&self) -> bool {
        self.reorder
            .as_ref()
            .is_some_and(|reorder| self.available <= reorder.reorder_point)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Add received stock.
    pub fn receive(&mut self, quantity: u32) {
        self.quantity = self.quantity.saturating_add(quantity);
        self.available = self.available.saturating_add(quantity);
    }

    /// Move available stock to reserved. Returns false, changing nothing,
    /// if not enough is available.
    pub fn reserve(&mut self, quantity: u32) -> bool {
        if self.available < quantity {
            return false;
        }
        self.available -= quantity;
        self.reserved += quantity;
        true
    }

    /// Commit reserved stock to an order; it leaves stock on hand.
    pub fn allocate(&mut self, quantity: u32) -> bool {
        if self.reserved < quantity {
            return false;
        }
        self.reserved -= quantity;
        self.allocated += quantity;
        self.quantity = self.quantity.saturating_sub(quantity);
        true
    }

    /// Return reserved stock to available.
    pub fn release(&mut self, quantity: u32) {
        let released = quantity.min(self.reserved);
        self.reserved -= released;
        self.available += released;
    }

    /// Apply a signed correction to stock on hand, never going below zero.
    pub fn adjust(&mut self, delta: i64) {
        self.quantity = clamp_add(self.quantity, delta);
        self.available = clamp_add(self.available, delta);
    }

    pub fn add_movement(
        &mut self,
        kind: MovementKind,
        quantity: i64,
        reason: impl Into<String>,
        reference: Option<String>,
    ) {
        let at = Utc::now();
        self.movements.push(StockMovement {
            kind,
            quantity,
            reason: reason.into(),
            reference,
            at,
        });
        self.updated_at = at;
    }
}

fn clamp_add(value: u32, delta: i64) -> u32 {
    (i64::from(value) + delta).clamp(0, i64::from(u32::MAX)) as u32
}

impl Entity for InventoryItem {
    type Status = InventoryStatus;
    type Event = InventoryEvent;

    fn urn(&self) -> &str {
        &self.urn
    }

    fn status(&self) -> InventoryStatus {
        self.status
    }

    fn set_status(&mut self, status: InventoryStatus) {
        self.status = status;
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.sku)
    }

    fn record_change(&mut self, change: StatusChange<InventoryStatus>) {
        self.updated_at = change.at;
        self.history = self.history.record(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stocked(quantity: u32) -> InventoryItem {
        let mut item = InventoryItem::new("urn:inventory:1");
        item.receive(quantity);
        item
    }

    #[test]
    fn reserve_allocate_release_keep_counts_consistent() {
        let mut item = stocked(10);

        assert!(item.reserve(4));
        assert!(!item.reserve(7));
        assert_eq!((item.available, item.reserved), (6, 4));

        assert!(item.allocate(3));
        assert_eq!((item.quantity, item.reserved, item.allocated), (7, 1, 3));

        item.release(5);
        assert_eq!((item.available, item.reserved), (7, 0));
    }

    #[test]
    fn adjust_never_goes_negative() {
        let mut item = stocked(3);
        item.adjust(-10);
        assert_eq!((item.quantity, item.available), (0, 0));
        item.adjust(4);
        assert_eq!(item.quantity, 4);
    }

    #[test]
    fn low_stock_needs_a_reorder_point() {
        let mut item = stocked(5);
        assert!(!item.is_low_stock());

        item.set_reorder_point(5, None, Some("Acme".into()));
        assert!(item.is_low_stock());
        assert_eq!(item.reorder.as_ref().map(|r| r.reorder_quantity), Some(10));
    }

    #[test]
    fn expiry_is_relative_to_now() {
        let mut item = stocked(1);
        let now = Utc::now();
        assert!(!item.is_expired_at(now));

        item.expires_at = Some(now - Duration::days(1));
        assert!(item.is_expired_at(now));
        assert!(!item.is_expired_at(now - Duration::days(2)));
    }
}
