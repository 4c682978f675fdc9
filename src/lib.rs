//! Flowstate: entity-lifecycle workflow orchestration
//!
//! Business entities (orders, inventory items, users) move through a finite
//! set of statuses in response to named events. Flowstate keeps the pure
//! part of that (status enums, guarded transition tables, history) apart
//! from the effectful part (actions calling external services, persistence,
//! broker delivery).
//!
//! # Core Concepts
//!
//! - **Status / Event**: wire-named enums generated with
//!   [`workflow_status!`] and [`workflow_event!`]
//! - **Transition table**: ordered, validated `(from, event, guards) -> to`
//!   rows; the first passing row wins
//! - **Actions**: handlers bound to events or status changes, with
//!   compensations that undo them on cancellation
//! - **Engine**: serializes emits per urn and persists only when every
//!   handler succeeded
//! - **Sagas and brokers**: drive the engine from multi-step orchestration
//!   or at-least-once topic delivery
//!
//! # Example
//!
//! ```rust
//! use flowstate::core::Payload;
//! use flowstate::domain::inventory::{inventory_table, InventoryEvent, InventoryItem, InventoryStatus};
//! use flowstate::engine::WorkflowEngine;
//! use flowstate::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new("inventory", InventoryItem::new));
//! let engine = WorkflowEngine::builder(inventory_table().unwrap(), store).build();
//!
//! let item = engine.create(|item| item.sku = "SKU-1".to_string()).await.unwrap();
//! let emission = engine
//!     .emit(&item.urn, InventoryEvent::StockReceived, Payload::new().with("quantity", 10))
//!     .await
//!     .unwrap();
//! assert_eq!(emission.status(), InventoryStatus::Available);
//! # }
//! ```

pub mod actions;
pub mod broker;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod domain;
pub mod engine;
pub mod enforcement;
pub mod saga;
pub mod store;
pub mod table;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::core::{Entity, Event, Guard, Payload, Status};
pub use actions::{ActionError, ActionHandler, ActionRegistry, Compensation};
pub use broker::{BrokerBridge, BrokerMessage, Disposition, Envelope, MemoryBroker, TopicRoute};
pub use config::FlowstateConfig;
pub use engine::{Emission, WorkflowEngine, WorkflowError};
pub use saga::{OrderSaga, SagaError};
pub use table::{TableBuilder, TransitionBuilder, TransitionTable};
