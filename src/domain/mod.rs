//! Workflows built on the engine.
//!
//! Each submodule owns one entity: its statuses and events, the transition
//! table, and the action registry that binds business side effects to it.
//! Tables and registries are plain values assembled at startup.

pub mod inventory;
pub mod order;
pub mod user;
