//! Repository layer for the persisted graph.
//!
//! # Responsibility
//! - Define the store primitives the synchronizer depends on.
//! - Isolate SQLite query details from synchronization logic.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `SentinelMutation`)
//!   in addition to DB transport errors.

pub mod graph_repo;
