//! Synchronization engine.
//!
//! # Responsibility
//! - `put`: resolve declarative nodes to persisted ids, inserting bottom-up.
//! - `sync`: `put` plus provenance-driven re-derivation.
//! - `trim`: delete managed entities a session did not touch.
//!
//! # Invariants
//! - All state lives in one `SyncSession`; sessions share nothing.
//! - No transaction is opened here; callers own the commit boundary.

pub mod error;
mod relationship;
pub mod session;
pub mod trim;

pub use error::{SyncError, SyncResult};
pub use session::SyncSession;
pub use trim::Trim;
