//! Declarative source model and persisted identity types.
//!
//! # Responsibility
//! - Describe the in-memory node graph callers reconcile against the store.
//! - Define identifiers, sentinels, provenance and relationship tags shared
//!   by the repository and the synchronizer.
//!
//! # Invariants
//! - Every element description carries exactly one provenance description.
//! - Sentinel identifiers are fixed and never reassigned.

pub mod ids;
pub mod node;
pub mod provenance;
pub mod tag;
