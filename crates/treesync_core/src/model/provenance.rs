//! Persisted provenance records and change detection.
//!
//! # Invariants
//! - `(scope_id, kind, anchor)` is unique in the store.
//! - A differing `version` wins over `checksum` when both sides define one.

use super::ids::EntityId;
use super::node::ProvenanceSpec;
use serde::{Deserialize, Serialize};

/// Provenance as stored for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub element_id: EntityId,
    pub scope_id: EntityId,
    pub source_id: Option<EntityId>,
    pub anchor: String,
    pub kind: String,
    pub version: Option<String>,
    pub checksum: Option<String>,
}

/// Outcome of comparing an incoming description with the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Changed,
    Unchanged,
}

/// Compares incoming provenance against the stored record.
///
/// A version mismatch decides `Changed` on its own. Otherwise the checksums
/// decide, with a missing checksum on one side counting as a difference.
pub fn detect_change(stored: &ProvenanceRecord, incoming: &ProvenanceSpec) -> ChangeStatus {
    if let (Some(stored_version), Some(incoming_version)) = (&stored.version, &incoming.version) {
        if stored_version != incoming_version {
            return ChangeStatus::Changed;
        }
    }

    if stored.checksum != incoming.checksum {
        ChangeStatus::Changed
    } else {
        ChangeStatus::Unchanged
    }
}
