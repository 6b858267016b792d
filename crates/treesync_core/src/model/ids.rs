//! Persisted identifiers and the two well-known sentinels.

use uuid::Uuid;

/// Identifier of any persisted entity (element, group, attachment, relationship).
pub type EntityId = Uuid;

/// Universal containment root element. Terminates every scope chain.
pub const ROOT_ID: EntityId = Uuid::from_u128(1);

/// Repository pseudo-group. Models the root element and owns the
/// relationship provenance ledger.
pub const REPOSITORY_ID: EntityId = Uuid::from_u128(2);

/// Returns whether `id` names one of the seeded sentinels.
pub fn is_sentinel(id: EntityId) -> bool {
    id == ROOT_ID || id == REPOSITORY_ID
}
