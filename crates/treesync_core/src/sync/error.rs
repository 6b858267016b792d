//! Synchronizer error taxonomy.

use crate::model::ids::EntityId;
use crate::model::node::{NodeIndex, NodeKind, NodeRef};
use crate::repo::graph_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a `put`, `sync` or `trim` call.
#[derive(Debug)]
pub enum SyncError {
    /// Attempt to mutate the root or repository sentinel.
    SentinelMutation(EntityId),
    /// A containment class was used as a link between a parent and its child.
    InvalidRelationshipClass {
        class: String,
        source_id: EntityId,
        target_id: EntityId,
    },
    /// An endpoint carries a relationship anchor the ledger does not know.
    MissingBookkeepingEntry { anchor: String, entity: EntityId },
    /// Dependency resolution re-entered a node that is still being resolved.
    ScopeCycle { path: Vec<String> },
    /// A reference names a node of the wrong kind for its slot.
    UnexpectedNodeKind {
        node: NodeRef,
        expected: NodeKind,
        found: NodeKind,
    },
    /// A reference points outside the source graph.
    UnknownNode(NodeIndex),
    /// Store failure.
    Repo(RepoError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SentinelMutation(id) => write!(f, "sentinel entity cannot be mutated: {id}"),
            Self::InvalidRelationshipClass {
                class,
                source_id,
                target_id,
            } => write!(
                f,
                "containment class `{class}` cannot link parent and child ({source_id} -> {target_id})"
            ),
            Self::MissingBookkeepingEntry { anchor, entity } => write!(
                f,
                "relationship anchor `{anchor}` on {entity} has no ledger entry"
            ),
            Self::ScopeCycle { path } => {
                write!(f, "dependency cycle: {}", path.join(" -> "))
            }
            Self::UnexpectedNodeKind {
                node,
                expected,
                found,
            } => write!(f, "expected {expected} reference, {node:?} is a {found}"),
            Self::UnknownNode(index) => write!(f, "node {index} is not in the source graph"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::SentinelMutation(id) => Self::SentinelMutation(id),
            other => Self::Repo(other),
        }
    }
}
