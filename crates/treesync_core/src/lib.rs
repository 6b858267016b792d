//! Declarative tree synchronization over a persisted element graph.
//!
//! Callers describe the desired state as a `SourceGraph`, then a
//! `SyncSession` resolves it against the store (`put`), re-derives what
//! changed (`sync`) and removes managed entities it did not visit (`trim`).

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sync;

pub use config::{AppConfig, ConfigError, SyncConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::ids::{EntityId, REPOSITORY_ID, ROOT_ID};
pub use model::node::{
    AttachmentSpec, ElementSpec, GroupSpec, NodeIndex, NodeKind, NodeRef, ParentLink, Props,
    ProvenanceSpec, RelationshipSpec, SourceGraph, SourceNode,
};
pub use model::provenance::{detect_change, ChangeStatus, ProvenanceRecord};
pub use repo::graph_repo::{
    ElementDeletion, ElementReference, GraphRepository, RepoError, RepoResult,
    SqliteGraphRepository,
};
pub use sync::{SyncError, SyncResult, SyncSession, Trim};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
