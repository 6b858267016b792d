//! Synchronizer session: identity resolution (`put`) and change detection
//! (`sync`).
//!
//! # Responsibility
//! - Resolve declarative nodes to persisted ids, inserting what is missing.
//! - Re-derive elements and groups whose provenance indicates a change.
//! - Record every id resolved in this session for later trimming.
//!
//! # Invariants
//! - `put` never updates an existing entity.
//! - The touched set only grows during a session.
//! - Re-entering a node that is mid-resolution is a `ScopeCycle`, never a
//!   silent recursion.

use super::error::{SyncError, SyncResult};
use crate::config::SyncConfig;
use crate::model::ids::{EntityId, REPOSITORY_ID, ROOT_ID};
use crate::model::node::{
    ElementSpec, GroupSpec, NodeIndex, NodeKind, NodeRef, SourceGraph, SourceNode,
};
use crate::model::provenance::{detect_change, ChangeStatus, ProvenanceRecord};
use crate::repo::graph_repo::{GraphRepository, NewElement, NewGroup, ParentRecord, RepoError};
use log::{debug, info};
use std::collections::HashSet;

/// One synchronizer run against a store.
///
/// A fresh session has an empty touched set, so trimming in a session that
/// never called `put`/`sync` treats every managed entity as stale. The
/// session never opens transactions; wrap it in one on the caller side.
pub struct SyncSession<'r, R: GraphRepository> {
    pub(super) repo: &'r R,
    pub(super) config: SyncConfig,
    pub(super) touched: HashSet<EntityId>,
    changed: HashSet<EntityId>,
    resolving: Vec<NodeIndex>,
}

impl<'r, R: GraphRepository> SyncSession<'r, R> {
    pub fn new(repo: &'r R, config: SyncConfig) -> Self {
        Self {
            repo,
            config,
            touched: HashSet::new(),
            changed: HashSet::new(),
            resolving: Vec::new(),
        }
    }

    pub fn repo(&self) -> &'r R {
        self.repo
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Ids resolved by this session so far, directly or as dependencies.
    pub fn touched(&self) -> &HashSet<EntityId> {
        &self.touched
    }

    pub fn is_touched(&self, id: EntityId) -> bool {
        self.touched.contains(&id)
    }

    /// Ids of elements and groups re-derived by `sync` in this session.
    pub fn changed(&self) -> &HashSet<EntityId> {
        &self.changed
    }

    /// Resolves `node` and its dependencies to a persisted id.
    ///
    /// Existing entities are found by provenance (elements), by modeled
    /// element (groups) or by ledger anchor (relationships) and returned
    /// untouched. Missing ones are inserted bottom-up.
    pub fn put(&mut self, graph: &SourceGraph, node: NodeRef) -> SyncResult<EntityId> {
        match node {
            NodeRef::Root => {
                self.touched.insert(ROOT_ID);
                Ok(ROOT_ID)
            }
            NodeRef::Repository => {
                self.touched.insert(REPOSITORY_ID);
                Ok(REPOSITORY_ID)
            }
            NodeRef::Node(index) => {
                let source = lookup(graph, index)?;
                self.enter(graph, index)?;
                let result = match source {
                    SourceNode::Element(element) => self.put_element(graph, element),
                    SourceNode::Group(group) => self.put_group(graph, group),
                    SourceNode::Relationship(relationship) => {
                        self.put_relationship(graph, relationship)
                    }
                };
                self.resolving.pop();
                result
            }
        }
    }

    /// Ensures `node` exists and re-derives it when its description changed.
    pub fn sync(&mut self, graph: &SourceGraph, node: NodeRef) -> SyncResult<()> {
        let NodeRef::Node(index) = node else {
            self.put(graph, node)?;
            return Ok(());
        };

        match lookup(graph, index)? {
            SourceNode::Element(element) => {
                self.sync_element(graph, node, element)?;
            }
            SourceNode::Group(group) => self.sync_group(graph, node, group)?,
            SourceNode::Relationship(_) => {
                self.put(graph, node)?;
            }
        }
        Ok(())
    }

    /// Syncs every node of the graph in insertion order.
    pub fn sync_all(&mut self, graph: &SourceGraph) -> SyncResult<()> {
        for (node, _) in graph.iter() {
            self.sync(graph, node)?;
        }
        Ok(())
    }

    fn enter(&mut self, graph: &SourceGraph, index: NodeIndex) -> SyncResult<()> {
        if let Some(start) = self.resolving.iter().position(|current| *current == index) {
            let path = self.resolving[start..]
                .iter()
                .chain(std::iter::once(&index))
                .map(|current| {
                    graph
                        .get(*current)
                        .map_or_else(|| current.to_string(), SourceNode::label)
                })
                .collect();
            self.resolving.clear();
            return Err(SyncError::ScopeCycle { path });
        }
        self.resolving.push(index);
        Ok(())
    }

    fn put_element(&mut self, graph: &SourceGraph, element: &ElementSpec) -> SyncResult<EntityId> {
        let provenance = &element.provenance;
        let scope_id = self.put_typed(graph, provenance.scope, NodeKind::Element)?;

        if let Some(id) =
            self.repo
                .find_by_provenance(scope_id, &provenance.kind, &provenance.anchor)?
        {
            // Dependencies count as resolved even when nothing is written.
            self.derive_element(graph, element)?;
            self.put_source(graph, element)?;
            self.touched.insert(id);
            debug!(
                "event=session_put module=sync status=found kind={} anchor={} id={}",
                provenance.kind, provenance.anchor, id
            );
            return Ok(id);
        }

        let new_element = self.derive_element(graph, element)?;
        let source_id = self.put_source(graph, element)?;

        let id = self.repo.insert_element(&new_element)?;
        self.repo.insert_provenance(&ProvenanceRecord {
            element_id: id,
            scope_id,
            source_id,
            anchor: provenance.anchor.clone(),
            kind: provenance.kind.clone(),
            version: provenance.version.clone(),
            checksum: provenance.checksum.clone(),
        })?;
        for attachment in &element.attachments {
            self.repo.insert_attachment(id, attachment)?;
        }

        self.touched.insert(id);
        info!(
            "event=session_put module=sync status=inserted class={} kind={} anchor={} id={} attachments={}",
            element.class,
            provenance.kind,
            provenance.anchor,
            id,
            element.attachments.len()
        );
        Ok(id)
    }

    fn put_group(&mut self, graph: &SourceGraph, group: &GroupSpec) -> SyncResult<EntityId> {
        let modeled_id = self.put_typed(graph, group.modeled, NodeKind::Element)?;

        if let Some(id) = self.repo.group_modeling(modeled_id)? {
            self.put_typed(graph, group.parent, NodeKind::Group)?;
            self.touched.insert(id);
            debug!(
                "event=session_put module=sync status=found class={} id={} modeled={}",
                group.class, id, modeled_id
            );
            return Ok(id);
        }

        let new_group = self.derive_group(graph, group, modeled_id)?;
        let id = self.repo.insert_group(&new_group)?;
        self.touched.insert(id);
        info!(
            "event=session_put module=sync status=inserted class={} id={} modeled={}",
            group.class, id, modeled_id
        );
        Ok(id)
    }

    fn sync_element(
        &mut self,
        graph: &SourceGraph,
        node: NodeRef,
        element: &ElementSpec,
    ) -> SyncResult<EntityId> {
        let id = self.put(graph, node)?;
        let stored = self
            .repo
            .get_provenance(id)?
            .ok_or(SyncError::Repo(RepoError::NotFound(id)))?;

        if detect_change(&stored, &element.provenance) == ChangeStatus::Unchanged {
            debug!(
                "event=session_sync module=sync status=unchanged anchor={} id={}",
                element.provenance.anchor, id
            );
            return Ok(id);
        }

        let new_element = self.derive_element(graph, element)?;
        let source_id = self.put_source(graph, element)?;
        let provenance = &element.provenance;

        self.repo.update_element(id, &new_element)?;
        self.repo.update_provenance(&ProvenanceRecord {
            element_id: id,
            scope_id: stored.scope_id,
            source_id,
            anchor: provenance.anchor.clone(),
            kind: provenance.kind.clone(),
            version: provenance.version.clone(),
            checksum: provenance.checksum.clone(),
        })?;
        for attachment in self.repo.attachments_of(id)? {
            self.repo.delete_attachment(attachment.id)?;
        }
        for attachment in &element.attachments {
            self.repo.insert_attachment(id, attachment)?;
        }

        self.changed.insert(id);
        info!(
            "event=session_sync module=sync status=updated anchor={} id={} from_version={} to_version={}",
            provenance.anchor,
            id,
            stored.version.as_deref().unwrap_or("-"),
            provenance.version.as_deref().unwrap_or("-")
        );
        Ok(id)
    }

    /// A group has no provenance of its own. It is re-derived when its
    /// modeled element changed anywhere in this session, so the group and
    /// the element may be synced in either order.
    fn sync_group(
        &mut self,
        graph: &SourceGraph,
        node: NodeRef,
        group: &GroupSpec,
    ) -> SyncResult<()> {
        let id = self.put(graph, node)?;
        self.sync(graph, group.modeled)?;
        let modeled_id = self.put(graph, group.modeled)?;

        if !self.changed.contains(&modeled_id) || self.changed.contains(&id) {
            return Ok(());
        }

        let new_group = self.derive_group(graph, group, modeled_id)?;
        self.repo.update_group(id, &new_group)?;
        self.changed.insert(id);
        info!(
            "event=session_sync module=sync status=updated class={} id={} modeled={}",
            group.class, id, modeled_id
        );
        Ok(())
    }

    fn derive_element(
        &mut self,
        graph: &SourceGraph,
        element: &ElementSpec,
    ) -> SyncResult<NewElement> {
        let group_id = self.put_typed(graph, element.group, NodeKind::Group)?;
        let parent = match &element.parent {
            Some(link) => Some(ParentRecord {
                id: self.put_typed(graph, link.target, NodeKind::Element)?,
                class: link.class.clone(),
            }),
            None => None,
        };

        Ok(NewElement {
            class: element.class.clone(),
            group_id,
            parent,
            props: element.props.clone(),
        })
    }

    fn derive_group(
        &mut self,
        graph: &SourceGraph,
        group: &GroupSpec,
        modeled_id: EntityId,
    ) -> SyncResult<NewGroup> {
        let parent_group_id = self.put_typed(graph, group.parent, NodeKind::Group)?;
        Ok(NewGroup {
            class: group.class.clone(),
            modeled_element_id: modeled_id,
            parent_group_id: Some(parent_group_id),
            props: group.props.clone(),
        })
    }

    fn put_source(
        &mut self,
        graph: &SourceGraph,
        element: &ElementSpec,
    ) -> SyncResult<Option<EntityId>> {
        element
            .provenance
            .source
            .map(|source| self.put_typed(graph, source, NodeKind::Element))
            .transpose()
    }

    /// Resolves a reference that must name a node of `expected` kind.
    pub(super) fn put_typed(
        &mut self,
        graph: &SourceGraph,
        node: NodeRef,
        expected: NodeKind,
    ) -> SyncResult<EntityId> {
        let found = match node {
            NodeRef::Root => NodeKind::Element,
            NodeRef::Repository => NodeKind::Group,
            NodeRef::Node(index) => lookup(graph, index)?.kind(),
        };
        if found != expected {
            return Err(SyncError::UnexpectedNodeKind {
                node,
                expected,
                found,
            });
        }
        self.put(graph, node)
    }
}

fn lookup(graph: &SourceGraph, index: NodeIndex) -> SyncResult<&SourceNode> {
    graph.get(index).ok_or(SyncError::UnknownNode(index))
}
