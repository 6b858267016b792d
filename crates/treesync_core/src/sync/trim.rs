//! Mark-and-sweep trimming of persisted subtrees.
//!
//! # Responsibility
//! - Walk a persisted subtree post-order and delete managed entities the
//!   session did not touch.
//! - Clean relationship ledger state before an element goes away.
//!
//! # Invariants
//! - Touched, unmanaged and still-parenting entities are never deleted.
//! - A group is deleted before the element it models.
//! - Store refusals (entity still referenced) are skipped, not errors.

use super::error::{SyncError, SyncResult};
use super::session::SyncSession;
use crate::model::ids::EntityId;
use crate::model::node::{NodeKind, NodeRef, SourceGraph};
use crate::repo::graph_repo::{ElementDeletion, ElementReference, GraphRepository, RepoError};
use log::{debug, info, warn};
use std::ops::AddAssign;

/// Deletion counts of one trim walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trim {
    pub deleted_elements: usize,
    pub deleted_groups: usize,
    /// Attachments removed with their owners, provenance records included.
    pub deleted_attachments: usize,
}

impl Trim {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for Trim {
    fn add_assign(&mut self, rhs: Self) {
        self.deleted_elements += rhs.deleted_elements;
        self.deleted_groups += rhs.deleted_groups;
        self.deleted_attachments += rhs.deleted_attachments;
    }
}

impl<R: GraphRepository> SyncSession<'_, R> {
    /// Resolves `node` (which touches it) and trims everything below it.
    ///
    /// A group reference trims below the element it models.
    pub fn trim(&mut self, graph: &SourceGraph, node: NodeRef) -> SyncResult<Trim> {
        let kind = match node {
            NodeRef::Root => NodeKind::Element,
            NodeRef::Repository => NodeKind::Group,
            NodeRef::Node(index) => graph
                .get(index)
                .ok_or(SyncError::UnknownNode(index))?
                .kind(),
        };
        if kind == NodeKind::Relationship {
            return Err(SyncError::UnexpectedNodeKind {
                node,
                expected: NodeKind::Element,
                found: kind,
            });
        }

        let id = self.put(graph, node)?;
        let branch = match kind {
            NodeKind::Group => {
                self.repo
                    .get_group(id)?
                    .ok_or(SyncError::Repo(RepoError::NotFound(id)))?
                    .modeled_element_id
            }
            _ => id,
        };
        let trim = self.trim_tree(branch)?;
        info!(
            "event=trim_done module=sync status=ok branch={} deleted_elements={} deleted_groups={} deleted_attachments={}",
            branch, trim.deleted_elements, trim.deleted_groups, trim.deleted_attachments
        );
        Ok(trim)
    }

    /// Post-order walk below `branch`, which is itself a deletion candidate.
    pub fn trim_tree(&self, branch: EntityId) -> SyncResult<Trim> {
        let modeling_group = self.repo.group_modeling(branch)?;

        let mut trim = Trim::default();
        for child in self.branch_children(branch, modeling_group)? {
            trim += self.trim_tree(child)?;
        }

        if !self.repo.is_managed(branch)? || self.touched.contains(&branch) {
            return Ok(trim);
        }

        let mut exempt = Vec::new();
        for child in self.branch_children(branch, modeling_group)? {
            let record = self
                .repo
                .get_element(child)?
                .ok_or(SyncError::Repo(RepoError::NotFound(child)))?;
            if !self.config.is_exempt_child(&record.class) || self.touched.contains(&child) {
                debug!(
                    "event=trim_kept module=sync branch={} reason=has_children child={}",
                    branch, child
                );
                return Ok(trim);
            }
            exempt.push(child);
        }

        let blocking: Vec<ElementReference> = self
            .repo
            .element_references(branch)?
            .into_iter()
            .filter(|reference| match reference {
                ElementReference::Child(child) => !exempt.contains(child),
                ElementReference::ModeledBy(group) => Some(*group) != modeling_group,
                ElementReference::ScopedProvenance(_)
                | ElementReference::SourcedProvenance(_) => true,
            })
            .collect();
        if !blocking.is_empty() {
            info!(
                "event=trim_kept module=sync branch={} reason=referenced references={}",
                branch,
                blocking.len()
            );
            return Ok(trim);
        }

        for child in &exempt {
            if !self.repo.element_references(*child)?.is_empty() {
                info!(
                    "event=trim_kept module=sync branch={} reason=exempt_child_referenced child={}",
                    branch, child
                );
                return Ok(trim);
            }
        }
        // Every exempt child was checked above, so a refusal here means the
        // store changed underneath the walk.
        for child in exempt {
            match self.delete_element_counted(child)? {
                Some(removed) => trim += removed,
                None => return Ok(trim),
            }
        }

        if let Some(group) = modeling_group {
            self.repo.delete_group(group)?;
            trim.deleted_groups += 1;
            info!(
                "event=trim_delete module=sync status=ok entity=group id={} modeled={}",
                group, branch
            );
        }
        if let Some(removed) = self.delete_element_counted(branch)? {
            trim += removed;
        }
        Ok(trim)
    }

    /// Elements parented under `branch`, plus the top-level contents of the
    /// group it models.
    fn branch_children(
        &self,
        branch: EntityId,
        modeling_group: Option<EntityId>,
    ) -> SyncResult<Vec<EntityId>> {
        let mut children = self.repo.children_of(branch)?;
        if let Some(group) = modeling_group {
            for member in self.repo.children_of_group(group)? {
                if !children.contains(&member) {
                    children.push(member);
                }
            }
        }
        Ok(children)
    }

    /// Deletes one element after counting its attachments and dropping its
    /// relationship ledger state. Returns `None` when the store keeps it.
    fn delete_element_counted(&self, id: EntityId) -> SyncResult<Option<Trim>> {
        let deleted_attachments =
            self.repo.attachments_of(id)?.len() + usize::from(self.repo.is_managed(id)?);
        let relationships = self.cleanup_relationships(id)?;

        match self.repo.delete_element(id)? {
            ElementDeletion::Deleted => {
                info!(
                    "event=trim_delete module=sync status=ok entity=element id={} attachments={} relationships={}",
                    id, deleted_attachments, relationships
                );
                Ok(Some(Trim {
                    deleted_elements: 1,
                    deleted_groups: 0,
                    deleted_attachments,
                }))
            }
            ElementDeletion::Kept { references } => {
                warn!(
                    "event=trim_kept module=sync status=refused entity=element id={} references={}",
                    id,
                    references.len()
                );
                Ok(None)
            }
        }
    }
}
