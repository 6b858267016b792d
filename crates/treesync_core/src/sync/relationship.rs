//! Relationship synchronization over the provenance ledger.
//!
//! # Responsibility
//! - Resolve link relationships by caller anchor instead of provenance.
//! - Keep ledger tags on the repository sentinel and presence tags on both
//!   endpoints in step with the persisted instance.
//! - Remove ledger state for an element that is about to be deleted.
//!
//! # Invariants
//! - At most one persisted instance exists per anchor.
//! - Every presence tag on an endpoint has a ledger entry.
//! - A relationship is never updated in place; moving it deletes and
//!   reinserts, because `(class, source, target)` is its identity.

use super::error::{SyncError, SyncResult};
use super::session::SyncSession;
use crate::model::ids::{EntityId, REPOSITORY_ID};
use crate::model::node::{NodeKind, RelationshipSpec, SourceGraph};
use crate::model::tag::{RelationshipTag, Tag};
use crate::repo::graph_repo::GraphRepository;
use log::{debug, info};

impl<R: GraphRepository> SyncSession<'_, R> {
    pub(super) fn put_relationship(
        &mut self,
        graph: &SourceGraph,
        relationship: &RelationshipSpec,
    ) -> SyncResult<EntityId> {
        let source_id = self.put_typed(graph, relationship.source, NodeKind::Element)?;
        let target_id = self.put_typed(graph, relationship.target, NodeKind::Element)?;
        let anchor = relationship.anchor.as_str();

        let id = match self.read_ledger(anchor)? {
            None => {
                self.ensure_link_class(&relationship.class, source_id, target_id)?;
                let id = self.repo.insert_relationship(
                    &relationship.class,
                    source_id,
                    target_id,
                    &relationship.props,
                )?;
                self.repo.write_tag(source_id, anchor, &Tag::Presence)?;
                self.repo.write_tag(target_id, anchor, &Tag::Presence)?;
                info!(
                    "event=relationship_sync module=sync status=inserted anchor={} class={} id={}",
                    anchor, relationship.class, id
                );
                self.write_ledger(anchor, id, &relationship.class, source_id, target_id)?;
                id
            }
            Some(stale)
                if stale.class == relationship.class
                    && stale.source_id == source_id
                    && stale.target_id == target_id =>
            {
                debug!(
                    "event=relationship_sync module=sync status=unchanged anchor={} id={}",
                    anchor, stale.id
                );
                stale.id
            }
            Some(stale) => {
                self.ensure_link_class(&relationship.class, source_id, target_id)?;
                self.repo
                    .delete_relationship(&stale.class, stale.source_id, stale.target_id)?;

                for old_endpoint in [stale.source_id, stale.target_id] {
                    if old_endpoint != source_id && old_endpoint != target_id {
                        self.repo.remove_tag(old_endpoint, anchor)?;
                    }
                }
                for new_endpoint in [source_id, target_id] {
                    self.repo.write_tag(new_endpoint, anchor, &Tag::Presence)?;
                }

                let id = self.repo.insert_relationship(
                    &relationship.class,
                    source_id,
                    target_id,
                    &relationship.props,
                )?;
                self.write_ledger(anchor, id, &relationship.class, source_id, target_id)?;
                info!(
                    "event=relationship_sync module=sync status=moved anchor={} class={} stale_id={} id={}",
                    anchor, relationship.class, stale.id, id
                );
                id
            }
        };

        self.touched.insert(id);
        Ok(id)
    }

    /// Drops every relationship tracked through `element_id`, with its
    /// ledger entry and both presence tags.
    pub(super) fn cleanup_relationships(&self, element_id: EntityId) -> SyncResult<usize> {
        let anchors = self.repo.tag_anchors(element_id)?;
        for anchor in &anchors {
            let tag = self
                .read_ledger(anchor)?
                .ok_or_else(|| SyncError::MissingBookkeepingEntry {
                    anchor: anchor.clone(),
                    entity: element_id,
                })?;

            self.repo
                .delete_relationship(&tag.class, tag.source_id, tag.target_id)?;
            self.repo.remove_tag(REPOSITORY_ID, anchor)?;
            self.repo.remove_tag(tag.source_id, anchor)?;
            self.repo.remove_tag(tag.target_id, anchor)?;
            debug!(
                "event=relationship_cleanup module=sync status=ok anchor={} element={} paired={}",
                anchor,
                element_id,
                tag.other_endpoint(element_id)
                    .map_or_else(|| "-".to_string(), |id| id.to_string())
            );
        }
        Ok(anchors.len())
    }

    fn read_ledger(&self, anchor: &str) -> SyncResult<Option<RelationshipTag>> {
        match self.repo.read_tag(REPOSITORY_ID, anchor)? {
            None => Ok(None),
            Some(Tag::Ledger(tag)) => Ok(Some(tag)),
            Some(Tag::Presence) => Err(SyncError::MissingBookkeepingEntry {
                anchor: anchor.to_string(),
                entity: REPOSITORY_ID,
            }),
        }
    }

    fn write_ledger(
        &self,
        anchor: &str,
        id: EntityId,
        class: &str,
        source_id: EntityId,
        target_id: EntityId,
    ) -> SyncResult<()> {
        let tag = Tag::Ledger(RelationshipTag {
            id,
            class: class.to_string(),
            source_id,
            target_id,
        });
        self.repo.write_tag(REPOSITORY_ID, anchor, &tag)?;
        Ok(())
    }

    /// Containment must be expressed through the child's parent link, not
    /// as a link relationship between the same two elements.
    fn ensure_link_class(
        &self,
        class: &str,
        source_id: EntityId,
        target_id: EntityId,
    ) -> SyncResult<()> {
        for (child_id, parent_id) in [(target_id, source_id), (source_id, target_id)] {
            let Some(child) = self.repo.get_element(child_id)? else {
                continue;
            };
            let Some(parent) = child.parent else {
                continue;
            };
            if parent.id == parent_id
                && (parent.class == class || self.config.is_containment_class(class))
            {
                return Err(SyncError::InvalidRelationshipClass {
                    class: class.to_string(),
                    source_id,
                    target_id,
                });
            }
        }
        Ok(())
    }
}
