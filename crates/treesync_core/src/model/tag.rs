//! Relationship provenance tags.
//!
//! A relationship has no provenance of its own. Its identity across runs is a
//! caller-supplied anchor, recorded as a ledger tag on the repository sentinel
//! and as presence tags on both endpoint elements.

use super::ids::EntityId;
use serde::{Deserialize, Serialize};

/// Ledger payload for one relationship anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipTag {
    pub id: EntityId,
    pub class: String,
    pub source_id: EntityId,
    pub target_id: EntityId,
}

impl RelationshipTag {
    /// Returns the endpoint opposite to `endpoint`, if `endpoint` is one.
    pub fn other_endpoint(&self, endpoint: EntityId) -> Option<EntityId> {
        if endpoint == self.source_id {
            Some(self.target_id)
        } else if endpoint == self.target_id {
            Some(self.source_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// Endpoint marker without payload.
    Presence,
    /// Ledger entry on the repository sentinel.
    Ledger(RelationshipTag),
}

impl Tag {
    pub fn to_payload(&self) -> serde_json::Result<Option<String>> {
        match self {
            Self::Presence => Ok(None),
            Self::Ledger(tag) => serde_json::to_string(tag).map(Some),
        }
    }

    pub fn from_payload(payload: Option<&str>) -> serde_json::Result<Self> {
        match payload {
            None => Ok(Self::Presence),
            Some(text) => serde_json::from_str(text).map(Self::Ledger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RelationshipTag, Tag};
    use uuid::Uuid;

    #[test]
    fn ledger_payload_uses_camel_case_keys() {
        let tag = RelationshipTag {
            id: Uuid::new_v4(),
            class: "DrawingGraphicRepresentsElement".to_string(),
            source_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
        };
        let payload = Tag::Ledger(tag.clone())
            .to_payload()
            .unwrap()
            .expect("ledger tags carry a payload");
        assert!(payload.contains("\"sourceId\""));
        assert!(payload.contains("\"targetId\""));
        assert_eq!(Tag::from_payload(Some(&payload)).unwrap(), Tag::Ledger(tag));
    }

    #[test]
    fn presence_tags_have_no_payload() {
        assert_eq!(Tag::Presence.to_payload().unwrap(), None);
        assert_eq!(Tag::from_payload(None).unwrap(), Tag::Presence);
    }

    #[test]
    fn other_endpoint_resolves_both_directions() {
        let source_id = Uuid::new_v4();
        let target_id = Uuid::new_v4();
        let tag = RelationshipTag {
            id: Uuid::new_v4(),
            class: "Refers".to_string(),
            source_id,
            target_id,
        };
        assert_eq!(tag.other_endpoint(source_id), Some(target_id));
        assert_eq!(tag.other_endpoint(target_id), Some(source_id));
        assert_eq!(tag.other_endpoint(Uuid::new_v4()), None);
    }
}
