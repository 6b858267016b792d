//! Declarative node graph.
//!
//! # Responsibility
//! - Hold element, group and relationship descriptions in one arena.
//! - Express references between nodes, and to the sentinels, as `NodeRef`.
//!
//! # Invariants
//! - A `NodeRef::Node` is only meaningful for the graph that produced it.
//! - References may form cycles; the synchronizer rejects them at resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Free-form entity fields, persisted as a JSON object.
pub type Props = Map<String, Value>;

/// Position of a node inside its `SourceGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a node or to one of the store sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    /// The root element sentinel.
    Root,
    /// The repository group sentinel.
    Repository,
    /// A node described in the graph.
    Node(NodeIndex),
}

/// Discriminant of a described node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Element,
    Group,
    Relationship,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Element => "element",
            Self::Group => "group",
            Self::Relationship => "relationship",
        };
        f.write_str(label)
    }
}

/// Provenance description carried by every element.
///
/// `(scope, kind, anchor)` is the external identity of the element.
/// `version` and `checksum` drive change detection on `sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSpec {
    pub scope: NodeRef,
    pub source: Option<NodeRef>,
    pub anchor: String,
    pub kind: String,
    pub version: Option<String>,
    pub checksum: Option<String>,
}

impl ProvenanceSpec {
    pub fn new(scope: NodeRef, kind: impl Into<String>, anchor: impl Into<String>) -> Self {
        Self {
            scope,
            source: None,
            anchor: anchor.into(),
            kind: kind.into(),
            version: None,
            checksum: None,
        }
    }

    pub fn with_source(mut self, source: NodeRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// Containment link from a child element to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub target: NodeRef,
    /// Containment relationship class, e.g. `ElementOwnsChildElements`.
    pub class: String,
}

/// Side record owned by one element. Rewritten wholesale when the owner changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub class: String,
    #[serde(default)]
    pub props: Props,
}

impl AttachmentSpec {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            props: Props::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub class: String,
    /// Containing group; `NodeRef::Repository` for top-level elements.
    pub group: NodeRef,
    pub parent: Option<ParentLink>,
    pub provenance: ProvenanceSpec,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub attachments: Vec<AttachmentSpec>,
}

impl ElementSpec {
    pub fn new(class: impl Into<String>, group: NodeRef, provenance: ProvenanceSpec) -> Self {
        Self {
            class: class.into(),
            group,
            parent: None,
            provenance,
            props: Props::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_parent(mut self, target: NodeRef, class: impl Into<String>) -> Self {
        self.parent = Some(ParentLink {
            target,
            class: class.into(),
        });
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentSpec) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A group models exactly one element. It has no provenance of its own and
/// is found in the store through its modeled element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub class: String,
    pub modeled: NodeRef,
    /// Parent group; `NodeRef::Repository` for top-level groups.
    pub parent: NodeRef,
    #[serde(default)]
    pub props: Props,
}

impl GroupSpec {
    pub fn new(class: impl Into<String>, modeled: NodeRef) -> Self {
        Self {
            class: class.into(),
            modeled,
            parent: NodeRef::Repository,
            props: Props::new(),
        }
    }

    pub fn with_parent(mut self, parent: NodeRef) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

/// Link between two elements, identified across runs by `anchor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub class: String,
    pub source: NodeRef,
    pub target: NodeRef,
    pub anchor: String,
    #[serde(default)]
    pub props: Props,
}

impl RelationshipSpec {
    pub fn new(
        class: impl Into<String>,
        source: NodeRef,
        target: NodeRef,
        anchor: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            source,
            target,
            anchor: anchor.into(),
            props: Props::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SourceNode {
    Element(ElementSpec),
    Group(GroupSpec),
    Relationship(RelationshipSpec),
}

impl SourceNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Element(_) => NodeKind::Element,
            Self::Group(_) => NodeKind::Group,
            Self::Relationship(_) => NodeKind::Relationship,
        }
    }

    /// Short human-readable label used in logs and cycle reports.
    pub fn label(&self) -> String {
        match self {
            Self::Element(element) => format!(
                "element {}:{}",
                element.provenance.kind, element.provenance.anchor
            ),
            Self::Group(group) => format!("group {}", group.class),
            Self::Relationship(relationship) => {
                format!("relationship {}", relationship.anchor)
            }
        }
    }
}

/// Arena of declarative nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceGraph {
    nodes: Vec<SourceNode>,
}

impl SourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: SourceNode) -> NodeRef {
        self.nodes.push(node);
        NodeRef::Node(NodeIndex(self.nodes.len() - 1))
    }

    pub fn add_element(&mut self, element: ElementSpec) -> NodeRef {
        self.add(SourceNode::Element(element))
    }

    pub fn add_group(&mut self, group: GroupSpec) -> NodeRef {
        self.add(SourceNode::Group(group))
    }

    pub fn add_relationship(&mut self, relationship: RelationshipSpec) -> NodeRef {
        self.add(SourceNode::Relationship(relationship))
    }

    pub fn get(&self, index: NodeIndex) -> Option<&SourceNode> {
        self.nodes.get(index.0)
    }

    /// Mutable access to an element description, e.g. to bump its version
    /// between runs or to close a reference loop.
    pub fn element_mut(&mut self, node: NodeRef) -> Option<&mut ElementSpec> {
        match node {
            NodeRef::Node(index) => match self.nodes.get_mut(index.0) {
                Some(SourceNode::Element(element)) => Some(element),
                _ => None,
            },
            NodeRef::Root | NodeRef::Repository => None,
        }
    }

    pub fn group_mut(&mut self, node: NodeRef) -> Option<&mut GroupSpec> {
        match node {
            NodeRef::Node(index) => match self.nodes.get_mut(index.0) {
                Some(SourceNode::Group(group)) => Some(group),
                _ => None,
            },
            NodeRef::Root | NodeRef::Repository => None,
        }
    }

    pub fn relationship_mut(&mut self, node: NodeRef) -> Option<&mut RelationshipSpec> {
        match node {
            NodeRef::Node(index) => match self.nodes.get_mut(index.0) {
                Some(SourceNode::Relationship(relationship)) => Some(relationship),
                _ => None,
            },
            NodeRef::Root | NodeRef::Repository => None,
        }
    }

    /// Iterates nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &SourceNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeRef::Node(NodeIndex(index)), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ElementSpec, GroupSpec, NodeKind, NodeRef, ProvenanceSpec, SourceGraph};

    #[test]
    fn add_returns_sequential_refs_and_kinds() {
        let mut graph = SourceGraph::new();
        let partition = graph.add_element(ElementSpec::new(
            "Partition",
            NodeRef::Repository,
            ProvenanceSpec::new(NodeRef::Root, "partition", "p"),
        ));
        let group = graph.add_group(GroupSpec::new("PhysicalGroup", partition));

        let kinds: Vec<NodeKind> = graph.iter().map(|(_, node)| node.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Element, NodeKind::Group]);
        assert_ne!(partition, group);
        assert!(graph.element_mut(group).is_none());
        assert!(graph.group_mut(group).is_some());
    }

    #[test]
    fn sentinels_have_no_mutable_description() {
        let mut graph = SourceGraph::new();
        assert!(graph.element_mut(NodeRef::Root).is_none());
        assert!(graph.group_mut(NodeRef::Repository).is_none());
    }
}
