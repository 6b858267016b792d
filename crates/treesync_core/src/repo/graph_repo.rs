//! Graph store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the identifier-addressed primitives the synchronizer needs:
//!   element/group/provenance/attachment/relationship CRUD, range queries by
//!   parent and containing group, and the relationship tag ledger.
//! - Keep SQL details and ordering behavior inside the repository boundary.
//!
//! # Invariants
//! - Sentinel rows are never updated or deleted through this API.
//! - Child listing is deterministic (insertion order).
//! - Element deletion is refused, not failed, while other rows reference it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::ids::{is_sentinel, EntityId, REPOSITORY_ID, ROOT_ID};
use crate::model::node::{AttachmentSpec, Props};
use crate::model::provenance::ProvenanceRecord;
use crate::model::tag::Tag;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const REQUIRED_TABLES: &[&str] = &[
    "elements",
    "element_groups",
    "provenance",
    "attachments",
    "relationships",
    "relationship_tags",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from graph store operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target entity does not exist.
    NotFound(EntityId),
    /// Attempt to update or delete a sentinel row.
    SentinelMutation(EntityId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "graph entity not found: {id}"),
            Self::SentinelMutation(id) => write!(f, "sentinel entity cannot be mutated: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "graph repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "graph repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid graph data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Containment link as persisted on the child element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRecord {
    pub id: EntityId,
    pub class: String,
}

/// Insert/update payload for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct NewElement {
    pub class: String,
    pub group_id: EntityId,
    pub parent: Option<ParentRecord>,
    pub props: Props,
}

/// Element read model.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub id: EntityId,
    pub class: String,
    pub group_id: EntityId,
    pub parent: Option<ParentRecord>,
    pub props: Props,
}

/// Insert/update payload for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub class: String,
    pub modeled_element_id: EntityId,
    pub parent_group_id: Option<EntityId>,
    pub props: Props,
}

/// Group read model.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub id: EntityId,
    pub class: String,
    pub modeled_element_id: EntityId,
    pub parent_group_id: Option<EntityId>,
    pub props: Props,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub id: EntityId,
    pub element_id: EntityId,
    pub class: String,
    pub props: Props,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    pub id: EntityId,
    pub class: String,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub props: Props,
}

/// A row that prevents an element from being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementReference {
    /// Another element is parented under it.
    Child(EntityId),
    /// Another element's provenance is scoped to it.
    ScopedProvenance(EntityId),
    /// Another element's provenance names it as source.
    SourcedProvenance(EntityId),
    /// A group models it.
    ModeledBy(EntityId),
}

/// Outcome of an element delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementDeletion {
    Deleted,
    /// The store kept the element because it is still referenced.
    Kept { references: Vec<ElementReference> },
}

/// Repository interface for the persisted graph.
pub trait GraphRepository {
    /// Looks up an element by its external identity.
    fn find_by_provenance(
        &self,
        scope_id: EntityId,
        kind: &str,
        anchor: &str,
    ) -> RepoResult<Option<EntityId>>;

    fn insert_element(&self, element: &NewElement) -> RepoResult<EntityId>;
    fn update_element(&self, id: EntityId, element: &NewElement) -> RepoResult<()>;
    /// Deletes one element unless it is still referenced.
    ///
    /// Attachments, provenance and relationships of the element go with it.
    fn delete_element(&self, id: EntityId) -> RepoResult<ElementDeletion>;
    fn get_element(&self, id: EntityId) -> RepoResult<Option<ElementRecord>>;
    /// Lists rows that keep an element alive.
    fn element_references(&self, id: EntityId) -> RepoResult<Vec<ElementReference>>;

    fn insert_group(&self, group: &NewGroup) -> RepoResult<EntityId>;
    fn update_group(&self, id: EntityId, group: &NewGroup) -> RepoResult<()>;
    fn delete_group(&self, id: EntityId) -> RepoResult<()>;
    fn get_group(&self, id: EntityId) -> RepoResult<Option<GroupRecord>>;
    /// Returns the group modeling `element_id`, if any.
    fn group_modeling(&self, element_id: EntityId) -> RepoResult<Option<EntityId>>;

    fn insert_provenance(&self, record: &ProvenanceRecord) -> RepoResult<()>;
    fn update_provenance(&self, record: &ProvenanceRecord) -> RepoResult<()>;
    fn get_provenance(&self, element_id: EntityId) -> RepoResult<Option<ProvenanceRecord>>;
    /// Returns whether the element carries provenance.
    fn is_managed(&self, id: EntityId) -> RepoResult<bool>;

    fn insert_attachment(
        &self,
        owner_id: EntityId,
        attachment: &AttachmentSpec,
    ) -> RepoResult<EntityId>;
    fn delete_attachment(&self, id: EntityId) -> RepoResult<()>;
    fn attachments_of(&self, element_id: EntityId) -> RepoResult<Vec<AttachmentRecord>>;

    fn insert_relationship(
        &self,
        class: &str,
        source_id: EntityId,
        target_id: EntityId,
        props: &Props,
    ) -> RepoResult<EntityId>;
    /// Deletes the instance identified by its triple. Returns whether a row existed.
    fn delete_relationship(
        &self,
        class: &str,
        source_id: EntityId,
        target_id: EntityId,
    ) -> RepoResult<bool>;
    /// Lists relationships with `element_id` at either end.
    fn relationships_of(&self, element_id: EntityId) -> RepoResult<Vec<RelationshipRecord>>;

    /// Elements parented under `element_id`.
    fn children_of(&self, element_id: EntityId) -> RepoResult<Vec<EntityId>>;
    /// Top-level contents of a group: members whose parent is absent or
    /// lives in another group, excluding the group's own modeled element.
    fn children_of_group(&self, group_id: EntityId) -> RepoResult<Vec<EntityId>>;

    fn read_tag(&self, entity_id: EntityId, anchor: &str) -> RepoResult<Option<Tag>>;
    /// Anchors of every tag stored on `entity_id`.
    fn tag_anchors(&self, entity_id: EntityId) -> RepoResult<Vec<String>>;
    fn write_tag(&self, entity_id: EntityId, anchor: &str, tag: &Tag) -> RepoResult<()>;
    fn remove_tag(&self, entity_id: EntityId, anchor: &str) -> RepoResult<()>;
}

/// SQLite-backed graph repository.
///
/// Borrows the connection; a `rusqlite::Transaction` works as well, which is
/// how callers scope a whole synchronizer session to one commit.
pub struct SqliteGraphRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_graph_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl GraphRepository for SqliteGraphRepository<'_> {
    fn find_by_provenance(
        &self,
        scope_id: EntityId,
        kind: &str,
        anchor: &str,
    ) -> RepoResult<Option<EntityId>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT element_id
                 FROM provenance
                 WHERE scope_id = ?1
                   AND kind = ?2
                   AND anchor = ?3;",
                params![scope_id.to_string(), kind, anchor],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|text| parse_uuid(&text, "provenance.element_id"))
            .transpose()
    }

    fn insert_element(&self, element: &NewElement) -> RepoResult<EntityId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO elements (
                id,
                class,
                group_id,
                parent_id,
                parent_class,
                props
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                element.class.as_str(),
                element.group_id.to_string(),
                element.parent.as_ref().map(|parent| parent.id.to_string()),
                element.parent.as_ref().map(|parent| parent.class.as_str()),
                props_to_text(&element.props)?,
            ],
        )?;
        Ok(id)
    }

    fn update_element(&self, id: EntityId, element: &NewElement) -> RepoResult<()> {
        ensure_not_sentinel(id)?;
        let changed = self.conn.execute(
            "UPDATE elements
             SET class = ?2,
                 group_id = ?3,
                 parent_id = ?4,
                 parent_class = ?5,
                 props = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id.to_string(),
                element.class.as_str(),
                element.group_id.to_string(),
                element.parent.as_ref().map(|parent| parent.id.to_string()),
                element.parent.as_ref().map(|parent| parent.class.as_str()),
                props_to_text(&element.props)?,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_element(&self, id: EntityId) -> RepoResult<ElementDeletion> {
        ensure_not_sentinel(id)?;
        let references = self.element_references(id)?;
        if !references.is_empty() {
            return Ok(ElementDeletion::Kept { references });
        }

        let changed = self
            .conn
            .execute("DELETE FROM elements WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(ElementDeletion::Deleted)
    }

    fn get_element(&self, id: EntityId) -> RepoResult<Option<ElementRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class, group_id, parent_id, parent_class, props
             FROM elements
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_element_row(row)?));
        }
        Ok(None)
    }

    fn element_references(&self, id: EntityId) -> RepoResult<Vec<ElementReference>> {
        let key = id.to_string();
        let mut references = Vec::new();

        for child in query_ids(
            self.conn,
            "SELECT id FROM elements WHERE parent_id = ?1 ORDER BY rowid ASC;",
            &key,
            "elements.id",
        )? {
            references.push(ElementReference::Child(child));
        }
        for scoped in query_ids(
            self.conn,
            "SELECT element_id FROM provenance
             WHERE scope_id = ?1 AND element_id != ?1
             ORDER BY rowid ASC;",
            &key,
            "provenance.element_id",
        )? {
            references.push(ElementReference::ScopedProvenance(scoped));
        }
        for sourced in query_ids(
            self.conn,
            "SELECT element_id FROM provenance
             WHERE source_id = ?1 AND element_id != ?1
             ORDER BY rowid ASC;",
            &key,
            "provenance.element_id",
        )? {
            references.push(ElementReference::SourcedProvenance(sourced));
        }
        for group in query_ids(
            self.conn,
            "SELECT id FROM element_groups WHERE modeled_element_id = ?1;",
            &key,
            "element_groups.id",
        )? {
            references.push(ElementReference::ModeledBy(group));
        }

        Ok(references)
    }

    fn insert_group(&self, group: &NewGroup) -> RepoResult<EntityId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO element_groups (
                id,
                class,
                modeled_element_id,
                parent_group_id,
                props
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                group.class.as_str(),
                group.modeled_element_id.to_string(),
                group.parent_group_id.map(|value| value.to_string()),
                props_to_text(&group.props)?,
            ],
        )?;
        Ok(id)
    }

    fn update_group(&self, id: EntityId, group: &NewGroup) -> RepoResult<()> {
        ensure_not_sentinel(id)?;
        let changed = self.conn.execute(
            "UPDATE element_groups
             SET class = ?2,
                 modeled_element_id = ?3,
                 parent_group_id = ?4,
                 props = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id.to_string(),
                group.class.as_str(),
                group.modeled_element_id.to_string(),
                group.parent_group_id.map(|value| value.to_string()),
                props_to_text(&group.props)?,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_group(&self, id: EntityId) -> RepoResult<()> {
        ensure_not_sentinel(id)?;
        let changed = self
            .conn
            .execute("DELETE FROM element_groups WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn get_group(&self, id: EntityId) -> RepoResult<Option<GroupRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class, modeled_element_id, parent_group_id, props
             FROM element_groups
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_group_row(row)?));
        }
        Ok(None)
    }

    fn group_modeling(&self, element_id: EntityId) -> RepoResult<Option<EntityId>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM element_groups WHERE modeled_element_id = ?1;",
                [element_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|text| parse_uuid(&text, "element_groups.id"))
            .transpose()
    }

    fn insert_provenance(&self, record: &ProvenanceRecord) -> RepoResult<()> {
        ensure_not_sentinel(record.element_id)?;
        self.conn.execute(
            "INSERT INTO provenance (
                element_id,
                scope_id,
                source_id,
                anchor,
                kind,
                version,
                checksum
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                record.element_id.to_string(),
                record.scope_id.to_string(),
                record.source_id.map(|value| value.to_string()),
                record.anchor.as_str(),
                record.kind.as_str(),
                record.version.as_deref(),
                record.checksum.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn update_provenance(&self, record: &ProvenanceRecord) -> RepoResult<()> {
        ensure_not_sentinel(record.element_id)?;
        let changed = self.conn.execute(
            "UPDATE provenance
             SET scope_id = ?2,
                 source_id = ?3,
                 anchor = ?4,
                 kind = ?5,
                 version = ?6,
                 checksum = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE element_id = ?1;",
            params![
                record.element_id.to_string(),
                record.scope_id.to_string(),
                record.source_id.map(|value| value.to_string()),
                record.anchor.as_str(),
                record.kind.as_str(),
                record.version.as_deref(),
                record.checksum.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(record.element_id));
        }
        Ok(())
    }

    fn get_provenance(&self, element_id: EntityId) -> RepoResult<Option<ProvenanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT element_id, scope_id, source_id, anchor, kind, version, checksum
             FROM provenance
             WHERE element_id = ?1;",
        )?;
        let mut rows = stmt.query([element_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_provenance_row(row)?));
        }
        Ok(None)
    }

    fn is_managed(&self, id: EntityId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM provenance WHERE element_id = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert_attachment(
        &self,
        owner_id: EntityId,
        attachment: &AttachmentSpec,
    ) -> RepoResult<EntityId> {
        ensure_not_sentinel(owner_id)?;
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO attachments (id, element_id, class, props)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                id.to_string(),
                owner_id.to_string(),
                attachment.class.as_str(),
                props_to_text(&attachment.props)?,
            ],
        )?;
        Ok(id)
    }

    fn delete_attachment(&self, id: EntityId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM attachments WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn attachments_of(&self, element_id: EntityId) -> RepoResult<Vec<AttachmentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, element_id, class, props
             FROM attachments
             WHERE element_id = ?1
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([element_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(AttachmentRecord {
                id: parse_uuid(&row.get::<_, String>("id")?, "attachments.id")?,
                element_id: parse_uuid(
                    &row.get::<_, String>("element_id")?,
                    "attachments.element_id",
                )?,
                class: row.get("class")?,
                props: parse_props(&row.get::<_, String>("props")?, "attachments.props")?,
            });
        }
        Ok(items)
    }

    fn insert_relationship(
        &self,
        class: &str,
        source_id: EntityId,
        target_id: EntityId,
        props: &Props,
    ) -> RepoResult<EntityId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO relationships (id, class, source_id, target_id, props)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                class,
                source_id.to_string(),
                target_id.to_string(),
                props_to_text(props)?,
            ],
        )?;
        Ok(id)
    }

    fn delete_relationship(
        &self,
        class: &str,
        source_id: EntityId,
        target_id: EntityId,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM relationships
             WHERE class = ?1
               AND source_id = ?2
               AND target_id = ?3;",
            params![class, source_id.to_string(), target_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn relationships_of(&self, element_id: EntityId) -> RepoResult<Vec<RelationshipRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class, source_id, target_id, props
             FROM relationships
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([element_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(RelationshipRecord {
                id: parse_uuid(&row.get::<_, String>("id")?, "relationships.id")?,
                class: row.get("class")?,
                source_id: parse_uuid(
                    &row.get::<_, String>("source_id")?,
                    "relationships.source_id",
                )?,
                target_id: parse_uuid(
                    &row.get::<_, String>("target_id")?,
                    "relationships.target_id",
                )?,
                props: parse_props(&row.get::<_, String>("props")?, "relationships.props")?,
            });
        }
        Ok(items)
    }

    fn children_of(&self, element_id: EntityId) -> RepoResult<Vec<EntityId>> {
        query_ids(
            self.conn,
            "SELECT id
             FROM elements
             WHERE parent_id = ?1
             ORDER BY rowid ASC;",
            &element_id.to_string(),
            "elements.id",
        )
    }

    fn children_of_group(&self, group_id: EntityId) -> RepoResult<Vec<EntityId>> {
        query_ids(
            self.conn,
            "SELECT e.id
             FROM elements e
             INNER JOIN element_groups g ON g.id = e.group_id
             LEFT JOIN elements p ON p.id = e.parent_id
             WHERE e.group_id = ?1
               AND e.id != g.modeled_element_id
               AND (e.parent_id IS NULL OR p.group_id != e.group_id)
             ORDER BY e.rowid ASC;",
            &group_id.to_string(),
            "elements.id",
        )
    }

    fn read_tag(&self, entity_id: EntityId, anchor: &str) -> RepoResult<Option<Tag>> {
        let payload: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT payload
                 FROM relationship_tags
                 WHERE entity_id = ?1
                   AND anchor = ?2;",
                params![entity_id.to_string(), anchor],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|payload| {
                Tag::from_payload(payload.as_deref()).map_err(|err| {
                    RepoError::InvalidData(format!(
                        "invalid relationship tag `{anchor}` on {entity_id}: {err}"
                    ))
                })
            })
            .transpose()
    }

    fn tag_anchors(&self, entity_id: EntityId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT anchor
             FROM relationship_tags
             WHERE entity_id = ?1
             ORDER BY anchor ASC;",
        )?;
        let mut rows = stmt.query([entity_id.to_string()])?;
        let mut anchors = Vec::new();
        while let Some(row) = rows.next()? {
            anchors.push(row.get(0)?);
        }
        Ok(anchors)
    }

    fn write_tag(&self, entity_id: EntityId, anchor: &str, tag: &Tag) -> RepoResult<()> {
        let payload = tag.to_payload().map_err(|err| {
            RepoError::InvalidData(format!("cannot encode relationship tag `{anchor}`: {err}"))
        })?;
        self.conn.execute(
            "INSERT INTO relationship_tags (entity_id, anchor, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (entity_id, anchor) DO UPDATE
             SET payload = excluded.payload,
                 updated_at = (strftime('%s', 'now') * 1000);",
            params![entity_id.to_string(), anchor, payload],
        )?;
        Ok(())
    }

    fn remove_tag(&self, entity_id: EntityId, anchor: &str) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM relationship_tags
             WHERE entity_id = ?1
               AND anchor = ?2;",
            params![entity_id.to_string(), anchor],
        )?;
        Ok(())
    }
}

fn ensure_not_sentinel(id: EntityId) -> RepoResult<()> {
    if is_sentinel(id) {
        return Err(RepoError::SentinelMutation(id));
    }
    Ok(())
}

fn query_ids(
    conn: &Connection,
    sql: &str,
    key: &str,
    column: &'static str,
) -> RepoResult<Vec<EntityId>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([key])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, column)?);
    }
    Ok(ids)
}

fn parse_element_row(row: &Row<'_>) -> RepoResult<ElementRecord> {
    let id = parse_uuid(&row.get::<_, String>("id")?, "elements.id")?;
    let group_id = parse_uuid(&row.get::<_, String>("group_id")?, "elements.group_id")?;
    let parent_id = row
        .get::<_, Option<String>>("parent_id")?
        .map(|value| parse_uuid(&value, "elements.parent_id"))
        .transpose()?;
    let parent_class: Option<String> = row.get("parent_class")?;

    let parent = match (parent_id, parent_class) {
        (Some(parent_id), Some(class)) => Some(ParentRecord {
            id: parent_id,
            class,
        }),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "element {id} has a partial parent link"
            )));
        }
    };

    Ok(ElementRecord {
        id,
        class: row.get("class")?,
        group_id,
        parent,
        props: parse_props(&row.get::<_, String>("props")?, "elements.props")?,
    })
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<GroupRecord> {
    Ok(GroupRecord {
        id: parse_uuid(&row.get::<_, String>("id")?, "element_groups.id")?,
        class: row.get("class")?,
        modeled_element_id: parse_uuid(
            &row.get::<_, String>("modeled_element_id")?,
            "element_groups.modeled_element_id",
        )?,
        parent_group_id: row
            .get::<_, Option<String>>("parent_group_id")?
            .map(|value| parse_uuid(&value, "element_groups.parent_group_id"))
            .transpose()?,
        props: parse_props(&row.get::<_, String>("props")?, "element_groups.props")?,
    })
}

fn parse_provenance_row(row: &Row<'_>) -> RepoResult<ProvenanceRecord> {
    Ok(ProvenanceRecord {
        element_id: parse_uuid(
            &row.get::<_, String>("element_id")?,
            "provenance.element_id",
        )?,
        scope_id: parse_uuid(&row.get::<_, String>("scope_id")?, "provenance.scope_id")?,
        source_id: row
            .get::<_, Option<String>>("source_id")?
            .map(|value| parse_uuid(&value, "provenance.source_id"))
            .transpose()?,
        anchor: row.get("anchor")?,
        kind: row.get("kind")?,
        version: row.get("version")?,
        checksum: row.get("checksum")?,
    })
}

fn props_to_text(props: &Props) -> RepoResult<String> {
    serde_json::to_string(props)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode props: {err}")))
}

fn parse_props(value: &str, column: &'static str) -> RepoResult<Props> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid props in {column}: {err}")))
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_graph_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }

    for sentinel in [ROOT_ID, REPOSITORY_ID] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM elements WHERE id = ?1)
                 OR EXISTS(SELECT 1 FROM element_groups WHERE id = ?1);",
            [sentinel.to_string()],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::InvalidData(format!(
                "sentinel {sentinel} is missing"
            )));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
