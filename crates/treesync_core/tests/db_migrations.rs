use rusqlite::Connection;
use treesync_core::db::migrations::latest_version;
use treesync_core::db::{open_db, open_db_in_memory, DbError};
use treesync_core::{GraphRepository, RepoError, SqliteGraphRepository, REPOSITORY_ID, ROOT_ID};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "elements",
        "element_groups",
        "provenance",
        "attachments",
        "relationships",
        "relationship_tags",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn migrations_seed_root_and_repository_sentinels() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();

    let root = repo.get_element(ROOT_ID).unwrap().expect("root element");
    assert_eq!(root.group_id, REPOSITORY_ID);
    assert!(root.parent.is_none());

    let repository = repo.get_group(REPOSITORY_ID).unwrap().expect("repository group");
    assert_eq!(repository.modeled_element_id, ROOT_ID);
    assert_eq!(repo.group_modeling(ROOT_ID).unwrap(), Some(REPOSITORY_ID));
    assert!(!repo.is_managed(ROOT_ID).unwrap());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let sentinels: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM elements;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(sentinels, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteGraphRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn repository_reports_missing_table() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE relationship_tags;").unwrap();

    match SqliteGraphRepository::try_new(&conn) {
        Err(RepoError::MissingRequiredTable(table)) => assert_eq!(table, "relationship_tags"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("missing table must be rejected"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
