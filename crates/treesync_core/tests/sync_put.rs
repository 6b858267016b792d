use treesync_core::db::open_db_in_memory;
use treesync_core::{
    ElementSpec, GraphRepository, GroupSpec, NodeKind, NodeRef, ProvenanceSpec, SourceGraph,
    SqliteGraphRepository, SyncConfig, SyncError, SyncSession, REPOSITORY_ID, ROOT_ID,
};

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

struct Site {
    graph: SourceGraph,
    partition: NodeRef,
    model: NodeRef,
    pump: NodeRef,
    pipe: NodeRef,
}

/// Partition modeled by a physical model holding a pump and a pipe sourced
/// from the pump.
fn site() -> Site {
    let mut graph = SourceGraph::new();
    let partition = graph.add_element(
        ElementSpec::new(
            "PhysicalPartition",
            NodeRef::Repository,
            ProvenanceSpec::new(NodeRef::Root, "partition", "site-a"),
        )
        .with_parent(NodeRef::Root, "SubjectOwnsPartitionElements"),
    );
    let model = graph.add_group(GroupSpec::new("PhysicalModel", partition));
    let pump = graph.add_element(ElementSpec::new(
        "Pump",
        model,
        ProvenanceSpec::new(partition, "unit", "pump-1").with_version("1"),
    ));
    let pipe = graph.add_element(ElementSpec::new(
        "Pipe",
        model,
        ProvenanceSpec::new(partition, "unit", "pipe-1")
            .with_source(pump)
            .with_checksum("c1"),
    ));
    Site {
        graph,
        partition,
        model,
        pump,
        pipe,
    }
}

fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn sentinels_resolve_to_fixed_ids() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut session = SyncSession::new(&repo, SyncConfig::default());
    let graph = SourceGraph::new();

    assert_eq!(session.put(&graph, NodeRef::Root).unwrap(), ROOT_ID);
    assert_eq!(session.put(&graph, NodeRef::Repository).unwrap(), REPOSITORY_ID);
}

#[test]
fn put_inserts_dependencies_bottom_up() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut session = SyncSession::new(&repo, SyncConfig::default());
    let site = site();

    let pipe_id = session.put(&site.graph, site.pipe).unwrap();
    let partition_id = session.put(&site.graph, site.partition).unwrap();
    let model_id = session.put(&site.graph, site.model).unwrap();
    let pump_id = session.put(&site.graph, site.pump).unwrap();

    let pipe = repo.get_element(pipe_id).unwrap().unwrap();
    assert_eq!(pipe.group_id, model_id);
    let provenance = repo.get_provenance(pipe_id).unwrap().unwrap();
    assert_eq!(provenance.scope_id, partition_id);
    assert_eq!(provenance.source_id, Some(pump_id));
    assert_eq!(provenance.checksum.as_deref(), Some("c1"));

    let model = repo.get_group(model_id).unwrap().unwrap();
    assert_eq!(model.modeled_element_id, partition_id);
    assert_eq!(model.parent_group_id, Some(REPOSITORY_ID));

    let partition = repo.get_element(partition_id).unwrap().unwrap();
    assert_eq!(partition.parent.map(|parent| parent.id), Some(ROOT_ID));
}

#[test]
fn put_is_idempotent_across_sessions() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let site = site();

    let first = SyncSession::new(&repo, SyncConfig::default())
        .put(&site.graph, site.pipe)
        .unwrap();
    let elements = count(&conn, "elements");
    let groups = count(&conn, "element_groups");
    let provenance = count(&conn, "provenance");

    let second = SyncSession::new(&repo, SyncConfig::default())
        .put(&site.graph, site.pipe)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(count(&conn, "elements"), elements);
    assert_eq!(count(&conn, "element_groups"), groups);
    assert_eq!(count(&conn, "provenance"), provenance);
}

#[test]
fn put_is_idempotent_within_one_session() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let site = site();
    let mut session = SyncSession::new(&repo, SyncConfig::default());

    let first = session.put(&site.graph, site.pipe).unwrap();
    let elements = count(&conn, "elements");
    let groups = count(&conn, "element_groups");
    let provenance = count(&conn, "provenance");

    let second = session.put(&site.graph, site.pipe).unwrap();
    let model = session.put(&site.graph, site.model).unwrap();
    let model_again = session.put(&site.graph, site.model).unwrap();

    assert_eq!(first, second);
    assert_eq!(model, model_again);
    // Partition, pump and pipe on top of the root sentinel.
    assert_eq!(elements, 4);
    assert_eq!(count(&conn, "elements"), elements);
    assert_eq!(count(&conn, "element_groups"), groups);
    assert_eq!(count(&conn, "provenance"), provenance);
}

#[test]
fn put_never_updates_an_existing_element() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut site = site();

    let id = SyncSession::new(&repo, SyncConfig::default())
        .put(&site.graph, site.pump)
        .unwrap();

    let pump = site.graph.element_mut(site.pump).unwrap();
    pump.provenance.version = Some("2".to_string());
    pump.props.insert("rating".to_string(), serde_json::json!(9));

    let again = SyncSession::new(&repo, SyncConfig::default())
        .put(&site.graph, site.pump)
        .unwrap();
    assert_eq!(again, id);
    assert!(repo.get_element(id).unwrap().unwrap().props.is_empty());
    assert_eq!(
        repo.get_provenance(id).unwrap().unwrap().version.as_deref(),
        Some("1")
    );
}

#[test]
fn touched_set_contains_every_transitive_dependency() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let site = site();

    for _ in 0..2 {
        let mut session = SyncSession::new(&repo, SyncConfig::default());
        session.sync(&site.graph, site.pipe).unwrap();

        let pipe_id = session.put(&site.graph, site.pipe).unwrap();
        let pump_id = repo
            .get_provenance(pipe_id)
            .unwrap()
            .unwrap()
            .source_id
            .unwrap();
        let model_id = repo.get_element(pipe_id).unwrap().unwrap().group_id;
        let partition_id = repo.get_group(model_id).unwrap().unwrap().modeled_element_id;

        for id in [pipe_id, pump_id, model_id, partition_id, ROOT_ID, REPOSITORY_ID] {
            assert!(session.is_touched(id), "{id} should be touched");
        }
    }
}

#[test]
fn fresh_session_starts_with_nothing_touched() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let site = site();
    SyncSession::new(&repo, SyncConfig::default())
        .sync_all(&site.graph)
        .unwrap();

    let session = SyncSession::new(&repo, SyncConfig::default());
    assert!(session.touched().is_empty());
    assert!(session.changed().is_empty());
}

#[test]
fn mutual_scope_reference_is_a_cycle() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut graph = SourceGraph::new();

    let a = graph.add_element(ElementSpec::new(
        "Pump",
        NodeRef::Repository,
        ProvenanceSpec::new(NodeRef::Root, "unit", "a"),
    ));
    let b = graph.add_element(ElementSpec::new(
        "Pump",
        NodeRef::Repository,
        ProvenanceSpec::new(a, "unit", "b"),
    ));
    graph.element_mut(a).unwrap().provenance.scope = b;

    let mut session = SyncSession::new(&repo, SyncConfig::default());
    match session.put(&graph, a).unwrap_err() {
        SyncError::ScopeCycle { path } => {
            assert_eq!(path, vec!["element unit:a", "element unit:b", "element unit:a"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(session.touched().is_empty());
}

#[test]
fn self_scoped_element_is_a_cycle_within_one_call() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut graph = SourceGraph::new();

    let a = graph.add_element(ElementSpec::new(
        "Pump",
        NodeRef::Repository,
        ProvenanceSpec::new(NodeRef::Root, "unit", "self"),
    ));
    graph.element_mut(a).unwrap().provenance.scope = a;

    let mut session = SyncSession::new(&repo, SyncConfig::default());
    let err = session.put(&graph, a).unwrap_err();
    assert!(matches!(err, SyncError::ScopeCycle { ref path } if path.len() == 2));

    // The stack is reset, so a valid node still resolves in the same session.
    let ok = graph.add_element(ElementSpec::new(
        "Pump",
        NodeRef::Repository,
        ProvenanceSpec::new(NodeRef::Root, "unit", "ok"),
    ));
    session.put(&graph, ok).unwrap();
}

#[test]
fn element_inside_the_group_it_models_is_a_cycle() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut graph = SourceGraph::new();

    let partition = graph.add_element(ElementSpec::new(
        "PhysicalPartition",
        NodeRef::Repository,
        ProvenanceSpec::new(NodeRef::Root, "partition", "loop"),
    ));
    let model = graph.add_group(GroupSpec::new("PhysicalModel", partition));
    graph.element_mut(partition).unwrap().group = model;

    let mut session = SyncSession::new(&repo, SyncConfig::default());
    let err = session.put(&graph, partition).unwrap_err();
    assert!(matches!(err, SyncError::ScopeCycle { .. }));
}

#[test]
fn references_must_name_the_right_kind() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let mut graph = SourceGraph::new();

    let pump = graph.add_element(ElementSpec::new(
        "Pump",
        NodeRef::Repository,
        ProvenanceSpec::new(NodeRef::Root, "unit", "pump"),
    ));
    let misplaced = graph.add_element(ElementSpec::new(
        "Pipe",
        pump,
        ProvenanceSpec::new(NodeRef::Root, "unit", "pipe"),
    ));

    let mut session = SyncSession::new(&repo, SyncConfig::default());
    match session.put(&graph, misplaced).unwrap_err() {
        SyncError::UnexpectedNodeKind {
            node,
            expected,
            found,
        } => {
            assert_eq!(node, pump);
            assert_eq!(expected, NodeKind::Group);
            assert_eq!(found, NodeKind::Element);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reference_from_another_graph_is_unknown() {
    let conn = setup();
    let repo = SqliteGraphRepository::try_new(&conn).unwrap();
    let site = site();

    let mut session = SyncSession::new(&repo, SyncConfig::default());
    let err = session.put(&SourceGraph::new(), site.pipe).unwrap_err();
    assert!(matches!(err, SyncError::UnknownNode(_)));
}
