//! `treesync` demo binary.
//!
//! Synchronizes a small sample plant description into a graph store and
//! trims what the requested revision no longer describes.

use clap::Parser;
use log::info;
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use treesync_core::{
    init_logging, open_db, AppConfig, ElementSpec, GroupSpec, NodeRef, ProvenanceSpec,
    RelationshipSpec, SourceGraph, SqliteGraphRepository, SyncSession,
};

#[derive(Parser, Debug)]
#[command(name = "treesync")]
#[command(about = "Sync a sample plant description into a graph store")]
struct Args {
    /// Graph store file; overrides `database_path` from the config
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Sample revision to apply
    #[arg(long, default_value_t = 1)]
    revision: u32,
}

struct Sample {
    graph: SourceGraph,
    partition: NodeRef,
}

/// Revision 1 holds two pumps feeding each other. Later revisions bump the
/// first pump, replace the second with a tank and move the feed onto it.
fn sample(revision: u32) -> Sample {
    let mut graph = SourceGraph::new();
    let partition = graph.add_element(
        ElementSpec::new(
            "PhysicalPartition",
            NodeRef::Repository,
            ProvenanceSpec::new(NodeRef::Root, "partition", "sample-plant"),
        )
        .with_parent(NodeRef::Root, "SubjectOwnsPartitionElements"),
    );
    let model = graph.add_group(GroupSpec::new("PhysicalModel", partition));
    let main_pump = graph.add_element(
        ElementSpec::new(
            "Pump",
            model,
            ProvenanceSpec::new(partition, "unit", "pump-1").with_version(revision.to_string()),
        )
        .with_prop("revision", revision),
    );
    let downstream = if revision <= 1 {
        graph.add_element(ElementSpec::new(
            "Pump",
            model,
            ProvenanceSpec::new(partition, "unit", "pump-2").with_version("1"),
        ))
    } else {
        graph.add_element(ElementSpec::new(
            "Tank",
            model,
            ProvenanceSpec::new(partition, "unit", "tank-1").with_version("1"),
        ))
    };
    graph.add_relationship(RelationshipSpec::new(
        "PumpFeeds",
        main_pump,
        downstream,
        "feed-1",
    ));

    Sample { graph, partition }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir)?;
    }

    let db_path = args
        .db
        .or_else(|| config.database_path.clone())
        .ok_or("no graph store given; pass --db or set database_path")?;

    let sample = sample(args.revision);
    let mut conn = open_db(&db_path)?;
    let tx = conn.transaction()?;
    let (touched, changed, trim) = {
        let repo = SqliteGraphRepository::try_new(&tx)?;
        let mut session = SyncSession::new(&repo, config.sync.clone());
        session.sync_all(&sample.graph)?;
        let trim = session.trim(&sample.graph, sample.partition)?;
        (session.touched().len(), session.changed().len(), trim)
    };
    tx.commit()?;

    info!(
        "event=cli_run module=cli status=ok revision={} touched={} changed={}",
        args.revision, touched, changed
    );
    println!(
        "{}",
        json!({
            "revision": args.revision,
            "touched": touched,
            "changed": changed,
            "deleted_elements": trim.deleted_elements,
            "deleted_groups": trim.deleted_groups,
            "deleted_attachments": trim.deleted_attachments,
        })
    );
    Ok(())
}
