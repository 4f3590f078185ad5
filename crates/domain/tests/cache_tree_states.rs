//! Integration coverage for the cache record, index tree, and run states.

use std::collections::BTreeMap;
use std::error::Error;
use vault_sync_domain::{
    ChangeKind, DocumentPath, Fingerprint, FingerprintStrategy, IndexCacheRecord, IndexTreeNode,
    IndexedEntry, RemoteResourceId, RunEvent, RunState, StoreId, coalesce_all,
};

fn entry(path: &str) -> Result<IndexedEntry, Box<dyn Error>> {
    Ok(IndexedEntry {
        path: DocumentPath::parse(path)?,
        remote_resource_id: RemoteResourceId::parse(format!("docs/{path}"))?,
        fingerprint: Fingerprint::digest(path.as_bytes()),
        last_indexed_at_ms: 1_000,
    })
}

#[test]
fn cache_record_uses_camel_case_and_survives_a_schema_rebuild() -> Result<(), Box<dyn Error>> {
    let schema = FingerprintStrategy::ContentDigest.cache_schema_version();
    let mut record = IndexCacheRecord::empty(schema.clone());
    record.store_id = Some(StoreId::parse("store-1")?);
    record.last_full_sync_ms = Some(2_000);
    let indexed = entry("index.md")?;
    record.entries.insert(indexed.path.clone(), indexed);

    let value = serde_json::to_value(&record)?;
    assert_eq!(value["schemaVersion"], schema.as_str());
    assert_eq!(value["entries"]["index.md"]["remoteResourceId"], "docs/index.md");

    let rebuilt = record.rebuilt_for(FingerprintStrategy::MtimeSize.cache_schema_version());
    assert!(rebuilt.entries.is_empty());
    assert!(rebuilt.last_full_sync_ms.is_none());
    assert_eq!(rebuilt.store_id.as_ref().map(StoreId::as_str), Some("store-1"));
    assert_ne!(&*rebuilt.schema_version, schema.as_str());
    Ok(())
}

#[test]
fn tree_marks_indexed_and_pending_documents() -> Result<(), Box<dyn Error>> {
    let paths = [
        DocumentPath::parse("index.md")?,
        DocumentPath::parse("notes/ideas.md")?,
        DocumentPath::parse("notes/daily/2026-01-05.md")?,
    ];
    let mut entries = BTreeMap::new();
    let indexed = entry("notes/ideas.md")?;
    entries.insert(indexed.path.clone(), indexed);

    let tree = IndexTreeNode::build(paths.iter(), &entries);
    assert_eq!(tree.name(), "");
    assert_eq!(tree.counts(), (1, 2));

    let IndexTreeNode::Folder { children, .. } = &tree else {
        return Err("root must be a folder".into());
    };
    let names: Vec<&str> = children.iter().map(IndexTreeNode::name).collect();
    assert_eq!(names, ["notes", "index.md"]);
    Ok(())
}

#[test]
fn burst_of_changes_collapses_to_net_intent() {
    use ChangeKind::{Create, Delete, Modify};
    assert_eq!(coalesce_all([Create, Modify, Modify]), Some(Create));
    assert_eq!(coalesce_all([Create, Modify, Delete]), None);
    assert_eq!(coalesce_all([Modify, Delete, Create]), Some(Modify));
    assert_eq!(coalesce_all(Vec::<ChangeKind>::new()), None);
}

#[test]
fn run_states_follow_the_lifecycle() {
    let idle = RunState::Disabled
        .transition(&RunEvent::Initialized)
        .unwrap_or(RunState::Disabled);
    assert_eq!(idle, RunState::Idle);

    let indexing = idle.transition(&RunEvent::WorkStarted);
    assert_eq!(indexing, Some(RunState::Indexing));

    let limited = RunState::Indexing.transition(&RunEvent::RateLimited { resume_at_ms: 9 });
    assert_eq!(limited, Some(RunState::RateLimited { resume_at_ms: 9 }));
    assert!(!RunState::RateLimited { resume_at_ms: 9 }.accepts_work());

    assert_eq!(RunState::Paused.transition(&RunEvent::WorkStarted), None);
    assert_eq!(
        RunState::Paused.transition(&RunEvent::Shutdown),
        Some(RunState::Disabled)
    );
}
