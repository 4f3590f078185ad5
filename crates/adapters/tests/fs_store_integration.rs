//! Document store integration tests against the fixture vault.

use std::path::{Path, PathBuf};
use vault_sync_adapters::fs::LocalDocumentStore;
use vault_sync_adapters::policy::DocumentPolicy;
use vault_sync_domain::DocumentPath;
use vault_sync_ports::{DocumentContent, DocumentStorePort};
use vault_sync_shared::{RequestContext, Result};

fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../testkit/fixtures/vault/basic")
}

fn store() -> LocalDocumentStore {
    let policy = DocumentPolicy::new(["md", "txt"], [".obsidian/", "templates"], 1_000_000);
    LocalDocumentStore::new(fixture_root(), policy)
}

#[tokio::test]
async fn enumerates_fixture_vault_breadth_first() -> Result<()> {
    let paths = store().enumerate(&RequestContext::new_request()).await?;
    let paths: Vec<&str> = paths.iter().map(DocumentPath::as_str).collect();
    assert_eq!(
        paths,
        vec![
            "index.md",
            "notes/ideas.md",
            "notes/reading-list.txt",
            "notes/daily/2026-01-05.md",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn enumeration_is_deterministic() -> Result<()> {
    let ctx = RequestContext::new_request();
    let first = store().enumerate(&ctx).await?;
    let second = store().enumerate(&ctx).await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn reads_fixture_note_as_text() -> Result<()> {
    let content = store()
        .read(&RequestContext::new_request(), DocumentPath::parse("notes/ideas.md")?)
        .await?;
    let DocumentContent::Text(text) = content else {
        panic!("markdown must be text");
    };
    assert!(text.starts_with("# Ideas"));
    Ok(())
}

#[test]
fn should_index_matches_enumeration_policy() -> Result<()> {
    let store = store();
    assert!(store.should_index(&DocumentPath::parse("notes/new.md")?));
    assert!(!store.should_index(&DocumentPath::parse("templates/daily.md")?));
    assert!(!store.should_index(&DocumentPath::parse(".obsidian/workspace.md")?));
    assert!(!store.should_index(&DocumentPath::parse("attachments/diagram.png")?));
    Ok(())
}
