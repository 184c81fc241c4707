//! Unit tests for the process registry's case-insensitive, multi-key lookup
//! (§4.2).

use std::path::{Path, PathBuf};

use bot_gateway::model::ProcessInfo;
use bot_gateway::registry::Registry;
use chrono::Utc;

fn process(id: &str, path: &str) -> ProcessInfo {
    ProcessInfo::new(id.to_owned(), PathBuf::from(path), 100)
}

#[tokio::test]
async fn find_resolves_by_id_alias_basename_and_path() {
    let registry = Registry::new();
    registry.register(process("p1", "/srv/api")).await;
    registry.set_alias("prod", Path::new("/srv/api")).await;

    assert_eq!(registry.find("p1").await.unwrap().process_id, "p1");
    assert_eq!(registry.find("prod").await.unwrap().process_id, "p1");
    assert_eq!(registry.find("api").await.unwrap().process_id, "p1");
    assert_eq!(registry.find("/srv/api").await.unwrap().process_id, "p1");
}

#[tokio::test]
async fn find_by_process_id_is_case_insensitive() {
    let registry = Registry::new();
    registry.register(process("p1", "/srv/api")).await;

    assert_eq!(registry.find("P1").await.unwrap().process_id, "p1");
    assert_eq!(registry.find("p1").await.unwrap().process_id, "p1");
}

#[tokio::test]
async fn unregister_clears_every_index() {
    let registry = Registry::new();
    registry.register(process("p1", "/srv/api")).await;
    registry.set_alias("prod", Path::new("/srv/api")).await;
    registry.unregister("p1").await;

    assert!(registry.find("p1").await.is_none());
    assert!(registry.find("api").await.is_none());
    assert!(registry.find("/srv/api").await.is_none());
}

#[tokio::test]
async fn duplicate_register_replaces_earlier_entry() {
    let registry = Registry::new();
    registry.register(process("p1", "/srv/api")).await;
    registry.register(process("p1", "/srv/other")).await;
    let found = registry.find("p1").await.unwrap();
    assert_eq!(found.name(), "other");
}

#[tokio::test]
async fn cleanup_stale_boundary_29s_kept_31s_removed() {
    let registry = Registry::new();
    let mut fresh = process("fresh", "/srv/fresh");
    fresh.last_seen = Utc::now() - chrono::Duration::seconds(29);
    let mut stale = process("stale", "/srv/stale");
    stale.last_seen = Utc::now() - chrono::Duration::seconds(31);
    registry.register(fresh).await;
    registry.register(stale).await;

    let removed = registry.cleanup_stale(chrono::Duration::seconds(30)).await;
    assert_eq!(removed, vec!["stale".to_owned()]);
    assert!(registry.find("fresh").await.is_some());
    assert!(registry.find("stale").await.is_none());
}
