//! Tests for HistoryStore implementations: JsonHistoryStore and MemoryHistoryStore.

use serde::{Deserialize, Serialize};

use bagana::storage::HistoryStore;
use bagana::storage::json_store::JsonHistoryStore;
use bagana::storage::memory_store::MemoryHistoryStore;
use bagana::workflows::campaign::CampaignResults;
use bagana::workflows::{Campaign, Research, WorkflowKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    n: u32,
}

fn entry(n: u32) -> Entry {
    Entry { n }
}

async fn fill(store: &dyn HistoryStore<Entry>, count: u32) {
    for n in 1..=count {
        store.append(&entry(n)).await.unwrap();
    }
}

fn numbers(entries: &[Entry]) -> Vec<u32> {
    entries.iter().map(|e| e.n).collect()
}

// ===== MemoryHistoryStore =====

#[tokio::test]
async fn memory_store_lists_newest_first() {
    let store = MemoryHistoryStore::<Entry>::new(5);
    fill(&store, 3).await;
    assert_eq!(numbers(&store.list().await.unwrap()), vec![3, 2, 1]);
}

#[tokio::test]
async fn memory_store_evicts_oldest_past_capacity() {
    let store = MemoryHistoryStore::<Entry>::new(3);
    fill(&store, 4).await;

    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(numbers(&entries), vec![4, 3, 2]);
}

#[tokio::test]
async fn memory_store_empty_by_default() {
    let store = MemoryHistoryStore::<Entry>::new(3);
    assert!(store.list().await.unwrap().is_empty());
    assert_eq!(store.capacity(), 3);
}

// ===== JsonHistoryStore =====

#[tokio::test]
async fn json_store_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn json_store_capacity_plus_one_evicts_oldest() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    fill(&store, 11).await;

    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 10);
    assert_eq!(numbers(&entries), (2..=11).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn json_store_list_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    fill(&store, 4).await;

    let first = store.list().await.unwrap();
    let second = store.list().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
        fill(&store, 2).await;
    }

    let reopened = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    assert_eq!(numbers(&reopened.list().await.unwrap()), vec![2, 1]);
}

#[tokio::test]
async fn json_store_corrupt_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    std::fs::write(store.path(), "{ not json").unwrap();

    assert!(store.list().await.unwrap().is_empty());

    // Appending over corrupt data starts a fresh log.
    store.append(&entry(7)).await.unwrap();
    assert_eq!(numbers(&store.list().await.unwrap()), vec![7]);
}

#[tokio::test]
async fn json_store_wrong_shape_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    std::fs::write(store.path(), r#"{"n": 1}"#).unwrap();
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn json_store_caps_oversized_log_at_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::<Entry>::new(dir.path(), "history", 10);
    let seeded: Vec<Entry> = (1..=25).rev().map(entry).collect();
    std::fs::write(store.path(), serde_json::to_string(&seeded).unwrap()).unwrap();

    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 10);
    assert_eq!(numbers(&entries), (16..=25).rev().collect::<Vec<_>>());

    store.append(&entry(26)).await.unwrap();
    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 10);
    assert_eq!(entries[0], entry(26));
    assert_eq!(entries[9], entry(17));
}

#[tokio::test]
async fn json_store_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = JsonHistoryStore::<Entry>::new(&nested, "history", 2);
    store.append(&entry(1)).await.unwrap();

    assert!(nested.join("history.json").exists());
    assert!(!nested.join("history.json.tmp").exists());
}

#[tokio::test]
async fn json_store_keys_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let a = JsonHistoryStore::<Entry>::new(dir.path(), "a", 5);
    let b = JsonHistoryStore::<Entry>::new(dir.path(), "b", 5);
    fill(&a, 2).await;

    assert!(b.list().await.unwrap().is_empty());
}

#[test]
fn per_kind_stores_use_their_key_and_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let campaign = JsonHistoryStore::<CampaignResults>::for_kind::<Campaign>(dir.path());
    assert_eq!(campaign.capacity(), 20);
    assert!(campaign.path().ends_with("bagana_campaign_history.json"));

    let research = JsonHistoryStore::for_kind::<Research>(dir.path());
    assert_eq!(research.capacity(), Research::HISTORY_CAPACITY);
    assert!(research.path().ends_with("workflow_history.json"));
}
