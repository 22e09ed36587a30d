//! Behaviour shared by every local store backend.
//!
//! Each check runs against both the in-memory and the file-backed store.

use chrono::{Duration, TimeZone, Utc};
use local_store::{
    ActionId, CacheCollection, CachedMessage, FileLocalStore, LocalStore, MemoryLocalStore,
    NewPendingAction, StoreError,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

async fn memory_store() -> MemoryLocalStore {
    let store = MemoryLocalStore::new();
    store.initialize().await.unwrap();
    store
}

async fn file_store() -> (FileLocalStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileLocalStore::new(temp_dir.path().join("https_groupware.test"));
    store.initialize().await.unwrap();
    (store, temp_dir)
}

async fn check_insertion_order<S: LocalStore>(store: &S) {
    let mut ids = Vec::new();
    for n in 0..5 {
        let id = store
            .enqueue_pending_action(NewPendingAction::new("sendMessage", json!({"n": n})))
            .await
            .unwrap();
        ids.push(id);
    }

    let pending = store.list_pending_actions().await.unwrap();
    let listed: Vec<ActionId> = pending.iter().map(|a| a.id).collect();
    assert_eq!(listed, ids);
    for (n, action) in pending.iter().enumerate() {
        assert_eq!(action.payload, json!({"n": n}));
    }
}

async fn check_remove_is_idempotent<S: LocalStore>(store: &S) {
    let id = store
        .enqueue_pending_action(NewPendingAction::new("createTask", json!({"title": "a"})))
        .await
        .unwrap();

    store.remove_pending_action(id).await.unwrap();
    store.remove_pending_action(id).await.unwrap();
    store.remove_pending_action(ActionId(9_999)).await.unwrap();

    assert!(store.list_pending_actions().await.unwrap().is_empty());
}

async fn check_cache_last_write_wins<S: LocalStore>(store: &S) {
    assert_eq!(
        store
            .get_cached_value(CacheCollection::SettingsCache, "theme")
            .await
            .unwrap(),
        None
    );

    store
        .set_cached_value(CacheCollection::SettingsCache, "theme", json!("light"))
        .await
        .unwrap();
    store
        .set_cached_value(CacheCollection::SettingsCache, "theme", json!("dark"))
        .await
        .unwrap();

    assert_eq!(
        store
            .get_cached_value(CacheCollection::SettingsCache, "theme")
            .await
            .unwrap(),
        Some(json!("dark"))
    );
    // Collections are independent
    assert_eq!(
        store
            .get_cached_value(CacheCollection::UserCache, "theme")
            .await
            .unwrap(),
        None
    );
}

async fn check_message_cache<S: LocalStore>(store: &S) {
    let t = |secs| Utc.timestamp_opt(secs, 0).unwrap();
    store
        .cache_messages(
            "c1",
            vec![
                CachedMessage::new("m2", "c1", t(20), json!({"content": "second"})),
                CachedMessage::new("m1", "c1", t(10), json!({"content": "first"})),
            ],
        )
        .await
        .unwrap();
    store
        .cache_messages(
            "c2",
            vec![CachedMessage::new("m9", "c2", t(5), json!({}))],
        )
        .await
        .unwrap();

    let c1 = store.cached_messages("c1").await.unwrap();
    let ids: Vec<&str> = c1.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(store.cached_messages("c2").await.unwrap().len(), 1);
    assert!(store.cached_messages("unknown").await.unwrap().is_empty());
}

async fn check_dead_letter<S: LocalStore>(store: &S) {
    let id = store
        .enqueue_pending_action(NewPendingAction::new("sendMessage", json!({"chatId": "gone"})))
        .await
        .unwrap();

    assert_eq!(store.record_replay_failure(id).await.unwrap(), 1);
    assert_eq!(store.record_replay_failure(id).await.unwrap(), 2);
    assert_eq!(store.replay_attempts(id).await.unwrap(), 2);

    let failed = store.move_to_failed(id, "chat not found").await.unwrap();
    assert_eq!(failed.attempts, 2);
    assert_eq!(failed.last_error, "chat not found");

    assert!(store.list_pending_actions().await.unwrap().is_empty());
    assert_eq!(store.replay_attempts(id).await.unwrap(), 0);

    let listed = store.list_failed_actions().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].action.id, id);
    assert_eq!(listed[0].action.payload, json!({"chatId": "gone"}));

    assert_eq!(
        store.move_to_failed(id, "again").await,
        Err(StoreError::NotFound(id))
    );

    store.remove_failed_action(id).await.unwrap();
    assert!(store.list_failed_actions().await.unwrap().is_empty());
}

async fn check_attempts_cleared_on_remove<S: LocalStore>(store: &S) {
    let id = store
        .enqueue_pending_action(NewPendingAction::new("createTask", json!({})))
        .await
        .unwrap();
    store.record_replay_failure(id).await.unwrap();
    store.remove_pending_action(id).await.unwrap();

    assert_eq!(store.replay_attempts(id).await.unwrap(), 0);
    assert_eq!(
        store.record_replay_failure(id).await,
        Err(StoreError::NotFound(id))
    );
}

async fn check_leases<S: LocalStore>(store: &S) {
    let now = Utc.timestamp_opt(1_000, 0).unwrap();
    let ttl = Duration::seconds(30);

    assert!(store.try_acquire_lease("reconcile", "tab-a", ttl, now).await.unwrap());
    assert!(!store.try_acquire_lease("reconcile", "tab-b", ttl, now).await.unwrap());
    // Renewal by the holder
    assert!(store.try_acquire_lease("reconcile", "tab-a", ttl, now).await.unwrap());

    // A crashed holder's lease expires
    let later = now + Duration::seconds(31);
    assert!(store.try_acquire_lease("reconcile", "tab-b", ttl, later).await.unwrap());

    // Releasing someone else's lease does nothing
    store.release_lease("reconcile", "tab-a").await.unwrap();
    assert!(!store.try_acquire_lease("reconcile", "tab-a", ttl, later).await.unwrap());

    store.release_lease("reconcile", "tab-b").await.unwrap();
    assert!(store.try_acquire_lease("reconcile", "tab-a", ttl, later).await.unwrap());
}

async fn check_clear_all<S: LocalStore>(store: &S) {
    store
        .enqueue_pending_action(NewPendingAction::new("sendMessage", json!({})))
        .await
        .unwrap();
    store
        .set_cached_value(CacheCollection::UserCache, "profile", json!({"name": "Kim"}))
        .await
        .unwrap();

    store.clear_all().await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.pending_actions, 0);
    assert_eq!(stats.cached_values, 0);
}

#[tokio::test]
async fn test_memory_store_contract() {
    check_insertion_order(&memory_store().await).await;
    check_remove_is_idempotent(&memory_store().await).await;
    check_cache_last_write_wins(&memory_store().await).await;
    check_message_cache(&memory_store().await).await;
    check_dead_letter(&memory_store().await).await;
    check_attempts_cleared_on_remove(&memory_store().await).await;
    check_leases(&memory_store().await).await;
    check_clear_all(&memory_store().await).await;
}

#[tokio::test]
async fn test_file_store_contract() {
    let (store, _dir) = file_store().await;
    check_insertion_order(&store).await;
    let (store, _dir) = file_store().await;
    check_remove_is_idempotent(&store).await;
    let (store, _dir) = file_store().await;
    check_cache_last_write_wins(&store).await;
    let (store, _dir) = file_store().await;
    check_message_cache(&store).await;
    let (store, _dir) = file_store().await;
    check_dead_letter(&store).await;
    let (store, _dir) = file_store().await;
    check_attempts_cleared_on_remove(&store).await;
    let (store, _dir) = file_store().await;
    check_leases(&store).await;
    let (store, _dir) = file_store().await;
    check_clear_all(&store).await;
}

#[tokio::test]
async fn test_file_store_survives_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("origin");

    {
        let store = FileLocalStore::new(&path);
        store.initialize().await.unwrap();
        store
            .enqueue_pending_action(
                NewPendingAction::new("sendMessage", json!({"chatId": "c1", "content": "hi"}))
                    .with_user("u1"),
            )
            .await
            .unwrap();
        store
            .set_cached_value(CacheCollection::UserCache, "profile", json!({"id": "u1"}))
            .await
            .unwrap();
    }

    let store = FileLocalStore::new(&path);
    store.initialize().await.unwrap();

    let pending = store.list_pending_actions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action_type, "sendMessage");
    assert_eq!(pending[0].user_id.as_deref(), Some("u1"));
    assert_eq!(
        store
            .get_cached_value(CacheCollection::UserCache, "profile")
            .await
            .unwrap(),
        Some(json!({"id": "u1"}))
    );
}

#[tokio::test]
async fn test_two_file_store_instances_share_state() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("origin");

    let tab_a = FileLocalStore::new(&path);
    let tab_b = FileLocalStore::new(&path);
    tab_a.initialize().await.unwrap();
    tab_b.initialize().await.unwrap();

    let id = tab_a
        .enqueue_pending_action(NewPendingAction::new("sendMessage", json!({})))
        .await
        .unwrap();
    assert_eq!(tab_b.list_pending_actions().await.unwrap().len(), 1);

    let now = Utc::now();
    assert!(tab_a
        .try_acquire_lease("reconcile", "a", Duration::seconds(30), now)
        .await
        .unwrap());
    assert!(!tab_b
        .try_acquire_lease("reconcile", "b", Duration::seconds(30), now)
        .await
        .unwrap());

    tab_b.remove_pending_action(id).await.unwrap();
    assert!(tab_a.list_pending_actions().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_instances_never_share_ids() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("origin");

    let tab_a = Arc::new(FileLocalStore::new(&path));
    let tab_b = Arc::new(FileLocalStore::new(&path));
    tab_a.initialize().await.unwrap();
    tab_b.initialize().await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..100 {
        let store = if n % 2 == 0 { tab_a.clone() } else { tab_b.clone() };
        tasks.push(tokio::spawn(async move {
            store
                .enqueue_pending_action(NewPendingAction::new("sendMessage", json!({"n": n})))
                .await
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }

    let unique: HashSet<ActionId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 100);
    let listed: HashSet<ActionId> = tab_b
        .list_pending_actions()
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(listed, unique);

    // Removals on one tab race appends on the other
    let removed: Vec<ActionId> = ids.iter().copied().step_by(2).collect();
    let remover = {
        let store = tab_a.clone();
        let removed = removed.clone();
        tokio::spawn(async move {
            for id in removed {
                store.remove_pending_action(id).await.unwrap();
            }
        })
    };
    let appender = {
        let store = tab_b.clone();
        tokio::spawn(async move {
            let mut added = Vec::new();
            for n in 0..20 {
                let id = store
                    .enqueue_pending_action(NewPendingAction::new("createTask", json!({"n": n})))
                    .await
                    .unwrap();
                added.push(id);
            }
            added
        })
    };
    remover.await.unwrap();
    let added = appender.await.unwrap();

    let remaining: HashSet<ActionId> = tab_a
        .list_pending_actions()
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    let mut expected: HashSet<ActionId> = ids.iter().copied().skip(1).step_by(2).collect();
    expected.extend(added.iter().copied());
    assert_eq!(remaining, expected);
    assert!(added.iter().all(|id| !unique.contains(id)));
}
