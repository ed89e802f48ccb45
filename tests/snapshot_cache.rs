use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use snapcache::cache::{
    CacheConfig, IdentifierMap, PruneMode, ReadError, SnapshotManager, StoreError, WriteError,
};
use snapcache::domain::changes::{Change, ChangeBatch};
use snapcache::domain::entities::{ContentData, NodeRecord};
use snapcache::domain::types::{ContentKind, NodeId, NodeKey};
use uuid::Uuid;

const DOC: ContentKind = ContentKind::Document;

fn key(id: i32) -> NodeKey {
    NodeKey::from_uuid(Uuid::from_u128(0x5eed_0000 + id as u128))
}

fn record(id: i32, parent: Option<i32>, sort_order: i32, name: &str) -> NodeRecord {
    NodeRecord {
        id: NodeId::new(id),
        key: key(id),
        parent: parent.map(NodeId::new),
        sort_order,
        content_type: "page".to_string(),
        data: ContentData {
            name: name.to_string(),
            ..Default::default()
        },
    }
}

fn small_tree() -> Vec<NodeRecord> {
    vec![
        record(1, None, 0, "Home"),
        record(2, Some(1), 1, "About"),
        record(3, Some(1), 0, "Blog"),
    ]
}

async fn manager_with(config: CacheConfig, records: Vec<NodeRecord>) -> Arc<SnapshotManager> {
    let manager = Arc::new(SnapshotManager::new(config));
    let token = manager.begin_write().await.expect("write section");
    manager.rebuild(token, DOC, records).expect("cold load");
    manager
}

async fn commit(manager: &SnapshotManager, changes: Vec<Change>) -> Result<u64, WriteError> {
    let token = manager.begin_write().await?;
    let outcome = manager.commit_write(token, &ChangeBatch::new(DOC, changes))?;
    Ok(outcome.generation)
}

fn ids(nodes: &[Arc<snapcache::domain::entities::ContentNode>]) -> Vec<i32> {
    nodes.iter().map(|node| node.id.get()).collect()
}

#[tokio::test]
async fn cold_loaded_children_are_visible() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;
    let snapshot = manager.create_snapshot();

    let children = snapshot
        .children(DOC, Some(NodeId::new(1)))
        .expect("children");
    assert_eq!(ids(&children), vec![3, 2]);
    assert_eq!(snapshot.generation(DOC), 1);
}

#[tokio::test]
async fn snapshots_keep_the_generation_they_pinned() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;
    let before = manager.create_snapshot();

    let generation = commit(&manager, vec![Change::remove(2)])
        .await
        .expect("commit");
    assert_eq!(generation, 2);

    let after = manager.create_snapshot();
    assert!(before.read(DOC, NodeId::new(2)).expect("read").is_some());
    assert!(after.read(DOC, NodeId::new(2)).expect("read").is_none());
    assert_eq!(
        ids(&before.children(DOC, Some(NodeId::new(1))).expect("children")),
        vec![3, 2]
    );
    assert_eq!(
        ids(&after.children(DOC, Some(NodeId::new(1))).expect("children")),
        vec![3]
    );
}

#[tokio::test]
async fn releasing_old_snapshots_prunes_only_unobservable_revisions() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;
    let pinned = manager.create_snapshot();

    commit(
        &manager,
        vec![Change::remove(2), Change::upsert(record(3, Some(1), 0, "News"))],
    )
    .await
    .expect("commit");

    let stats = manager.stats(DOC);
    assert_eq!(stats.store.revisions, 4);
    assert_eq!(stats.floor, 1);

    pinned.release();

    let stats = manager.stats(DOC);
    assert_eq!(stats.floor, 2);
    assert_eq!(stats.store.revisions, 2);
    assert_eq!(stats.store.chains, 2);
    assert_eq!(stats.store.pending_garbage, 0);

    let latest = manager.create_snapshot();
    let news = latest
        .read(DOC, NodeId::new(3))
        .expect("read")
        .expect("node 3");
    assert_eq!(news.data.name, "News");
    assert!(latest.read(DOC, NodeId::new(1)).expect("read").is_some());
}

#[tokio::test]
async fn identifier_map_resolves_each_id_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let map = IdentifierMap::new();
    map.register_resolvers(
        DOC,
        Arc::new(move |id: NodeId| {
            counted.fetch_add(1, Ordering::SeqCst);
            (id == NodeId::new(42)).then(|| key(42))
        }),
        Arc::new(|_: NodeKey| None::<NodeId>),
    )
    .expect("register");

    assert_eq!(map.get_key_for_id(DOC, NodeId::new(42)), Some(key(42)));
    assert_eq!(map.get_key_for_id(DOC, NodeId::new(42)), Some(key(42)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(map.get_id_for_key(DOC, key(42)), Some(NodeId::new(42)));
}

#[tokio::test]
async fn rejected_change_set_leaves_no_trace() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;

    let err = commit(
        &manager,
        vec![
            Change::upsert(record(4, Some(1), 2, "Contact")),
            Change::upsert(record(5, Some(99), 0, "Orphan")),
        ],
    )
    .await
    .expect_err("missing parent");
    assert!(matches!(
        err,
        WriteError::Store(StoreError::MissingParent { .. })
    ));

    assert_eq!(manager.current_generation(DOC), 1);
    let snapshot = manager.create_snapshot();
    assert!(snapshot.read(DOC, NodeId::new(4)).expect("read").is_none());

    // The write section was released by the failed commit.
    let generation = commit(&manager, vec![Change::upsert(record(4, Some(1), 2, "Contact"))])
        .await
        .expect("next commit");
    assert_eq!(generation, 2);
}

#[tokio::test]
async fn moving_a_node_under_its_descendant_is_rejected() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;

    let err = commit(&manager, vec![Change::upsert(record(1, Some(3), 0, "Home"))])
        .await
        .expect_err("cycle");
    assert!(matches!(err, WriteError::Store(StoreError::Cycle { .. })));
}

#[tokio::test]
async fn moves_update_both_parents() {
    let mut records = small_tree();
    records.push(record(4, Some(3), 0, "Post"));
    let manager = manager_with(CacheConfig::default(), records).await;
    let before = manager.create_snapshot();

    commit(&manager, vec![Change::upsert(record(4, Some(2), 0, "Post"))])
        .await
        .expect("move");
    let after = manager.create_snapshot();

    assert_eq!(
        ids(&before.children(DOC, Some(NodeId::new(3))).expect("children")),
        vec![4]
    );
    assert!(after.children(DOC, Some(NodeId::new(3))).expect("children").is_empty());
    assert_eq!(
        ids(&after.children(DOC, Some(NodeId::new(2))).expect("children")),
        vec![4]
    );
}

#[tokio::test]
async fn out_of_order_generation_is_a_sequencing_fault() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;
    let token = manager.begin_write().await.expect("write section");

    let batch = ChangeBatch::new(DOC, vec![Change::remove(3)]).with_expected_generation(5);
    let err = manager.commit_write(token, &batch).expect_err("gap");
    match err {
        WriteError::Store(store) => assert!(store.is_sequencing_fault()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.current_generation(DOC), 1);
}

#[tokio::test]
async fn rebuild_invalidates_snapshots_of_the_old_epoch() {
    let manager = manager_with(CacheConfig::default(), small_tree()).await;
    let stale = manager.create_snapshot();

    let token = manager.begin_write().await.expect("write section");
    let outcome = manager
        .rebuild(token, DOC, vec![record(1, None, 0, "Home")])
        .expect("rebuild");
    assert_eq!(outcome.epoch, stale.epoch(DOC) + 1);

    let err = stale.read(DOC, NodeId::new(1)).expect_err("stale");
    assert!(matches!(err, ReadError::SnapshotInvalidated { .. }));
    // Other kinds keep their pins.
    assert!(stale.all(ContentKind::Media).expect("media").is_empty());

    let fresh = manager.create_snapshot();
    assert_eq!(fresh.generation(DOC), 1);
    assert_eq!(fresh.all(DOC).expect("all").len(), 1);

    stale.release();
    assert_eq!(manager.stats(DOC).live_snapshots, 1);
}

#[tokio::test]
async fn writer_times_out_while_section_is_held() {
    let config = CacheConfig {
        write_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let manager = manager_with(config, small_tree()).await;
    let held = manager.begin_write().await.expect("write section");

    let err = manager.begin_write().await.expect_err("timeout");
    assert!(matches!(err, WriteError::Timeout { .. }));

    drop(held);
    assert!(manager.begin_write().await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_see_consistent_generations() {
    let manager = manager_with(CacheConfig::default(), vec![record(1, None, 0, "Home 1")]).await;

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let snapshot = manager.create_snapshot();
                    let generation = snapshot.generation(DOC);
                    let home = snapshot
                        .read(DOC, NodeId::new(1))
                        .expect("read")
                        .expect("home");
                    assert_eq!(home.data.name, format!("Home {generation}"));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for generation in 2..=20 {
        commit(
            &manager,
            vec![Change::upsert(record(1, None, 0, &format!("Home {generation}")))],
        )
        .await
        .expect("commit");
    }

    for reader in readers {
        reader.await.expect("reader");
    }
    assert_eq!(manager.current_generation(DOC), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_changes_become_visible_together() {
    let pair = |tag: u64| {
        vec![
            Change::upsert(record(2, Some(1), 0, &format!("A {tag}"))),
            Change::upsert(record(3, Some(1), 1, &format!("B {tag}"))),
        ]
    };
    let seed = vec![
        record(1, None, 0, "Home"),
        record(2, Some(1), 0, "A 1"),
        record(3, Some(1), 1, "B 1"),
    ];
    let manager = manager_with(CacheConfig::default(), seed).await;
    let writing = Arc::new(AtomicBool::new(true));

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let writing = Arc::clone(&writing);
            tokio::spawn(async move {
                let mut observed = 0;
                while writing.load(Ordering::Acquire) || observed == 0 {
                    let snapshot = manager.create_snapshot();
                    let tag = snapshot.generation(DOC);
                    let names: Vec<String> = snapshot
                        .children(DOC, Some(NodeId::new(1)))
                        .expect("children")
                        .iter()
                        .map(|node| node.data.name.clone())
                        .collect();
                    assert_eq!(names, vec![format!("A {tag}"), format!("B {tag}")]);
                    observed += 1;
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let writer = {
        let manager = Arc::clone(&manager);
        let writing = Arc::clone(&writing);
        tokio::spawn(async move {
            for tag in 2..=40 {
                let generation = commit(&manager, pair(tag)).await.expect("commit");
                assert_eq!(generation, tag);
                tokio::task::yield_now().await;
            }
            writing.store(false, Ordering::Release);
        })
    };

    writer.await.expect("writer");
    for reader in readers {
        reader.await.expect("reader");
    }
    assert_eq!(manager.current_generation(DOC), 40);
}

#[tokio::test]
async fn background_sweeper_reclaims_revisions() {
    let config = CacheConfig {
        prune_mode: PruneMode::Background,
        sweep_interval: Duration::from_millis(10),
        collect_min_gen_delta: 0,
        ..Default::default()
    };
    let manager = manager_with(config, small_tree()).await;
    let sweeper = manager.spawn_sweeper().expect("sweeper");

    for name in ["A", "B", "C"] {
        commit(&manager, vec![Change::upsert(record(2, Some(1), 1, name))])
            .await
            .expect("commit");
    }

    let mut revisions = usize::MAX;
    for _ in 0..100 {
        revisions = manager.stats(DOC).store.revisions;
        if revisions == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(revisions, 3);

    drop(manager);
    tokio::time::timeout(Duration::from_secs(1), sweeper)
        .await
        .expect("sweeper exits")
        .expect("sweeper task");
}
