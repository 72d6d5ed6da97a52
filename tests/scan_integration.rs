//! End-to-end scan behavior: incremental updates, deletions, healing, and
//! dimension changes, all against the offline embedder.

mod common;

use common::{assert_store_paths, harness, harness_with_dimensions};
use contextweaver::store::KV_EMBEDDING_DIMENSIONS;

#[tokio::test]
async fn scan_of_trivial_repo() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.write("b.py", "");

    let stats = h.scan().await;
    assert_eq!(stats.added, 2);
    assert_eq!(stats.modified, 0);
    assert_eq!(stats.unchanged, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.errors, 0);

    let indexer = h.indexer();
    // The vector store holds exactly a.py's chunks
    assert_store_paths(&indexer, &["a.py"]);
    assert!(indexer.vectors().count() >= 1);

    // The empty file is consistent without chunks
    let b = indexer.metadata().get("b.py").unwrap();
    assert_eq!(b.vector_index_hash.as_deref(), Some(b.content_hash.as_str()));
    assert!(!b.is_dirty());
}

#[tokio::test]
async fn rescan_unchanged_repo_is_a_noop() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.write("b.py", "def g():\n    return 2\n");
    h.scan().await;

    let stats = h.scan().await;
    assert_eq!(stats.added, 0);
    assert_eq!(stats.modified, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(stats.vector_index.indexed, 0);
}

#[tokio::test]
async fn incremental_rename_moves_chunks() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.scan().await;

    let old_ids: Vec<String> = h
        .indexer()
        .vectors()
        .chunks_for_file("a.py")
        .iter()
        .map(|c| c.chunk_id.clone())
        .collect();
    assert!(!old_ids.is_empty());

    h.rename("a.py", "c.py");
    let stats = h.scan().await;
    assert_eq!(stats.added, 1);
    assert_eq!(stats.deleted, 1);

    let indexer = h.indexer();
    assert_store_paths(&indexer, &["c.py"]);
    for id in old_ids {
        assert!(indexer.vectors().get(&id).is_none(), "stale id {id} remains");
    }
    assert!(!indexer.vectors().chunks_for_file("c.py").is_empty());
}

#[tokio::test]
async fn deleting_a_file_clears_both_stores_in_one_scan() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.write("keep.py", "def keep():\n    return 0\n");
    h.scan().await;

    h.remove("a.py");
    let stats = h.scan().await;
    assert_eq!(stats.deleted, 1);
    assert!(stats.vector_index.deleted >= 1);

    let indexer = h.indexer();
    assert_store_paths(&indexer, &["keep.py"]);
    assert!(indexer.metadata().get("a.py").is_none());
    let hits = indexer
        .fts()
        .search(&["return".to_string()], &[], 5, 30)
        .unwrap();
    assert!(hits.iter().all(|hit| hit.relative_path != "a.py"));
}

#[tokio::test]
async fn modified_file_replaces_its_chunk_set() {
    let h = harness();
    h.write("a.py", "def old_name():\n    return 1\n");
    h.scan().await;

    h.write("a.py", "def new_name():\n    return 2\n");
    let stats = h.scan().await;
    assert_eq!(stats.modified, 1);
    assert_eq!(stats.added, 0);

    let indexer = h.indexer();
    let chunks = indexer.vectors().chunks_for_file("a.py");
    assert!(chunks.iter().all(|c| c.display_code.contains("new_name")));
    // Chunk indexes stay contiguous from zero
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.chunk_index as usize, i);
    }
}

#[tokio::test]
async fn file_emptied_in_place_drops_its_rows() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.scan().await;
    assert_eq!(h.indexer().vectors().count() > 0, true);

    h.write("a.py", "");
    let stats = h.scan().await;
    assert_eq!(stats.modified, 1);

    let indexer = h.indexer();
    assert!(indexer.vectors().chunks_for_file("a.py").is_empty());
    let record = indexer.metadata().get("a.py").unwrap();
    assert!(!record.is_dirty());
}

#[tokio::test]
async fn self_healing_reindexes_stale_unchanged_file() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.scan().await;

    // Simulate a crash between the vector write and the metadata update.
    // The indexer is dropped before rescanning: the FTS writer is exclusive.
    {
        let indexer = h.indexer();
        indexer
            .metadata()
            .set_vector_index_hash("a.py", None)
            .unwrap();
    }

    let stats = h.scan().await;
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.vector_index.indexed, 1, "stale file must be rewritten");

    let record = h.indexer().metadata().get("a.py").unwrap();
    assert!(!record.is_dirty());
}

#[tokio::test]
async fn dimension_change_triggers_a_single_full_reindex() {
    let h = harness_with_dimensions(64);
    h.write("a.py", "def f():\n    return 1\n");
    h.write("b.py", "def g():\n    return 2\n");
    h.scan().await;

    // Same repository and state, new configured width
    let h2 = harness_with_dimensions(32);
    let narrow = common::Harness {
        repo: h.repo,
        state: h.state,
        settings: h2.settings,
    };

    let stats = narrow.scan().await;
    assert_eq!(stats.added, 2, "every file reindexes after the change");

    let chunk_total = {
        let indexer = narrow.indexer();
        assert_eq!(
            indexer
                .metadata()
                .kv_get(KV_EMBEDDING_DIMENSIONS)
                .as_deref(),
            Some("32")
        );
        let total = indexer.vectors().count();
        assert!(total >= 2);
        total
    };

    // A further rescan must not rebuild again
    let again = narrow.scan().await;
    assert_eq!(again.added, 0);
    assert_eq!(again.unchanged, 2);
    assert_eq!(narrow.indexer().vectors().count(), chunk_total);
}

#[tokio::test]
async fn force_scan_rebuilds_from_scratch() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");
    h.scan().await;

    let indexer = h.indexer();
    let stats = indexer
        .scan(contextweaver::indexing::ScanOptions {
            force: true,
            vector_index: true,
            progress: None,
        })
        .await
        .unwrap();
    assert_eq!(stats.added, 1);
    assert_eq!(stats.vector_index.indexed, 1);
}

#[tokio::test]
async fn excluded_paths_never_enter_the_index() {
    let h = harness();
    h.write("src/app.py", "def app():\n    return 1\n");
    h.write("node_modules/dep/index.js", "module.exports = 1;\n");
    h.write("image.png", "not really an image");

    let stats = h.scan().await;
    assert_eq!(stats.added, 1);
    assert_store_paths(&h.indexer(), &["src/app.py"]);
}

#[tokio::test]
async fn scan_progress_events_are_emitted() {
    let h = harness();
    h.write("a.py", "def f():\n    return 1\n");

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let stats = h
        .indexer()
        .scan(contextweaver::indexing::ScanOptions {
            force: false,
            vector_index: true,
            progress: Some(tx),
        })
        .await
        .unwrap();
    assert_eq!(stats.vector_index.indexed, 1);

    let event = rx.recv().await.expect("at least one progress event");
    assert!(event.completed_batches >= 1);
    assert_eq!(event.completed_batches, event.total_batches);
}
