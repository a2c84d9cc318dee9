//! Migration runs driven through the public library API.

mod common;

use common::{InMemoryBucket, make_config, read_ledger, run_pipeline, write_listing};
use s3mig_rs::{
    MigrationPipeline, PreserveHints, complete_retry_input, create_pipeline_cancellation_token,
    exit_code_from_error, prepare_retry_input,
};

#[tokio::test]
async fn migrates_listing_and_records_failures() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    source.put("2024/a.dat", b"aaaa");
    source.put("2024/c.dat", b"cc");
    write_listing(dir.path(), &["2024/a.dat", "2024/b.dat", "2024/c.dat"]);

    let result = run_pipeline(
        make_config(dir.path()),
        source.source(),
        target.destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;

    let stats = result.stats.unwrap();
    assert_eq!(stats.stats_migrated_objects, 2);
    assert_eq!(stats.stats_failed_objects, 1);
    assert_eq!(stats.stats_migrated_bytes, 6);
    assert_eq!(result.ledger.as_deref(), Some("2024/b.dat\n"));
    assert_eq!(target.keys(), vec!["2024/a.dat", "2024/c.dat"]);
}

#[tokio::test]
async fn provenance_reaches_the_destination() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    source.put("a", b"hello");
    write_listing(dir.path(), &["a"]);

    run_pipeline(
        make_config(dir.path()),
        source.source(),
        target.destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;

    let stored = target.get("a").unwrap();
    assert_eq!(stored.body, b"hello");
    assert_eq!(
        stored.content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(stored.hints, source.get("a").unwrap().hints);
    assert_ne!(stored.hints, PreserveHints::default());
}

#[tokio::test]
async fn source_prefix_is_replaced_by_target_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    source.put("tenant1/docs/x.pdf", b"x");
    write_listing(dir.path(), &["tenant1/docs/x.pdf"]);

    let result = run_pipeline(
        make_config(dir.path()),
        source.with_prefix("tenant1/").source(),
        target.with_prefix("migrated/").destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;

    assert_eq!(result.stats.unwrap().stats_migrated_objects, 1);
    assert_eq!(target.keys(), vec!["migrated/docs/x.pdf"]);
}

#[tokio::test]
async fn retry_pass_migrates_previous_failures() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    for key in ["k1", "k2", "k3", "k4"] {
        source.put(key, key.as_bytes());
    }
    source.make_unavailable("k2");
    source.make_unavailable("k4");
    write_listing(dir.path(), &["k1", "k2", "k3", "k4"]);

    let first = run_pipeline(
        make_config(dir.path()),
        source.source(),
        target.destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;
    assert_eq!(first.stats.unwrap().stats_failed_objects, 2);

    source.restore("k2");
    source.restore("k4");

    let retry_input = prepare_retry_input(dir.path()).await.unwrap();
    let mut failed = std::fs::read_to_string(&retry_input)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect::<Vec<_>>();
    failed.sort();
    assert_eq!(failed, vec!["k2", "k4"]);

    let second = run_pipeline(
        make_config(dir.path()),
        source.source(),
        target.destination(),
        &retry_input,
    )
    .await;

    let stats = second.stats.unwrap();
    assert_eq!(stats.stats_migrated_objects, 2);
    assert_eq!(stats.stats_failed_objects, 0);
    assert_eq!(second.ledger.as_deref(), Some(""));
    assert_eq!(target.keys(), vec!["k1", "k2", "k3", "k4"]);

    assert!(complete_retry_input(dir.path()).await.unwrap());
    assert!(!retry_input.exists());
}

#[tokio::test]
async fn dry_run_leaves_the_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    source.put("a", b"a");
    write_listing(dir.path(), &["a", "missing"]);

    let mut config = make_config(dir.path());
    config.dry_run = true;
    let result = run_pipeline(
        config,
        source.source(),
        target.destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;

    let stats = result.stats.unwrap();
    assert_eq!(stats.stats_migrated_objects, 1);
    assert_eq!(stats.stats_failed_objects, 1);
    assert_eq!(target.put_count(), 0);
    assert_eq!(result.ledger.as_deref(), Some("missing\n"));
}

#[tokio::test]
async fn store_failures_are_recorded_by_source_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    source.put("src/a", b"a");
    source.put("src/b", b"b");
    target.make_unavailable("dst/b");
    write_listing(dir.path(), &["src/a", "src/b"]);

    let result = run_pipeline(
        make_config(dir.path()),
        source.with_prefix("src/").source(),
        target.with_prefix("dst/").destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;

    assert_eq!(result.stats.unwrap().stats_failed_objects, 1);
    assert_eq!(result.ledger.as_deref(), Some("src/b\n"));
}

#[tokio::test]
async fn missing_listing_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let bucket = InMemoryBucket::new();

    let result = run_pipeline(
        make_config(dir.path()),
        bucket.source(),
        bucket.destination(),
        &dir.path().join("object_listing.txt"),
    )
    .await;

    assert_eq!(exit_code_from_error(&result.error.unwrap()), 2);
    assert!(result.ledger.is_none());
}

#[tokio::test]
async fn submitter_drives_a_started_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let source = InMemoryBucket::new();
    let target = InMemoryBucket::new();
    for i in 0..50 {
        source.put(&format!("obj{i:03}"), b"0123456789");
    }

    let mut pipeline = MigrationPipeline::with_storage(
        make_config(dir.path()),
        source.source(),
        target.destination(),
        create_pipeline_cancellation_token(),
    );
    let stats_receiver = pipeline.get_stats_receiver();
    pipeline.start(5).await.unwrap();

    let submitter = pipeline.submitter().unwrap();
    let producer = tokio::spawn(async move {
        for i in 0..50 {
            submitter.submit(format!("obj{i:03}")).await.unwrap();
        }
    });
    producer.await.unwrap();

    let stats = pipeline.finish().await.unwrap();
    assert_eq!(stats.stats_migrated_objects, 50);
    assert_eq!(stats.stats_migrated_bytes, 500);
    assert_eq!(target.put_count(), 50);
    assert_eq!(read_ledger(dir.path()).as_deref(), Some(""));

    // Bytes and completion events for every object.
    let mut events = 0;
    while stats_receiver.try_recv().is_ok() {
        events += 1;
    }
    assert_eq!(events, 100);
}
