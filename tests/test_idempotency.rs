//! Exactly-once execution per fingerprint over the database-backed store.

mod helpers;

use helpers::setup_test_db;
use oxicart::domain::errors::OrderFlowError;
use oxicart::services::IdempotencyGuard;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

#[tokio::test]
async fn concurrent_duplicates_execute_once() {
    let db = setup_test_db().await;
    let guard = IdempotencyGuard::new(Arc::new(db));
    let executions = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let guard = guard.clone();
        let executions = executions.clone();
        tasks.push(tokio::spawn(async move {
            guard
                .execute("fp-shared", "payload-1", TTL, || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, OrderFlowError>("done".to_string())
                })
                .await
        }));
    }

    let mut fresh = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(resolution) => {
                assert_eq!(resolution.value, "done");
                if !resolution.replayed {
                    fresh += 1;
                }
            }
            Err(OrderFlowError::DuplicateInFlight) => rejected += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    // Exactly one task ran the operation; the others were either told to
    // retry or replayed the finished result.
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(fresh, 1);
    assert!(rejected <= 3);
}

#[tokio::test]
async fn completed_outcome_replays_from_the_database() {
    let db = setup_test_db().await;
    let guard = IdempotencyGuard::new(Arc::new(db));

    let first = guard
        .execute("fp-replay", "payload-1", TTL, || async {
            Ok::<_, OrderFlowError>(42i64)
        })
        .await
        .unwrap();
    assert!(!first.replayed);

    let second = guard
        .execute("fp-replay", "payload-1", TTL, || async {
            panic!("must not re-execute");
            #[allow(unreachable_code)]
            Ok::<i64, OrderFlowError>(0)
        })
        .await
        .unwrap();

    assert!(second.replayed);
    assert_eq!(second.value, 42);
}

#[tokio::test]
async fn distinct_fingerprints_are_independent() {
    let db = setup_test_db().await;
    let guard = IdempotencyGuard::new(Arc::new(db));
    let executions = AtomicUsize::new(0);

    for fp in ["fp-a", "fp-b"] {
        let resolution = guard
            .execute(fp, "payload-1", TTL, || async {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OrderFlowError>(fp.to_string())
            })
            .await
            .unwrap();
        assert!(!resolution.replayed);
    }

    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn expired_record_allows_fresh_execution() {
    let db = setup_test_db().await;
    let guard = IdempotencyGuard::new(Arc::new(db));
    let ttl = Duration::from_millis(80);

    let first = guard
        .execute("fp-ttl", "payload-1", ttl, || async {
            Ok::<_, OrderFlowError>("first".to_string())
        })
        .await
        .unwrap();
    assert!(!first.replayed);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let second = guard
        .execute("fp-ttl", "payload-1", ttl, || async {
            Ok::<_, OrderFlowError>("second".to_string())
        })
        .await
        .unwrap();
    assert!(!second.replayed);
    assert_eq!(second.value, "second");
}
