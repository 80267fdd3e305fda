//! Concurrency tests for the request deduplicator.

use std::sync::{Arc, Barrier};
use std::time::Duration;
use switchyard::config::DedupConfig;
use switchyard::dedup::Deduplicator;

#[test]
fn concurrent_is_duplicate_has_exactly_one_owner() {
    for round in 0..20 {
        let dedup: Arc<Deduplicator<String>> = Arc::new(Deduplicator::new(&DedupConfig::default()));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let dedup = dedup.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    dedup.is_duplicate(&format!("content {}", round))
                })
            })
            .collect();

        let owners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|duplicate| !duplicate)
            .count();
        assert_eq!(owners, 1, "round {}", round);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_waiter_receives_owner_result() {
    let dedup: Arc<Deduplicator<String>> = Arc::new(Deduplicator::new(&DedupConfig::default()));
    assert!(!dedup.is_duplicate("prompt"));

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                assert!(dedup.is_duplicate("prompt"));
                dedup.wait_for_result("prompt", Duration::from_secs(5)).await
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    dedup.store_result("prompt", "result".to_string());

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Some("result".to_string()));
    }
    let stats = dedup.stats();
    assert_eq!(stats.owners, 1);
    assert_eq!(stats.waiters, 10);
}

#[tokio::test]
async fn distinct_content_is_never_collapsed() {
    let dedup: Deduplicator<u32> = Deduplicator::new(&DedupConfig::default());
    for i in 0..100 {
        assert!(!dedup.is_duplicate(&format!("prompt {}", i)));
    }
    assert_eq!(dedup.len(), 100);
}
