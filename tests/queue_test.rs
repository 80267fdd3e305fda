//! Integration tests for the priority request queue
//!
//! Exercises producers and consumers on separate tasks, and checks the
//! dequeue order for arbitrary admission sequences.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use switchyard::config::{OverflowPolicy, QueueConfig};
use switchyard::queue::{QueueError, RequestQueue};
use tokio::sync::oneshot;

fn config(max_size: u32) -> QueueConfig {
    QueueConfig {
        enabled: true,
        max_size,
        max_wait_seconds: 30,
        overflow: OverflowPolicy::Reject,
    }
}

#[tokio::test]
async fn priority_nine_served_before_priority_five() {
    let queue: RequestQueue<&str> = RequestQueue::new(config(10));
    queue.enqueue("normal", 5, None).await.unwrap();
    queue.enqueue("urgent", 9, None).await.unwrap();

    let first = queue.dequeue(Duration::from_millis(10)).await.unwrap();
    assert_eq!(first.payload, "urgent");
    assert_eq!(first.priority, 9);
}

#[tokio::test]
async fn accepts_up_to_capacity_and_rejects_overflow() {
    let capacity = 5u32;
    let queue: RequestQueue<u32, u32> = RequestQueue::new(config(capacity));

    let mut receivers = Vec::new();
    for i in 0..capacity {
        let (tx, rx) = oneshot::channel();
        queue.enqueue(i, 0, Some(tx)).await.unwrap();
        receivers.push(rx);
    }
    assert_eq!(queue.size(), capacity as usize);

    let (tx, _rx) = oneshot::channel();
    assert_eq!(
        queue.enqueue(99, 0, Some(tx)).await,
        Err(QueueError::Full { max_size: capacity })
    );

    // Consumer answers each item with its payload doubled
    while let Some(mut item) = queue.try_dequeue() {
        let value = item.payload * 2;
        item.complete(value);
    }
    for (i, rx) in receivers.into_iter().enumerate() {
        assert_eq!(rx.await.unwrap(), i as u32 * 2);
    }
}

#[tokio::test]
async fn consumer_task_drains_concurrent_producers() {
    let queue: Arc<RequestQueue<usize, usize>> = Arc::new(RequestQueue::new(config(100)));

    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut served = 0;
            while let Some(mut item) = queue.dequeue(Duration::from_millis(200)).await {
                let payload = item.payload;
                item.complete(payload);
                served += 1;
            }
            served
        })
    };

    let producers: Vec<_> = (0..20)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let (tx, rx) = oneshot::channel();
                queue.enqueue(i, (i % 3) as i32, Some(tx)).await.unwrap();
                rx.await.unwrap()
            })
        })
        .collect();

    for (i, producer) in producers.into_iter().enumerate() {
        assert_eq!(producer.await.unwrap(), i);
    }
    assert_eq!(consumer.await.unwrap(), 20);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn cancelled_item_frees_space_for_blocked_producer() {
    let queue: Arc<RequestQueue<&str>> = Arc::new(RequestQueue::new(QueueConfig {
        overflow: OverflowPolicy::Block,
        max_wait_seconds: 5,
        ..config(1)
    }));
    let id = queue.try_enqueue("stale", 0, None).unwrap();

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue("fresh", 0, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(queue.cancel(id).is_some());
    producer.await.unwrap().unwrap();
    assert_eq!(queue.try_dequeue().unwrap().payload, "fresh");
}

proptest! {
    #[test]
    fn dequeue_order_is_priority_then_admission(priorities in proptest::collection::vec(-5i32..5, 1..40)) {
        let queue: RequestQueue<usize> = RequestQueue::new(config(100));
        for (seq, priority) in priorities.iter().enumerate() {
            queue.try_enqueue(seq, *priority, None).unwrap();
        }

        let order: Vec<usize> = queue.drain().into_iter().map(|item| item.payload).collect();

        let mut expected: Vec<usize> = (0..priorities.len()).collect();
        expected.sort_by(|a, b| priorities[*b].cmp(&priorities[*a]).then(a.cmp(b)));
        prop_assert_eq!(order, expected);
    }
}
