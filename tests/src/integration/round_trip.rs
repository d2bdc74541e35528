//! Successful calls through the full stack.

#[cfg(test)]
mod tests {
    use super::super::*;
    use rpc_broker::InMemoryBroker;
    use rpc_types::WORK_QUEUE;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sample_batch_is_doubled() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, cpu_kernel());
        let client = connect_client(&broker, quick_config(Duration::from_secs(30))).await;

        let result = client.call_default((1..=8).collect()).await.unwrap();
        assert_eq!(result, vec![2, 4, 6, 8, 10, 12, 14, 16]);

        assert_eq!(client.pending().pending_count(), 0);
        assert!(broker.queue_exists(WORK_QUEUE));
        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_large_batch_wraps_on_overflow() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, cpu_kernel());
        let client = connect_client(&broker, quick_config(Duration::from_secs(30))).await;

        let mut batch: Vec<i32> = (0..10_000).collect();
        batch.push(i32::MAX);
        batch.push(i32::MIN);
        let result = client.call_default(batch.clone()).await.unwrap();

        assert_eq!(result.len(), batch.len());
        assert_eq!(result[1234], 2468);
        assert_eq!(result[10_000], -2);
        assert_eq!(result[10_001], 0);

        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_never_cross() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, cpu_kernel());
        let client = Arc::new(connect_client(&broker, quick_config(Duration::from_secs(30))).await);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    let batch = vec![i, i + 1000, -i];
                    (i, client.call_default(batch).await)
                })
            })
            .collect();

        for handle in handles {
            let (i, result) = handle.await.unwrap();
            assert_eq!(result.unwrap(), vec![i * 2, (i + 1000) * 2, -i * 2]);
        }

        let stats = client.pending().stats();
        assert_eq!(stats.completed.load(Ordering::Relaxed), 50);
        assert_eq!(stats.unknown_replies.load(Ordering::Relaxed), 0);
        assert_eq!(worker.engine.stats().replied.load(Ordering::Relaxed), 50);

        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_get_their_own_replies() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, cpu_kernel());
        let alice = connect_client(&broker, quick_config(Duration::from_secs(30))).await;
        let bob = connect_client(&broker, quick_config(Duration::from_secs(30))).await;
        assert_ne!(alice.reply_queue(), bob.reply_queue());

        let (a, b) = tokio::join!(alice.call_default(vec![1, 1]), bob.call_default(vec![7]));
        assert_eq!(a.unwrap(), vec![2, 2]);
        assert_eq!(b.unwrap(), vec![14]);

        assert_eq!(alice.pending().stats().unknown_replies.load(Ordering::Relaxed), 0);
        assert_eq!(bob.pending().stats().unknown_replies.load(Ordering::Relaxed), 0);

        alice.close().await.unwrap();
        bob.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_competing_workers_share_the_queue() {
        let broker = InMemoryBroker::new();
        let first = spawn_worker(&broker, slow_kernel(Duration::from_millis(5)));
        let second = spawn_worker(&broker, slow_kernel(Duration::from_millis(5)));
        let client = Arc::new(connect_client(&broker, quick_config(Duration::from_secs(30))).await);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.call_default(vec![i]).await })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            seen.insert(handle.await.unwrap().unwrap()[0]);
        }
        assert_eq!(seen.len(), 20);

        let replied = first.engine.stats().replied.load(Ordering::Relaxed)
            + second.engine.stats().replied.load(Ordering::Relaxed);
        assert_eq!(replied, 20);

        client.close().await.unwrap();
        first.stop().await.unwrap();
        second.stop().await.unwrap();
    }
}
