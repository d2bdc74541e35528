//! Calls that end without a result: deadlines, dropped requests, lost broker.
//!
//! The worker never sends error replies, so every worker-side failure is
//! observed by the caller as `ClientError::Timeout`.

#[cfg(test)]
mod tests {
    use super::super::*;
    use rpc_broker::InMemoryBroker;
    use rpc_client::ClientError;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_worker_times_out() {
        let broker = InMemoryBroker::new();
        let client = connect_client(&broker, quick_config(Duration::from_millis(100))).await;

        let err = client.call_default(vec![1, 2, 3]).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending().pending_count(), 0);
        assert_eq!(client.pending().expired_count(), 1);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_payload_times_out_and_worker_keeps_serving() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, cpu_kernel());
        let client = connect_client(&broker, quick_config(Duration::from_millis(200))).await;

        let err = client.call_default(vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));

        let ok = client.call(vec![3], Duration::from_secs(10)).await.unwrap();
        assert_eq!(ok, vec![6]);
        assert_eq!(worker.engine.stats().malformed.load(Ordering::Relaxed), 1);

        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_kernel_times_out() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, poisoned_kernel(13));
        let client = connect_client(&broker, quick_config(Duration::from_millis(200))).await;

        let err = client.call_default(vec![1, 13, 2]).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(worker.engine.stats().kernel_failures.load(Ordering::Relaxed), 1);

        // Dropped, not requeued.
        assert_eq!(broker.queue_depth(rpc_types::WORK_QUEUE), Some(0));
        assert_eq!(broker.unacked_count(), 0);

        let ok = client.call(vec![1, 2], Duration::from_secs(10)).await.unwrap();
        assert_eq!(ok, vec![2, 4]);

        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_late_reply_is_discarded() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, slow_kernel(Duration::from_millis(300)));
        let client = connect_client(&broker, quick_config(Duration::from_millis(50))).await;

        let err = client.call_default(vec![5]).await.unwrap_err();
        let ClientError::Timeout { correlation_id, .. } = &err else {
            panic!("expected timeout, got {err:?}");
        };

        // The worker still answers; the reply lands after the deadline.
        let stats = client.pending().stats();
        assert!(eventually(|| stats.late_replies.load(Ordering::Relaxed) == 1).await);
        assert!(!client.pending().is_pending(correlation_id));
        assert_eq!(client.pending().pending_count(), 0);
        assert_eq!(stats.unknown_replies.load(Ordering::Relaxed), 0);
        assert_eq!(worker.engine.stats().replied.load(Ordering::Relaxed), 1);

        // The next call is unaffected by the stale reply.
        let ok = client.call(vec![6], Duration::from_secs(10)).await.unwrap();
        assert_eq!(ok, vec![12]);

        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_cache_stays_bounded() {
        let broker = InMemoryBroker::new();
        let mut config = quick_config(Duration::from_millis(10));
        config.expired_capacity = 3;
        let client = connect_client(&broker, config).await;

        for i in 0..10 {
            assert!(client.call_default(vec![i]).await.unwrap_err().is_timeout());
        }
        assert_eq!(client.pending().expired_count(), 3);
        assert_eq!(client.pending().pending_count(), 0);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_shutdown_fails_waiting_calls() {
        let broker = InMemoryBroker::new();
        let client = Arc::new(connect_client(&broker, quick_config(Duration::from_secs(30))).await);

        let waiting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call_default(vec![1]).await })
        };
        assert!(eventually(|| client.pending().pending_count() == 1).await);

        broker.shutdown();
        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.pending().pending_count(), 0);

        // Later calls cannot even publish.
        assert!(matches!(
            client.call_default(vec![2]).await,
            Err(ClientError::Transport(_))
        ));
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_when_broker_goes_away() {
        let broker = InMemoryBroker::new();
        let worker = spawn_worker(&broker, cpu_kernel());
        assert!(eventually(|| broker.queue_exists(rpc_types::WORK_QUEUE)).await);

        broker.shutdown();
        assert!(worker.join().await.is_err());
    }
}
