//! Session lifecycle: the private reply queue and at-least-once delivery of
//! requests.

#[cfg(test)]
mod tests {
    use super::super::*;
    use rpc_broker::{
        AckMode, InMemoryBroker, QueueOptions, Transport, TransportError, GENERATED_QUEUE_PREFIX,
    };
    use rpc_client::ClientError;
    use rpc_types::{RequestEnvelope, WORK_QUEUE};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reply_queue_is_private_and_removed_on_close() {
        let broker = InMemoryBroker::new();
        let client = connect_client(&broker, quick_config(Duration::from_secs(1))).await;
        let reply_queue = client.reply_queue().to_string();
        assert!(reply_queue.starts_with(GENERATED_QUEUE_PREFIX));
        assert!(broker.queue_exists(&reply_queue));

        // Nobody else may consume or delete it.
        let intruder = broker.connect().unwrap();
        assert!(intruder.consume(&reply_queue, AckMode::Auto).await.is_err());
        assert_eq!(
            intruder.delete_queue(&reply_queue).await,
            Err(TransportError::ResourceLocked(reply_queue.clone()))
        );
        assert!(broker.queue_exists(&reply_queue));
        // The session survives the attempt: no worker, so the call times out
        // instead of failing on a dead listener.
        assert!(client.call_default(vec![1]).await.unwrap_err().is_timeout());

        client.close().await.unwrap();
        assert!(!broker.queue_exists(&reply_queue));
        assert!(client.is_closed());
        assert_eq!(
            client.call_default(vec![1]).await,
            Err(ClientError::Closed)
        );
        // Idempotent.
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_session_removes_reply_queue() {
        let broker = InMemoryBroker::new();
        let reply_queue = {
            let client = connect_client(&broker, quick_config(Duration::from_secs(1))).await;
            client.reply_queue().to_string()
        };
        assert!(eventually(|| !broker.queue_exists(&reply_queue)).await);
        assert!(broker.queue_exists(WORK_QUEUE));
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_calls() {
        let broker = InMemoryBroker::new();
        let client = Arc::new(connect_client(&broker, quick_config(Duration::from_secs(30))).await);

        let waiting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call_default(vec![1]).await })
        };
        assert!(eventually(|| client.pending().pending_count() == 1).await);

        client.close().await.unwrap();
        assert_eq!(waiting.await.unwrap(), Err(ClientError::Closed));
    }

    #[tokio::test]
    async fn test_request_redelivered_after_worker_crash() {
        let broker = InMemoryBroker::new();
        let client = Arc::new(connect_client(&broker, quick_config(Duration::from_secs(30))).await);

        // A worker that takes the request and dies before acknowledging it.
        let crashed = broker.connect().unwrap();
        crashed
            .declare_queue(WORK_QUEUE, QueueOptions::transient())
            .await
            .unwrap();
        let mut consumer = crashed.consume(WORK_QUEUE, AckMode::Manual).await.unwrap();

        let waiting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call_default(vec![4, 5]).await })
        };
        let taken = consumer.recv().await.unwrap();
        let request = RequestEnvelope::from_message(&taken.message).unwrap();
        assert_eq!(request.payload, vec![4, 5]);
        assert_eq!(broker.unacked_count(), 1);

        drop(taken);
        drop(consumer);
        crashed.close().await.unwrap();
        assert_eq!(broker.unacked_count(), 0);
        assert_eq!(broker.queue_depth(WORK_QUEUE), Some(1));

        // A healthy worker picks the request up again and the call completes.
        let worker = spawn_worker(&broker, cpu_kernel());
        assert_eq!(waiting.await.unwrap().unwrap(), vec![8, 10]);
        assert_eq!(worker.engine.stats().replied.load(Ordering::Relaxed), 1);

        client.close().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_for_closed_session_is_acknowledged() {
        let broker = InMemoryBroker::new();
        let client = connect_client(&broker, quick_config(Duration::from_millis(20))).await;

        // Queue a request, then give up on it before any worker exists.
        assert!(client.call_default(vec![9]).await.unwrap_err().is_timeout());
        client.close().await.unwrap();

        // The worker still answers into the vanished queue and moves on.
        let worker = spawn_worker(&broker, cpu_kernel());
        let stats = &worker.engine.stats().replied;
        assert!(eventually(|| stats.load(Ordering::Relaxed) == 1).await);
        assert_eq!(broker.queue_depth(WORK_QUEUE), Some(0));
        assert_eq!(broker.unacked_count(), 0);
        worker.stop().await.unwrap();
    }
}
