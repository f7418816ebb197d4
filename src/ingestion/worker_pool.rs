//! C5: `W` cooperative consumer tasks pulling from the `UpdateQueue` and
//! invoking the Router (§4.5). Worker failures are logged and swallowed —
//! they never terminate the pool, the same "log and move on" discipline the
//! reference service applies to per-message send failures in `LongPoller`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::full_info;
use crate::ingestion::rate_limiter::RateLimiter;
use crate::messaging::Update;

use super::queue::UpdateQueueReceiver;

/// What a Worker hands each dequeued update to. Implemented by the Router in
/// production, and by a recording stub in tests.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, update: Update);
}

pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Spawns `worker_count` tasks sharing one receiver end of the queue. Each
/// worker rate-limits on `from_id` before dispatching (§4.6). Workers drain
/// the queue after the queue's sender side closes (Poller has stopped),
/// matching `is_running or not queue.empty()` in the reference design.
pub fn spawn<D: Dispatcher + 'static>(
    worker_count: usize,
    receiver: UpdateQueueReceiver,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Arc<D>,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));
    (0..worker_count)
        .map(|idx| {
            let receiver = receiver.clone();
            let rate_limiter = rate_limiter.clone();
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { worker_loop(idx, receiver, rate_limiter, dispatcher).await })
        })
        .collect()
}

async fn worker_loop<D: Dispatcher + 'static>(
    worker_id: usize,
    receiver: Arc<Mutex<UpdateQueueReceiver>>,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Arc<D>,
) {
    loop {
        let update = {
            let mut guard = receiver.lock().await;
            guard.dequeue().await
        };
        let update = match update {
            Some(u) => u,
            None => {
                full_info!("worker {}: queue closed and drained, exiting", worker_id);
                return;
            }
        };

        rate_limiter.acquire(update.message.from_id).await;
        dispatcher.dispatch(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::queue;
    use tokio::sync::Mutex as TokioMutex;

    struct RecordingDispatcher {
        seen: TokioMutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch(&self, update: Update) {
            self.seen.lock().await.push(update.message.from_id);
        }
    }

    fn sample_update(from_id: i64) -> Update {
        Update {
            update_type: "message_new".into(),
            message: crate::messaging::UpdateMessage {
                from_id,
                text: "hi".into(),
                id: 0,
                peer_id: 1,
            },
        }
    }

    #[tokio::test]
    async fn workers_drain_the_queue_after_sender_drops() {
        let (tx, rx) = queue::channel(8);
        let dispatcher = Arc::new(RecordingDispatcher {
            seen: TokioMutex::new(Vec::new()),
        });
        let rate_limiter = RateLimiter::new();

        for i in 0..5 {
            tx.enqueue(sample_update(i)).await.unwrap();
        }
        drop(tx);

        let handles = spawn(2, rx, rate_limiter, dispatcher.clone());
        for h in handles {
            h.await.unwrap();
        }

        let mut seen = dispatcher.seen.lock().await.clone();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
