//! C3: single producer task. Repeatedly long-polls, parses updates, enqueues
//! them (§4.3). Stops on a cancellation signal: the in-flight poll is
//! aborted via `tokio::select!`, the task exits, and the queue is left for
//! Workers to drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::errors::GameError;
use crate::full_info;
use crate::messaging::MessagingClient;

use super::queue::UpdateQueueSender;

const TRANSPORT_BACKOFF: Duration = Duration::from_secs(1);

pub struct Poller<C: MessagingClient> {
    client: Arc<C>,
    queue: UpdateQueueSender,
}

impl<C: MessagingClient + 'static> Poller<C> {
    pub fn new(client: Arc<C>, queue: UpdateQueueSender) -> Self {
        Poller { client, queue }
    }

    /// Runs until `shutdown` fires. Returns control to the caller once the
    /// in-flight long-poll (if any) has been abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // §4.3/§7: a `ProtocolError` re-handshakes once for free (the next
        // `long_poll` call re-handshakes on its own since the session was
        // cleared); only once that immediate retry has *also* failed do we
        // back off, so a persistently bad token/group id can't busy-loop
        // `groups.getLongPollServer`.
        let mut just_rehandshaked = false;

        loop {
            if *shutdown.borrow() {
                return;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    full_info!("poller: shutdown signal received, exiting");
                    return;
                }
                result = self.client.long_poll() => {
                    match result {
                        Ok((updates, _new_ts)) => {
                            just_rehandshaked = false;
                            for update in updates {
                                if self.queue.enqueue(update).await.is_err() {
                                    full_info!("poller: update queue closed, exiting");
                                    return;
                                }
                            }
                        }
                        Err(GameError::TransportError(msg)) => {
                            full_info!("poller: transport error, backing off: {}", msg);
                            tokio::time::sleep(TRANSPORT_BACKOFF).await;
                        }
                        Err(GameError::ProtocolError(msg)) => {
                            if just_rehandshaked {
                                full_info!("poller: protocol error persists after re-handshake, backing off: {}", msg);
                                tokio::time::sleep(TRANSPORT_BACKOFF).await;
                                just_rehandshaked = false;
                            } else {
                                full_info!("poller: protocol error, re-handshaking: {}", msg);
                                just_rehandshaked = true;
                            }
                        }
                        Err(other) => {
                            just_rehandshaked = false;
                            full_info!("poller: unexpected error, backing off: {}", other);
                            tokio::time::sleep(TRANSPORT_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::queue;
    use crate::messaging::fake::FakeMessagingClient;
    use crate::messaging::Update;
    use std::time::Instant;
    use tokio::sync::Mutex as TokioMutex;

    #[tokio::test]
    async fn stops_promptly_on_shutdown_signal() {
        let client = Arc::new(FakeMessagingClient::new(vec![]));
        let (tx, _rx) = queue::channel(8);
        let poller = Poller::new(client, tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();
        poller.run(shutdown_rx).await;
    }

    /// Scripted `long_poll`: replays a fixed sequence of results, repeating
    /// the last one once exhausted, and timestamps every call so the test
    /// can assert on the gap between the immediate re-handshake retry and
    /// the backed-off retry after it.
    struct ScriptedClient {
        results: Vec<Result<(Vec<Update>, i64), GameError>>,
        call_times: TokioMutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl MessagingClient for ScriptedClient {
        async fn long_poll(&self) -> Result<(Vec<Update>, i64), GameError> {
            let mut times = self.call_times.lock().await;
            let idx = times.len().min(self.results.len() - 1);
            times.push(Instant::now());
            self.results[idx].clone()
        }

        async fn send_message(&self, _chat_id: i64, _text: &str, _keyboard: crate::messaging::Keyboard) -> Result<(), GameError> {
            Ok(())
        }

        async fn fetch_members(&self, _peer_id: i64) -> Result<Vec<crate::domain::User>, GameError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn protocol_error_retries_once_immediately_then_backs_off() {
        let client = Arc::new(ScriptedClient {
            results: vec![
                Err(GameError::ProtocolError("first".into())),
                Err(GameError::ProtocolError("second".into())),
                Err(GameError::ProtocolError("third".into())),
            ],
            call_times: TokioMutex::new(Vec::new()),
        });
        let (tx, _rx) = queue::channel(8);
        let poller = Poller::new(client.clone(), tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(poller.run(shutdown_rx));
        // First call fails, retried immediately (no sleep). Second call
        // fails again, this time we back off. Give the loop time to reach
        // the third call (which would only happen after the backoff sleep)
        // before shutting down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let times_before_backoff = client.call_times.lock().await.len();
        assert_eq!(times_before_backoff, 2, "second call should have happened promptly, third should still be sleeping");

        tokio::time::sleep(TRANSPORT_BACKOFF + Duration::from_millis(200)).await;
        let _ = shutdown_tx.send(true);
        let _ = handle.await;

        let times = client.call_times.lock().await.clone();
        assert!(times.len() >= 3);
        // Call 1 -> 2 is the immediate re-handshake retry: near-zero gap.
        assert!(times[1].duration_since(times[0]) < Duration::from_millis(50));
        // Call 2 -> 3 is the backed-off retry: at least TRANSPORT_BACKOFF.
        assert!(times[2].duration_since(times[1]) >= TRANSPORT_BACKOFF);
    }
}
