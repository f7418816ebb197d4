//! C4: bounded FIFO handoff from the Poller to the Worker pool (§4.4). A
//! thin wrapper over `tokio::sync::mpsc` rather than a bare channel so the
//! capacity and the producer/consumer split are named at the call site, the
//! way the reference service wraps its `mpsc::channel` pairs inside
//! `LongPoller`/`GameStacks` instead of passing raw senders around.

use tokio::sync::mpsc;

use crate::messaging::Update;

pub const DEFAULT_CAPACITY: usize = 256;

pub fn channel(capacity: usize) -> (UpdateQueueSender, UpdateQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (UpdateQueueSender { tx }, UpdateQueueReceiver { rx })
}

#[derive(Clone)]
pub struct UpdateQueueSender {
    tx: mpsc::Sender<Update>,
}

impl UpdateQueueSender {
    pub async fn enqueue(&self, update: Update) -> Result<(), Update> {
        self.tx.send(update).await.map_err(|e| e.0)
    }
}

pub struct UpdateQueueReceiver {
    rx: mpsc::Receiver<Update>,
}

impl UpdateQueueReceiver {
    /// `None` once every sender has dropped and the queue is drained — the
    /// signal a Worker uses to stop (§4.5: "stopped AND the queue is empty").
    pub async fn dequeue(&mut self) -> Option<Update> {
        self.rx.recv().await
    }
}
