use crate::model::Sample;
use tokio::sync::mpsc;

/// Bounded; a full channel makes senders wait
pub fn result_channel(capacity: usize) -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ResultSender { tx }, ResultReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<Sample>,
}

impl ResultSender {
    /// Wait for a slot and enqueue. Fails only when the aggregator is gone.
    pub async fn send(&self, sample: Sample) -> Result<(), Sample> {
        self.tx.send(sample).await.map_err(|e| e.0)
    }

    /// Samples currently queued or reserved
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::Receiver<Sample>,
}

impl ResultReceiver {
    /// Next sample in arrival order; `None` once every sender is dropped
    /// and the queue is empty
    pub async fn recv(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
