//! Change feed between the storage layer and the snapshot service.
//!
//! A bounded tokio channel. The storage layer publishes one [`ChangeEvent`]
//! per committed transaction and kind; the service drains them in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::changes::ChangeBatch;

use super::error::ServiceError;

/// A change batch with delivery metadata.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub id: Uuid,
    /// Publication order within this process.
    pub sequence: u64,
    pub batch: ChangeBatch,
    pub published_at: OffsetDateTime,
}

/// Creates a feed whose channel holds at most `capacity` pending events.
pub fn change_feed(capacity: usize) -> (ChangePublisher, ChangeFeed) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        ChangePublisher {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        },
        ChangeFeed { receiver },
    )
}

#[derive(Debug, Clone)]
pub struct ChangePublisher {
    sender: mpsc::Sender<ChangeEvent>,
    sequence: Arc<AtomicU64>,
}

impl ChangePublisher {
    fn envelope(&self, batch: ChangeBatch) -> ChangeEvent {
        ChangeEvent {
            id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            batch,
            published_at: OffsetDateTime::now_utc(),
        }
    }

    /// Publishes a batch, waiting for room when the channel is full.
    pub async fn publish(&self, batch: ChangeBatch) -> Result<(), ServiceError> {
        let event = self.envelope(batch);
        info!(
            event_id = %event.id,
            sequence = event.sequence,
            kind = %event.batch.kind,
            changes = event.batch.changes.len(),
            "Change batch published"
        );
        self.sender
            .send(event)
            .await
            .map_err(|_| ServiceError::FeedClosed)
    }

    /// Publishes without waiting; a full channel hands the batch back.
    pub fn try_publish(&self, batch: ChangeBatch) -> Result<(), TryPublishError> {
        let event = self.envelope(batch);
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!(
                    sequence = event.sequence,
                    kind = %event.batch.kind,
                    "Change feed full"
                );
                Err(TryPublishError::Full(event.batch))
            }
            Err(TrySendError::Closed(event)) => Err(TryPublishError::Closed(event.batch)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug)]
pub enum TryPublishError {
    Full(ChangeBatch),
    Closed(ChangeBatch),
}

#[derive(Debug)]
pub struct ChangeFeed {
    receiver: mpsc::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    /// Waits for at least one event and returns up to `limit` in FIFO order.
    ///
    /// An empty result means every publisher is gone.
    pub async fn recv_batch(&mut self, limit: usize) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(limit.min(64));
        self.receiver.recv_many(&mut events, limit.max(1)).await;
        events
    }

    /// Takes up to `limit` events that are already queued, without waiting.
    pub fn drain_ready(&mut self, limit: usize) -> Result<Vec<ChangeEvent>, ServiceError> {
        let mut events = Vec::new();
        while events.len() < limit {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) if events.is_empty() => {
                    return Err(ServiceError::FeedClosed);
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(events)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{changes::Change, types::ContentKind};

    fn batch(id: i32) -> ChangeBatch {
        ChangeBatch::new(ContentKind::Document, vec![Change::remove(id)])
    }

    #[tokio::test]
    async fn events_arrive_in_publication_order() {
        let (publisher, mut feed) = change_feed(8);
        publisher.publish(batch(1)).await.expect("publish");
        publisher.publish(batch(2)).await.expect("publish");

        let events = feed.recv_batch(10).await;
        let sequences: Vec<_> = events.iter().map(|event| event.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(events[1].batch, batch(2));
    }

    #[tokio::test]
    async fn recv_batch_respects_limit() {
        let (publisher, mut feed) = change_feed(8);
        for id in 0..5 {
            publisher.publish(batch(id)).await.expect("publish");
        }
        assert_eq!(feed.recv_batch(3).await.len(), 3);
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn try_publish_hands_back_batch_when_full() {
        let (publisher, mut feed) = change_feed(1);
        publisher.try_publish(batch(1)).expect("first fits");
        match publisher.try_publish(batch(2)) {
            Err(TryPublishError::Full(returned)) => assert_eq!(returned, batch(2)),
            other => panic!("expected full channel, got {other:?}"),
        }
        assert_eq!(feed.drain_ready(10).expect("drain").len(), 1);
    }

    #[test]
    fn drain_reports_closed_feed() {
        let (publisher, mut feed) = change_feed(4);
        drop(publisher);
        assert!(matches!(feed.drain_ready(4), Err(ServiceError::FeedClosed)));
    }

    #[tokio::test]
    async fn recv_batch_is_empty_after_publishers_drop() {
        let (publisher, mut feed) = change_feed(4);
        drop(publisher);
        assert!(feed.recv_batch(4).await.is_empty());
    }
}
