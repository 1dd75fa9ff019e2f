//! Event Hub (spec §4.8/§8 P7): in-process pub/sub for execution progress,
//! fanned out to SSE subscribers by the `api` crate. Not a persistence
//! layer — the Store is the durable record; this only serves "live tail"
//! consumers that are connected right now. A subscriber that connects
//! after an event fired simply never sees it (spec §9), which is why the
//! `api` crate also exposes `GET /executions/{id}/node-executions` as a
//! point-in-time snapshot.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Channel capacity per execution. Once full, `tokio::sync::broadcast`
/// drops the oldest unread event for lagging subscribers (spec §9) rather
/// than blocking the publisher.
const CHANNEL_CAPACITY: usize = 256;

/// A single update about one node (or the execution as a whole when
/// `node_id` is `None`).
#[derive(Debug, Clone, Serialize)]
pub struct NodeUpdate {
    pub execution_id: Uuid,
    pub node_id: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

pub struct EventHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<NodeUpdate>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to updates for an execution, creating the channel lazily
    /// if this is the first subscriber.
    pub fn subscribe(&self, execution_id: Uuid) -> broadcast::Receiver<NodeUpdate> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(execution_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an update. A no-op if nobody is subscribed (the common case
    /// — most executions run unobserved).
    pub fn publish(&self, update: NodeUpdate) {
        let channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(&update.execution_id) {
            let _ = sender.send(update);
        }
    }

    /// Drop the channel for a terminal execution once nobody holds a
    /// receiver for it, so the map doesn't grow unbounded over the life of
    /// a worker process.
    pub fn retire(&self, execution_id: Uuid) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(&execution_id) {
            if sender.receiver_count() == 0 {
                channels.remove(&execution_id);
            }
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_published_update() {
        let hub = EventHub::new();
        let execution_id = Uuid::new_v4();
        let mut rx = hub.subscribe(execution_id);

        hub.publish(NodeUpdate {
            execution_id,
            node_id: Some("n1".into()),
            status: "running".into(),
            timestamp: Utc::now(),
            data: json!({}),
        });

        let update = rx.recv().await.unwrap();
        assert_eq!(update.node_id.as_deref(), Some("n1"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let hub = EventHub::new();
        hub.publish(NodeUpdate {
            execution_id: Uuid::new_v4(),
            node_id: None,
            status: "running".into(),
            timestamp: Utc::now(),
            data: json!({}),
        });
    }

    #[test]
    fn retire_removes_channel_with_no_subscribers() {
        let hub = EventHub::new();
        let execution_id = Uuid::new_v4();
        {
            let _rx = hub.subscribe(execution_id);
        }
        hub.retire(execution_id);
        assert_eq!(hub.channels.lock().unwrap().len(), 0);
    }
}
