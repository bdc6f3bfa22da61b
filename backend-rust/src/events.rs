//! Typed event fan-out to streaming subscribers.
//!
//! Each subscriber owns a bounded queue (capacity 500). `emit` never blocks:
//! on overflow the oldest queued event is dropped to make room, so a slow
//! consumer only loses its own tail and never stalls the emitter or other
//! subscribers. Subscriptions deregister themselves on `Drop`, which covers
//! every stream exit path including client disconnects.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;

pub const SUBSCRIBER_CAPACITY: usize = 500;

// ─── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl EventEnvelope {
    fn new(event_type: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn keepalive() -> Self {
        Self::new("keepalive", Value::Object(serde_json::Map::new()))
    }
}

// ─── Subscriber queue ─────────────────────────────────────────────────────────

struct SubscriberQueue {
    events: Mutex<VecDeque<EventEnvelope>>,
    notify: Notify,
}

impl SubscriberQueue {
    fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(64)),
            notify: Notify::new(),
        }
    }

    fn push(&self, envelope: EventEnvelope) {
        {
            let mut events = self.events.lock().expect("subscriber queue poisoned");
            if events.len() >= SUBSCRIBER_CAPACITY {
                events.pop_front();
            }
            events.push_back(envelope);
        }
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<EventEnvelope> {
        self.events
            .lock()
            .expect("subscriber queue poisoned")
            .pop_front()
    }
}

// ─── Bus ──────────────────────────────────────────────────────────────────────

/// Process-wide event bus. The subscriber-set lock is held only for
/// registration, removal, and snapshotting for fan-out.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<u64, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap and deliver an event to every current subscriber, best-effort.
    pub fn emit(&self, event_type: &str, payload: Value) {
        let envelope = EventEnvelope::new(event_type, payload);
        let queues: Vec<Arc<SubscriberQueue>> = {
            let subscribers = self.subscribers.lock().expect("subscriber set poisoned");
            subscribers.values().cloned().collect()
        };
        for queue in queues {
            queue.push(envelope.clone());
        }
    }

    pub fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new());
        self.subscribers
            .lock()
            .expect("subscriber set poisoned")
            .insert(id, queue.clone());
        EventSubscription {
            id,
            queue,
            bus: self.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber set poisoned")
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("subscriber set poisoned")
            .remove(&id);
    }
}

// ─── Subscription handle ──────────────────────────────────────────────────────

pub struct EventSubscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    bus: Arc<EventBus>,
}

impl EventSubscription {
    /// Next queued event, or a keepalive envelope once `timeout` elapses with
    /// an empty queue.
    pub async fn next_event(&mut self, timeout: Duration) -> EventEnvelope {
        loop {
            if let Some(envelope) = self.queue.try_pop() {
                return envelope;
            }
            if tokio::time::timeout(timeout, self.queue.notify.notified())
                .await
                .is_err()
            {
                return EventEnvelope::keepalive();
            }
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_emits_in_order() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();

        bus.emit("detection", json!({"n": 1}));
        bus.emit("detection", json!({"n": 2}));

        let first = sub.next_event(Duration::from_millis(50)).await;
        let second = sub.next_event(Duration::from_millis(50)).await;
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
    }

    #[tokio::test]
    async fn idle_subscriber_gets_keepalive() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();

        let envelope = sub.next_event(Duration::from_millis(10)).await;
        assert_eq!(envelope.event_type, "keepalive");
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();

        for n in 0..(SUBSCRIBER_CAPACITY + 5) {
            bus.emit("detection", json!({"n": n}));
        }

        let first = sub.next_event(Duration::from_millis(50)).await;
        assert_eq!(first.payload["n"], 5);
    }

    #[tokio::test]
    async fn drop_deregisters_subscriber() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        // Emitting with no subscribers is a no-op
        bus.emit("detection", json!({}));
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_others() {
        let bus = Arc::new(EventBus::new());
        let _slow = bus.subscribe();
        let mut fast = bus.subscribe();

        for n in 0..600 {
            bus.emit("detection", json!({"n": n}));
        }
        // The fast consumer still sees a contiguous tail
        let event = fast.next_event(Duration::from_millis(50)).await;
        assert_eq!(event.payload["n"], 100);
    }
}
