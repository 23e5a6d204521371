//! In-process topic-addressed publish/subscribe bus.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A single bus message. Payloads are text: JSON documents for structured
/// messages, plain values for scalar signals and log lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Fire-and-forget outbound side of the bus.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: String);
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, topic: &str, payload: String) {
        (**self).publish(topic, payload);
    }
}

/// Bus backed by a bounded `tokio::sync::broadcast` channel. Every
/// subscriber sees every message; filtering by topic is up to the receiver.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Message>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn send(&self, message: Message) {
        // No receivers is not an error: nobody is listening yet.
        let _ = self.tx.send(message);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Publisher for BroadcastBus {
    fn publish(&self, topic: &str, payload: String) {
        self.send(Message::new(topic, payload));
    }
}

/// MQTT-style topic filter: `+` matches one segment, a trailing `#` matches
/// any remainder (including none).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter(String);

impl TopicFilter {
    pub fn new(filter: impl Into<String>) -> Option<Self> {
        let filter = filter.into();
        if filter.is_empty() {
            return None;
        }
        let segments: Vec<&str> = filter.split('/').collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let wildcard_misuse = (segment.contains('#') && (*segment != "#" || i != last))
                || (segment.contains('+') && *segment != "+");
            if wildcard_misuse {
                return None;
            }
        }
        Some(Self(filter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut topic_segments = topic.split('/');
        for pattern in self.0.split('/') {
            if pattern == "#" {
                return true;
            }
            match topic_segments.next() {
                Some(segment) if pattern == "+" || pattern == segment => {}
                _ => return false,
            }
        }
        topic_segments.next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_validation() {
        assert!(TopicFilter::new("truck/+/telemetry").is_some());
        assert!(TopicFilter::new("#").is_some());
        assert!(TopicFilter::new("truck/#").is_some());
        assert!(TopicFilter::new("").is_none());
        assert!(TopicFilter::new("truck/#/cmd").is_none());
        assert!(TopicFilter::new("truck/a+/cmd").is_none());
    }

    #[test]
    fn test_filter_matching() {
        let telemetry = TopicFilter::new("truck/+/telemetry").unwrap();
        assert!(telemetry.matches("truck/T1/telemetry"));
        assert!(!telemetry.matches("truck/T1/log"));
        assert!(!telemetry.matches("truck/T1/telemetry/extra"));

        let truck = TopicFilter::new("truck/T1/#").unwrap();
        assert!(truck.matches("truck/T1/signal/temperature"));
        assert!(truck.matches("truck/T1"));
        assert!(!truck.matches("truck/T2/log"));

        let exact = TopicFilter::new("fleet/list/response").unwrap();
        assert!(exact.matches("fleet/list/response"));
        assert!(!exact.matches("fleet/list"));
    }

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let bus = BroadcastBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish("truck/T1/log", "hello".to_string());

        assert_eq!(a.recv().await.unwrap(), Message::new("truck/T1/log", "hello"));
        assert_eq!(b.recv().await.unwrap().payload, "hello");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = BroadcastBus::new(4);
        bus.publish("fleet/spawn", "{}".to_string());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
