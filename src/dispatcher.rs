//! Routes inbound bus messages to the fleet registry by topic.

use crate::bus::{Message, Publisher};
use crate::protocol::{self, ProtocolError, Topic};
use crate::registry::{FleetRegistry, SpawnOutcome, TruckMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What a single inbound message resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Spawned(String),
    AlreadyExists(String),
    Removed(Vec<String>),
    Listed { topic: String, count: usize },
    Delivered(String),
    /// Addressed to a truck that is not live, or rejected by it.
    Dropped(String),
    /// Outbound or unrelated topic.
    Ignored,
    Malformed(ProtocolError),
}

pub struct FleetDispatcher {
    registry: Arc<FleetRegistry>,
    publisher: Arc<dyn Publisher>,
}

impl FleetDispatcher {
    pub fn new(registry: Arc<FleetRegistry>, publisher: Arc<dyn Publisher>) -> Self {
        Self { registry, publisher }
    }

    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.registry
    }

    pub fn handle(&self, message: &Message) -> Dispatch {
        let topic = match Topic::parse(&message.topic) {
            Ok(topic) if topic.is_inbound() => topic,
            _ => return Dispatch::Ignored,
        };

        match self.route(topic, &message.payload) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropping malformed message");
                Dispatch::Malformed(e)
            }
        }
    }

    fn route(&self, topic: Topic, payload: &str) -> Result<Dispatch, ProtocolError> {
        let dispatch = match topic {
            Topic::Spawn => {
                let id = protocol::parse_spawn(payload)?;
                match self.registry.spawn(&id) {
                    SpawnOutcome::Created => Dispatch::Spawned(id.0),
                    SpawnOutcome::AlreadyExists => Dispatch::AlreadyExists(id.0),
                }
            }
            Topic::Remove => {
                let ids = protocol::parse_remove(payload)?;
                let removed = self.registry.remove(&ids);
                Dispatch::Removed(removed.into_iter().map(|id| id.0).collect())
            }
            Topic::List => {
                let request = protocol::parse_list_request(payload)?;
                self.publish_listing(request.response_topic())
            }
            Topic::Command(id) => {
                let command = protocol::parse_truck_command(payload)?;
                self.deliver(id, TruckMessage::Command(command))
            }
            Topic::Actuator(id) => {
                let update = protocol::parse_actuator(payload)?;
                self.deliver(id, TruckMessage::Actuator(update))
            }
            Topic::ListResponse | Topic::Telemetry(_) | Topic::Signal { .. } | Topic::Log(_) => {
                Dispatch::Ignored
            }
        };
        Ok(dispatch)
    }

    fn deliver(&self, id: String, message: TruckMessage) -> Dispatch {
        if self.registry.dispatch(&id, &message) {
            Dispatch::Delivered(id)
        } else {
            Dispatch::Dropped(id)
        }
    }

    fn publish_listing(&self, topic: &str) -> Dispatch {
        let records = self.registry.list();
        match serde_json::to_string(&records) {
            Ok(json) => {
                self.publisher.publish(topic, json);
                debug!(topic, count = records.len(), "published fleet listing");
                Dispatch::Listed {
                    topic: topic.to_string(),
                    count: records.len(),
                }
            }
            Err(e) => {
                error!(error = %e, "failed to encode fleet listing");
                Dispatch::Ignored
            }
        }
    }

    /// Consumes inbound messages until every sender is dropped. Inbound
    /// traffic has its own queue, separate from the broadcast bus.
    pub async fn run(self, mut inbound: mpsc::Receiver<Message>) {
        info!("fleet dispatcher running");
        while let Some(message) = inbound.recv().await {
            self.handle(&message);
        }
        info!("fleet dispatcher stopped");
    }
}
