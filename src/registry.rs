//! Dynamic fleet registry: id → live actor.
//!
//! Lock order: the registry lock is always taken before any actor lock.
//! Actors never touch the registry, so a tick can never invert that order.

use crate::actor::TruckActor;
use crate::bus::Publisher;
use crate::config::{ConfigError, SimConfig};
use crate::noise::NoiseSource;
use crate::protocol::{topics, ActuatorUpdate, TruckCommand, TruckId};
use crate::truck::TruckRecord;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Anything that can be routed to a single truck.
#[derive(Debug, Clone, PartialEq)]
pub enum TruckMessage {
    Command(TruckCommand),
    Actuator(ActuatorUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Created,
    AlreadyExists,
}

struct ActorHandle {
    actor: Arc<TruckActor>,
    task: JoinHandle<()>,
}

pub struct FleetRegistry {
    trucks: RwLock<BTreeMap<String, ActorHandle>>,
    config: SimConfig,
    publisher: Arc<dyn Publisher>,
    spawned: AtomicU64,
}

impl FleetRegistry {
    /// Every actor ticks with `config`, so it is validated once up front.
    pub fn new(config: SimConfig, publisher: Arc<dyn Publisher>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            trucks: RwLock::new(BTreeMap::new()),
            config,
            publisher,
            spawned: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ActorHandle>> {
        self.trucks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ActorHandle>> {
        self.trucks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeded fleets derive a distinct, reproducible stream per spawn.
    fn next_noise(&self) -> NoiseSource {
        let ordinal = self.spawned.fetch_add(1, Ordering::Relaxed);
        NoiseSource::new(self.config.seed.map(|seed| seed.wrapping_add(ordinal)))
    }

    /// Creates and starts a truck unless one with this id is already live.
    /// Must be called from within a Tokio runtime.
    pub fn spawn(&self, id: &TruckId) -> SpawnOutcome {
        let id = id.as_str();
        let mut trucks = self.write();

        if trucks.contains_key(id) {
            info!(truck_id = %id, "spawn ignored, truck already exists");
            self.publisher.publish(&topics::log(id), format!("truck {id}: already exists"));
            return SpawnOutcome::AlreadyExists;
        }

        let actor = Arc::new(TruckActor::new(
            id,
            self.config.clone(),
            self.next_noise(),
            Arc::clone(&self.publisher),
        ));
        self.publisher.publish(&topics::log(id), format!("truck {id}: created"));
        // Inserted fully initialised; listings never see a partial record.
        let task = tokio::spawn(Arc::clone(&actor).run());
        trucks.insert(id.to_string(), ActorHandle { actor, task });

        info!(truck_id = %id, live = trucks.len(), "truck spawned");
        SpawnOutcome::Created
    }

    /// Stops and deregisters every listed truck. Unknown ids are skipped.
    /// Returns the ids that were actually removed.
    pub fn remove(&self, ids: &[TruckId]) -> Vec<TruckId> {
        let mut trucks = self.write();
        let mut removed = Vec::new();

        for id in ids {
            match trucks.remove(id.as_str()) {
                Some(handle) => {
                    handle.actor.request_stop();
                    info!(truck_id = %id, "truck removed");
                    self.publisher.publish(&topics::log(id.as_str()), format!("truck {id}: removed"));
                    removed.push(id.clone());
                }
                None => debug!(truck_id = %id, "remove ignored, no such truck"),
            }
        }

        removed
    }

    /// Consistent snapshot of every live truck, ordered by id.
    pub fn list(&self) -> Vec<TruckRecord> {
        self.read().values().map(|handle| handle.actor.snapshot()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Live actor handle, mainly for inspection and tests.
    pub fn actor(&self, id: &str) -> Option<Arc<TruckActor>> {
        self.read().get(id).map(|handle| Arc::clone(&handle.actor))
    }

    /// Routes a message to its truck. Returns `false` when no such truck is
    /// live or the message was rejected; neither case is surfaced further.
    pub fn dispatch(&self, id: &str, message: &TruckMessage) -> bool {
        let trucks = self.read();
        let Some(handle) = trucks.get(id) else {
            debug!(truck_id = %id, "dropping message for unknown truck");
            return false;
        };

        let result = match message {
            TruckMessage::Command(command) => handle.actor.apply_command(command),
            TruckMessage::Actuator(update) => handle.actor.apply_actuator(update),
        };
        result.is_ok()
    }

    /// Stops every truck and waits for all tick loops to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, ActorHandle)> = {
            let mut trucks = self.write();
            std::mem::take(&mut *trucks).into_iter().collect()
        };

        for (_, handle) in &drained {
            handle.actor.request_stop();
        }
        for (id, handle) in drained {
            if let Err(e) = handle.task.await {
                warn!(truck_id = %id, error = %e, "tick loop ended abnormally");
            }
        }
        info!("fleet shut down");
    }
}

impl std::fmt::Debug for FleetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetRegistry")
            .field("trucks", &self.ids())
            .finish_non_exhaustive()
    }
}
