//! Per-truck simulation actor.
//!
//! Each actor owns its [`TruckState`] behind a mutex. Commands, actuator
//! updates and the tick's step-then-publish sequence all run inside that
//! region, so a tick never observes a half-applied command.

use crate::bus::Publisher;
use crate::config::SimConfig;
use crate::noise::NoiseSource;
use crate::protocol::{topics, ActuatorUpdate, ProtocolError, TruckCommand};
use crate::telemetry::{self, TelemetrySample};
use crate::truck::{PublishScope, TruckRecord, TruckState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, warn};

struct ActorCore {
    state: TruckState,
    noise: NoiseSource,
    sequence: u64,
}

pub struct TruckActor {
    id: String,
    config: SimConfig,
    core: Mutex<ActorCore>,
    publisher: Arc<dyn Publisher>,
    stop: AtomicBool,
    wake: Notify,
}

impl TruckActor {
    pub fn new(
        id: impl Into<String>,
        config: SimConfig,
        noise: NoiseSource,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let id = id.into();
        let state = TruckState::new(id.clone(), config.initial_temperature);
        Self {
            id,
            config,
            core: Mutex::new(ActorCore {
                state,
                noise,
                sequence: 0,
            }),
            publisher,
            stop: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActorCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a control command. Invalid commands are logged and leave the
    /// state untouched.
    pub fn apply_command(&self, command: &TruckCommand) -> Result<(), ProtocolError> {
        if let Err(e) = command.validate() {
            warn!(truck_id = %self.id, error = %e, "rejected command");
            return Err(e);
        }

        let mut core = self.lock();
        let outcome = core.state.apply_command(command);
        debug!(truck_id = %self.id, ?command, "applied command");
        self.publish_log(outcome.log);
        match outcome.publish {
            PublishScope::Telemetry => self.emit_telemetry(&mut core),
            PublishScope::Signals => self.emit_signals(&core.state),
        }
        Ok(())
    }

    /// Overwrites the actuator demand; takes effect on the next tick.
    pub fn apply_actuator(&self, update: &ActuatorUpdate) -> Result<(), ProtocolError> {
        if let Err(e) = update.validate() {
            warn!(truck_id = %self.id, error = %e, "rejected actuator update");
            return Err(e);
        }
        self.lock().state.apply_actuator(update);
        Ok(())
    }

    /// Advances the physics by exactly one step of `dt`.
    pub fn step(&self, dt: f64) {
        let mut core = self.lock();
        self.step_locked(&mut core, dt);
    }

    /// Publishes one telemetry sample plus the companion signals.
    pub fn publish_telemetry(&self) {
        let mut core = self.lock();
        self.emit_telemetry(&mut core);
    }

    /// One tick: step then publish, atomically with respect to commands.
    pub fn tick(&self) {
        let mut core = self.lock();
        self.step_locked(&mut core, self.config.dt);
        self.emit_telemetry(&mut core);
    }

    pub fn snapshot(&self) -> TruckRecord {
        self.lock().state.record()
    }

    pub fn state(&self) -> TruckState {
        self.lock().state.clone()
    }

    /// Number of telemetry samples published so far.
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Asks the tick loop to exit after the tick in flight, if any.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Fixed-period tick loop. Sleeps the remainder of each period and exits
    /// cooperatively once [`request_stop`](Self::request_stop) is called.
    pub async fn run(self: Arc<Self>) {
        let period = match self.config.tick_period() {
            Ok(period) => period,
            Err(e) => {
                error!(truck_id = %self.id, error = %e, "tick loop not started");
                return;
            }
        };
        debug!(truck_id = %self.id, ?period, "tick loop started");

        while !self.is_stopped() {
            let started = Instant::now();
            self.tick();
            let remaining = period.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.wake.notified() => {}
            }
        }

        debug!(truck_id = %self.id, "tick loop exited");
    }

    fn step_locked(&self, core: &mut ActorCore, dt: f64) {
        if let Some((cx, cy)) = core.state.step(dt, &self.config) {
            self.publish_log(format!(
                "truck {} moving ({},{}), heading: {:.1}",
                self.id, cx, cy, core.state.heading
            ));
        }
    }

    fn emit_telemetry(&self, core: &mut ActorCore) {
        let ActorCore { state, noise, sequence } = core;
        let sample = TelemetrySample::capture(state, *sequence, self.config.dt, noise, &self.config.noise);
        *sequence += 1;

        match serde_json::to_string(&sample) {
            Ok(json) => self.publisher.publish(&topics::telemetry(&self.id), json),
            Err(e) => error!(truck_id = %self.id, error = %e, "failed to encode telemetry"),
        }
        self.emit_signals(state);
    }

    fn emit_signals(&self, state: &TruckState) {
        for (topic, value) in telemetry::signals(state) {
            self.publisher.publish(&topic, value);
        }
    }

    fn publish_log(&self, text: String) {
        debug!(truck_id = %self.id, "{}", text);
        self.publisher.publish(&topics::log(&self.id), text);
    }
}

impl std::fmt::Debug for TruckActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruckActor")
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
