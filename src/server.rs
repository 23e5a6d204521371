//! Process-level wiring: bus, registry, dispatcher and TCP gateway.

use crate::bus::{BroadcastBus, Message, Publisher};
use crate::config::{ConfigError, ServerConfig};
use crate::dispatcher::FleetDispatcher;
use crate::gateway::{Gateway, GatewayError};
use crate::protocol::TruckId;
use crate::registry::FleetRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct FleetServer {
    config: ServerConfig,
    registry: Arc<FleetRegistry>,
    gateway: Arc<Gateway>,
    dispatcher: JoinHandle<()>,
}

impl FleetServer {
    /// Validates the configuration, starts the dispatcher and spawns the
    /// boot-time fleet. Must be called from within a Tokio runtime.
    pub fn start(config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let bus = BroadcastBus::new(config.bus_capacity);
        let publisher: Arc<dyn Publisher> = Arc::new(bus.clone());
        let registry = Arc::new(FleetRegistry::new(config.sim.clone(), Arc::clone(&publisher))?);

        let (inbound_tx, inbound_rx) = mpsc::channel(config.bus_capacity);
        let dispatcher = FleetDispatcher::new(Arc::clone(&registry), publisher);
        let dispatcher = tokio::spawn(dispatcher.run(inbound_rx));
        let gateway = Arc::new(Gateway::new(bus, inbound_tx));

        for id in &config.initial_trucks {
            registry.spawn(&TruckId::from(id.as_str()));
        }
        info!(trucks = registry.len(), dt = config.sim.dt, time_scale = config.sim.time_scale, "fleet started");

        Ok(Self {
            config,
            registry,
            gateway,
            dispatcher,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.registry
    }

    /// Publishes on the bus as an in-process client would.
    pub async fn publish(&self, topic: &str, payload: impl Into<String>) {
        self.gateway.publish(Message::new(topic, payload)).await;
    }

    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        Ok(TcpListener::bind(self.config.bind_addr()).await?)
    }

    /// Serves clients on `listener` until `shutdown` resolves or the gateway
    /// fails, then stops the fleet.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        let served = tokio::select! {
            result = Arc::clone(&self.gateway).serve(listener) => result,
            () = shutdown => {
                info!("shutdown requested");
                Ok(())
            }
        };
        self.shutdown().await;
        served
    }

    /// Stops every truck and the dispatcher.
    pub async fn shutdown(self) {
        self.registry.shutdown().await;
        self.dispatcher.abort();
        info!("fleet server stopped");
    }
}

impl std::fmt::Debug for FleetServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetServer")
            .field("addr", &self.config.bind_addr())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
