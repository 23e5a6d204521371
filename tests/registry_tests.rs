use fleetsim::bus::{BroadcastBus, Message};
use fleetsim::config::{NoiseConfig, SimConfig};
use fleetsim::protocol::{ActuatorUpdate, TruckCommand, TruckId};
use fleetsim::registry::{FleetRegistry, SpawnOutcome, TruckMessage};
use fleetsim::telemetry::TelemetrySample;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

fn fleet_with(config: SimConfig) -> (Arc<FleetRegistry>, BroadcastBus) {
    let bus = BroadcastBus::new(4096);
    let registry = Arc::new(FleetRegistry::new(config, Arc::new(bus.clone())).unwrap());
    (registry, bus)
}

fn fleet() -> (Arc<FleetRegistry>, BroadcastBus) {
    fleet_with(SimConfig {
        noise: NoiseConfig::silent(),
        ..SimConfig::default()
    })
}

fn drain(rx: &mut Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn payloads_on(messages: &[Message], topic: &str) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.topic == topic)
        .map(|m| m.payload.clone())
        .collect()
}

fn command(id: &str, command: TruckCommand) -> (String, TruckMessage) {
    (id.to_string(), TruckMessage::Command(command))
}

#[tokio::test]
async fn test_spawn_is_idempotent() {
    let (registry, bus) = fleet();
    let mut rx = bus.subscribe();
    let t1 = TruckId::from("T1");

    assert_eq!(registry.spawn(&t1), SpawnOutcome::Created);
    let (id, msg) = command("T1", TruckCommand::ResetPosition { x: 5.0, y: 6.0, heading: 0.0 });
    assert!(registry.dispatch(&id, &msg));

    // Second spawn must not reset the existing truck
    assert_eq!(registry.spawn(&t1), SpawnOutcome::AlreadyExists);

    let listing = registry.list();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].x, 5.0);
    assert_eq!(listing[0].y, 6.0);

    let logs = payloads_on(&drain(&mut rx), "truck/T1/log");
    assert_eq!(logs.first().map(String::as_str), Some("truck T1: created"));
    assert_eq!(logs.last().map(String::as_str), Some("truck T1: already exists"));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_remove_then_list() {
    let (registry, bus) = fleet();
    let mut rx = bus.subscribe();
    registry.spawn(&TruckId::from("A"));
    registry.spawn(&TruckId::from("B"));
    let a = registry.actor("A").unwrap();

    let removed = registry.remove(&[TruckId::from("A"), TruckId::from("ghost")]);

    assert_eq!(removed, vec![TruckId::from("A")]);
    assert!(a.is_stopped());
    assert_eq!(registry.ids(), vec!["B".to_string()]);
    assert!(!registry.contains("A"));
    assert!(payloads_on(&drain(&mut rx), "truck/A/log").contains(&"truck A: removed".to_string()));

    // Removing again is a silent no-op
    assert!(registry.remove(&[TruckId::from("A")]).is_empty());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_reset_position_then_list() {
    let (registry, _bus) = fleet();
    registry.spawn(&TruckId::from("T1"));
    registry.dispatch(
        "T1",
        &TruckMessage::Actuator(ActuatorUpdate {
            throttle_percent: Some(80.0),
            desired_heading: Some(10.0),
        }),
    );
    registry.actor("T1").unwrap().step(2.0);

    let (id, msg) = command("T1", TruckCommand::ResetPosition { x: 10.0, y: -4.0, heading: 90.0 });
    assert!(registry.dispatch(&id, &msg));

    let record = &registry.list()[0];
    assert_eq!(record.x, 10.0);
    assert_eq!(record.y, -4.0);
    assert_eq!(record.heading, 90.0);
    assert_eq!(record.velocity, 0.0);
    assert_eq!(record.throttle_percent, 0.0);
    assert_eq!(record.desired_heading, 90.0);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_temp_step_publishes_rounded_signal() {
    let (registry, bus) = fleet();
    let mut rx = bus.subscribe();
    registry.spawn(&TruckId::from("T1"));

    let (id, msg) = command("T1", TruckCommand::TempStep { delta: 50.0 });
    assert!(registry.dispatch(&id, &msg));

    let messages = drain(&mut rx);
    let signals = payloads_on(&messages, "truck/T1/signal/temperature");
    assert_eq!(signals.last().map(String::as_str), Some("120"));

    let sample: TelemetrySample =
        serde_json::from_str(payloads_on(&messages, "truck/T1/telemetry").last().unwrap()).unwrap();
    assert!((sample.temperature - 120.0).abs() < 0.1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_fault_flags_are_independent() {
    let (registry, bus) = fleet();
    let mut rx = bus.subscribe();
    registry.spawn(&TruckId::from("T1"));

    let steps = [
        (TruckCommand::SetFault { electrical: Some(true), hydraulic: None }, (true, false)),
        (TruckCommand::SetFault { electrical: None, hydraulic: Some(true) }, (true, true)),
        (TruckCommand::ClearFaults, (false, false)),
    ];

    for (cmd, (electrical, hydraulic)) in steps {
        let (id, msg) = command("T1", cmd);
        assert!(registry.dispatch(&id, &msg));

        let record = &registry.list()[0];
        assert_eq!(record.fault_electrical, electrical);
        assert_eq!(record.fault_hydraulic, hydraulic);

        let messages = drain(&mut rx);
        let expected = if electrical { "1" } else { "0" };
        assert_eq!(
            payloads_on(&messages, "truck/T1/signal/fault_electrical").last().map(String::as_str),
            Some(expected)
        );
        let expected = if hydraulic { "1" } else { "0" };
        assert_eq!(
            payloads_on(&messages, "truck/T1/signal/fault_hydraulic").last().map(String::as_str),
            Some(expected)
        );
    }

    registry.shutdown().await;
}

#[tokio::test]
async fn test_unknown_target_is_dropped() {
    let (registry, bus) = fleet();
    let mut rx = bus.subscribe();

    let (id, msg) = command("nobody", TruckCommand::Stop);
    assert!(!registry.dispatch(&id, &msg));
    assert!(registry.is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_invalid_command_is_rejected_without_mutation() {
    let (registry, _bus) = fleet();
    registry.spawn(&TruckId::from("T1"));
    let before = registry.list();

    let (id, msg) = command("T1", TruckCommand::TempStep { delta: f64::NAN });
    assert!(!registry.dispatch(&id, &msg));
    assert_eq!(registry.list(), before);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_tick_loop_publishes_telemetry() {
    let (registry, bus) = fleet_with(SimConfig {
        time_scale: 100.0,
        noise: NoiseConfig::silent(),
        ..SimConfig::default()
    });
    let mut rx = bus.subscribe();
    registry.spawn(&TruckId::from("T1"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    registry.shutdown().await;

    let sequences: Vec<u64> = payloads_on(&drain(&mut rx), "truck/T1/telemetry")
        .iter()
        .map(|p| serde_json::from_str::<TelemetrySample>(p).unwrap().sequence)
        .collect();
    assert!(sequences.len() >= 2, "only {} samples", sequences.len());
    assert!(sequences.iter().enumerate().all(|(i, seq)| *seq == i as u64));
}

#[tokio::test]
async fn test_shutdown_stops_every_actor() {
    let (registry, _bus) = fleet_with(SimConfig {
        time_scale: 1000.0,
        ..SimConfig::default()
    });
    for id in ["A", "B", "C"] {
        registry.spawn(&TruckId::from(id));
    }
    let actors: Vec<_> = registry.ids().iter().filter_map(|id| registry.actor(id)).collect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert!(actors.iter().all(|actor| actor.is_stopped()));
    let published: Vec<u64> = actors.iter().map(|actor| actor.sequence()).collect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(actors.iter().map(|actor| actor.sequence()).collect::<Vec<_>>(), published);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_list_during_spawn_sees_whole_records() {
    let (registry, _bus) = fleet();

    let spawner = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for i in 0..50 {
                registry.spawn(&TruckId(format!("T{i}")));
                tokio::task::yield_now().await;
            }
        })
    };

    let lister = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for _ in 0..200 {
                for record in registry.list() {
                    assert!(!record.id.is_empty());
                    assert_eq!((record.x, record.y), (0.0, 0.0));
                    assert_eq!(record.velocity, 0.0);
                    assert!(!record.fault_electrical && !record.fault_hydraulic);
                    assert!(record.temperature > 60.0 && record.temperature <= 70.0);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    spawner.await.unwrap();
    lister.await.unwrap();
    assert_eq!(registry.len(), 50);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_seeded_fleet_is_reproducible() {
    let config = SimConfig {
        seed: Some(42),
        ..SimConfig::default()
    };
    let mut samples = Vec::new();

    for _ in 0..2 {
        let (registry, bus) = fleet_with(config.clone());
        let mut rx = bus.subscribe();
        registry.spawn(&TruckId::from("T1"));
        registry.actor("T1").unwrap().publish_telemetry();

        let payload = payloads_on(&drain(&mut rx), "truck/T1/telemetry").pop().unwrap();
        let sample: TelemetrySample = serde_json::from_str(&payload).unwrap();
        samples.push((sample.x, sample.y, sample.heading, sample.temperature));
        registry.shutdown().await;
    }

    assert_eq!(samples[0], samples[1]);
}

#[test]
fn test_rejects_unrepresentable_tick_period() {
    let bus = BroadcastBus::new(16);
    let config = SimConfig {
        time_scale: 1e-300,
        ..SimConfig::default()
    };

    assert!(FleetRegistry::new(config, Arc::new(bus.clone())).is_err());
    assert!(FleetRegistry::new(SimConfig { dt: 1e20, ..SimConfig::default() }, Arc::new(bus)).is_err());
}
