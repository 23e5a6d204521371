use fleetsim::protocol::*;

#[test]
fn test_set_fault_only_touches_present_fields() {
    let cmd = parse_truck_command(r#"{"cmd":"set_fault","electrical":true}"#).unwrap();
    assert_eq!(cmd, TruckCommand::SetFault { electrical: Some(true), hydraulic: None });

    let cmd = parse_truck_command(r#"{"cmd":"set_fault","hidraulica":true}"#).unwrap();
    assert_eq!(cmd, TruckCommand::SetFault { electrical: None, hydraulic: Some(true) });
}

#[test]
fn test_command_variants() {
    assert_eq!(parse_truck_command(r#"{"cmd":"clear_faults"}"#).unwrap(), TruckCommand::ClearFaults);
    assert_eq!(parse_truck_command(r#"{"cmd":"stop"}"#).unwrap(), TruckCommand::Stop);
    assert_eq!(
        parse_truck_command(r#"{"cmd":"temp_step","delta":50}"#).unwrap(),
        TruckCommand::TempStep { delta: 50.0 }
    );
    assert_eq!(
        parse_truck_command(r#"{"cmd":"reset_position","x":3,"y":-2.5,"ang":90}"#).unwrap(),
        TruckCommand::ResetPosition { x: 3.0, y: -2.5, heading: 90.0 }
    );
}

#[test]
fn test_missing_numbers_default_to_zero() {
    assert_eq!(
        parse_truck_command(r#"{"cmd":"temp_step"}"#).unwrap(),
        TruckCommand::TempStep { delta: 0.0 }
    );
    assert_eq!(
        parse_truck_command(r#"{"cmd":"reset_position","x":1}"#).unwrap(),
        TruckCommand::ResetPosition { x: 1.0, y: 0.0, heading: 0.0 }
    );
}

#[test]
fn test_numeric_strings_accepted() {
    assert_eq!(
        parse_truck_command(r#"{"cmd":"temp_step","delta":"50"}"#).unwrap(),
        TruckCommand::TempStep { delta: 50.0 }
    );
    assert_eq!(
        parse_truck_command(r#"{"cmd":"reset_position","x":"3","y":"-2.5","ang":"90"}"#).unwrap(),
        TruckCommand::ResetPosition { x: 3.0, y: -2.5, heading: 90.0 }
    );

    let update = parse_actuator(r#"{"o_aceleracao":"80","o_direcao":"15"}"#).unwrap();
    assert_eq!(update.throttle_percent, Some(80.0));
    assert_eq!(update.desired_heading, Some(15.0));
    assert!(parse_actuator(r#"{"throttle_percent":"fast"}"#).is_err());
}

#[test]
fn test_malformed_commands_rejected() {
    assert!(matches!(parse_truck_command("not json"), Err(ProtocolError::InvalidJson(_))));
    assert!(matches!(parse_truck_command(r#"{"cmd":"self_destruct"}"#), Err(ProtocolError::InvalidJson(_))));
    assert!(matches!(parse_truck_command(r#"{"delta":3}"#), Err(ProtocolError::InvalidJson(_))));
    assert!(parse_truck_command(r#"{"cmd":"temp_step","delta":"hot"}"#).is_err());
}

#[test]
fn test_actuator_partial_update() {
    let update = parse_actuator(r#"{"desired_heading":45}"#).unwrap();
    assert_eq!(update.throttle_percent, None);
    assert_eq!(update.desired_heading, Some(45.0));

    let update = parse_actuator(r#"{"o_aceleracao":-20,"o_direcao":10}"#).unwrap();
    assert_eq!(update.throttle_percent, Some(-20.0));
    assert_eq!(update.desired_heading, Some(10.0));

    assert_eq!(parse_actuator("{}").unwrap(), ActuatorUpdate::default());
    assert!(parse_actuator("[1,2]").is_err());
}

#[test]
fn test_lifecycle_payloads() {
    assert_eq!(parse_spawn(r#"{"cmd":"spawn","truck_id":"T1"}"#).unwrap(), TruckId::from("T1"));
    assert!(parse_spawn(r#"{"cmd":"spawn"}"#).is_err());

    assert_eq!(parse_remove(r#"{"cmd":"remove","truck_id":"T1"}"#).unwrap(), vec![TruckId::from("T1")]);
    assert_eq!(
        parse_remove(r#"{"cmd":"remove","truck_id":["T1", 2]}"#).unwrap(),
        vec![TruckId::from("T1"), TruckId::from("2")]
    );
    assert!(matches!(
        parse_remove(r#"{"cmd":"spawn","truck_id":"T1"}"#),
        Err(ProtocolError::UnexpectedCommand { .. })
    ));
}

#[test]
fn test_inbound_topics() {
    for topic in ["fleet/spawn", "fleet/remove", "fleet/list", "truck/T1/cmd", "truck/T1/actuator"] {
        assert!(Topic::parse(topic).unwrap().is_inbound(), "{topic}");
    }
    for topic in [
        "fleet/list/response",
        "truck/T1/telemetry",
        "truck/T1/log",
        "truck/T1/signal/fault_hydraulic",
    ] {
        assert!(!Topic::parse(topic).unwrap().is_inbound(), "{topic}");
    }
}

#[test]
fn test_topic_builders() {
    assert_eq!(topics::command("T1"), "truck/T1/cmd");
    assert_eq!(topics::actuator("T1"), "truck/T1/actuator");
    assert_eq!(topics::telemetry("T1"), "truck/T1/telemetry");
    assert_eq!(topics::temperature_signal("T1"), "truck/T1/signal/temperature");
    assert_eq!(topics::electrical_signal("T1"), "truck/T1/signal/fault_electrical");
    assert_eq!(topics::hydraulic_signal("T1"), "truck/T1/signal/fault_hydraulic");
    assert_eq!(topics::log("T1"), "truck/T1/log");
}

#[test]
fn test_non_finite_values_rejected() {
    // 1e999 overflows to infinity during decoding
    let err = parse_truck_command(r#"{"cmd":"temp_step","delta":1e999}"#);
    assert!(err.is_err());
    assert_eq!(
        TruckCommand::ResetPosition { x: 0.0, y: f64::INFINITY, heading: 0.0 }.validate(),
        Err(ProtocolError::InvalidParameter("y"))
    );
    assert_eq!(
        ActuatorUpdate { throttle_percent: Some(f64::NAN), desired_heading: None }.validate(),
        Err(ProtocolError::InvalidParameter("throttle_percent"))
    );
}
