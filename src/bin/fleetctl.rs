use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use fleetsim::gateway::{GatewayClient, GatewayError, ServerFrame};
use fleetsim::protocol::topics;
use fleetsim::telemetry::TelemetrySample;
use fleetsim::truck::TruckRecord;
use serde_json::{json, Value};
use std::process::Command;
use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "1883";
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

type CliResult = Result<(), Box<dyn std::error::Error>>;

struct Target<'a> {
    host: &'a str,
    port: u16,
    format: &'a str,
    verbose: bool,
}

#[tokio::main]
async fn main() -> CliResult {
    let truck_id = || Arg::with_name("id").help("Truck id").required(true);
    let on_off = |name: &'static str, help: &'static str| {
        Arg::with_name(name)
            .long(name)
            .value_name("STATE")
            .help(help)
            .takes_value(true)
            .possible_values(&["on", "off"])
    };

    let matches = App::new("fleetctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🚛 Operator client for the truck fleet simulator")
        .setting(AppSettings::AllowNegativeNumbers)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator gateway port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("spawn")
                .about("➕ Spawn a truck and place it")
                .arg(truck_id())
                .arg(number_arg("x").long("x").help("Initial x position").default_value("0"))
                .arg(number_arg("y").long("y").help("Initial y position").default_value("0"))
                .arg(number_arg("heading").long("heading").help("Initial heading in degrees").default_value("0")),
        )
        .subcommand(
            SubCommand::with_name("remove")
                .about("➖ Remove one or more trucks")
                .arg(Arg::with_name("ids").help("Truck ids").required(true).multiple(true)),
        )
        .subcommand(SubCommand::with_name("list").about("📋 List every live truck"))
        .subcommand(
            SubCommand::with_name("fault")
                .about("⚡ Set fault flags on a truck")
                .arg(truck_id())
                .arg(on_off("electrical", "Electrical fault"))
                .arg(on_off("hydraulic", "Hydraulic fault")),
        )
        .subcommand(SubCommand::with_name("clear-faults").about("🧹 Clear all fault flags").arg(truck_id()))
        .subcommand(
            SubCommand::with_name("temp-step")
                .about("🌡️  Step the engine temperature")
                .arg(truck_id())
                .arg(number_arg("delta").help("Temperature change").required(true)),
        )
        .subcommand(
            SubCommand::with_name("reset")
                .about("📍 Reset position and heading")
                .arg(truck_id())
                .arg(number_arg("x").help("X position").required(true))
                .arg(number_arg("y").help("Y position").required(true))
                .arg(number_arg("heading").help("Heading in degrees").default_value("0")),
        )
        .subcommand(SubCommand::with_name("stop").about("🛑 Stop a truck").arg(truck_id()))
        .subcommand(
            SubCommand::with_name("drive")
                .about("🕹️  Send an actuator demand")
                .arg(truck_id())
                .arg(number_arg("throttle").help("Throttle percent (-100..100)").required(true))
                .arg(number_arg("heading").help("Desired heading in degrees").required(true)),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Stream live telemetry")
                .arg(Arg::with_name("id").help("Only this truck"))
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Monitor duration in seconds (default: infinite)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("server")
                .about("🚀 Start the fleet simulator")
                .arg(
                    Arg::with_name("background")
                        .short("b")
                        .long("background")
                        .help("Run server in background"),
                ),
        )
        .get_matches();

    let target = Target {
        host: matches.value_of("host").unwrap_or(DEFAULT_HOST),
        port: matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?,
        format: matches.value_of("format").unwrap_or("table"),
        verbose: matches.is_present("verbose"),
    };

    if target.verbose {
        println!("{}", "🚛 fleetctl".bright_blue().bold());
        println!("{} {}:{}", "Connecting to".dimmed(), target.host, target.port);
    }

    match matches.subcommand() {
        ("spawn", Some(sub)) => handle_spawn(sub, &target).await?,
        ("remove", Some(sub)) => handle_remove(sub, &target).await?,
        ("list", _) => handle_list(&target).await?,
        ("fault", Some(sub)) => handle_fault(sub, &target).await?,
        ("clear-faults", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            send_truck_command(&target, id, json!({"cmd": "clear_faults"})).await?;
        }
        ("temp-step", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            let delta = number(sub, "delta")?;
            send_truck_command(&target, id, json!({"cmd": "temp_step", "delta": delta})).await?;
        }
        ("reset", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            let command = json!({
                "cmd": "reset_position",
                "x": number(sub, "x")?,
                "y": number(sub, "y")?,
                "heading": number(sub, "heading")?,
            });
            send_truck_command(&target, id, command).await?;
        }
        ("stop", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            send_truck_command(&target, id, json!({"cmd": "stop"})).await?;
        }
        ("drive", Some(sub)) => handle_drive(sub, &target).await?,
        ("monitor", Some(sub)) => handle_monitor(sub, &target).await?,
        ("server", Some(sub)) => handle_server(sub, target.port)?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the simulator", "fleetctl server".bright_cyan());
            println!("  {} Spawn a truck", "fleetctl spawn T1".bright_cyan());
            println!("  {} Watch telemetry", "fleetctl monitor".bright_cyan());
        }
    }

    Ok(())
}

fn number_arg(name: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .takes_value(true)
        .allow_hyphen_values(true)
        .validator(|v| match v.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(()),
            _ => Err("Value must be a finite number".into()),
        })
}

fn number(matches: &ArgMatches<'_>, name: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let raw = matches.value_of(name).ok_or_else(|| format!("missing `{name}`"))?;
    Ok(raw.parse::<f64>()?)
}

async fn connect(target: &Target<'_>) -> Result<GatewayClient, GatewayError> {
    let addr = format!("{}:{}", target.host, target.port);
    match GatewayClient::connect(&addr).await {
        Ok(client) => Ok(client),
        Err(GatewayError::Io(e)) => {
            eprintln!("{} Failed to connect to fleet simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "fleetctl server".bright_cyan());
                eprintln!("   or");
                eprintln!("   {}", "cargo run --bin fleet-sim".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            Err(GatewayError::Io(e))
        }
        Err(e) => Err(e),
    }
}

/// Publishes on a truck topic and waits for the truck's log acknowledgement.
async fn publish_and_ack(
    client: &mut GatewayClient,
    target: &Target<'_>,
    id: &str,
    topic: &str,
    payload: Value,
) -> Result<Option<String>, GatewayError> {
    let log_topic = topics::log(id);
    client.subscribe(&log_topic).await?;
    if target.verbose {
        println!("{} {} {}", "→".dimmed(), topic.dimmed(), payload.to_string().dimmed());
    }
    client.publish(topic, payload).await?;

    match client.wait_for(&log_topic, REPLY_TIMEOUT).await {
        Ok(frame) => Ok(Some(frame.payload)),
        Err(GatewayError::Timeout(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn print_ack(target: &Target<'_>, action: &str, id: &str, ack: Option<&str>) {
    match (target.format, ack) {
        ("json", ack) => println!("{}", json!({"action": action, "truck_id": id, "ack": ack})),
        (_, Some(text)) => println!("{} {}", "✅".green(), text.bright_white()),
        (_, None) => {
            println!("{} {} for {}: no acknowledgement", "⏰".yellow(), action.bright_white(), id.bright_cyan());
            println!("{} Is the truck live? Try: {}", "💡".yellow(), "fleetctl list".bright_cyan());
        }
    }
}

async fn send_truck_command(target: &Target<'_>, id: &str, command: Value) -> CliResult {
    let action = command["cmd"].as_str().unwrap_or("command").to_string();
    let mut client = connect(target).await?;
    let ack = publish_and_ack(&mut client, target, id, &topics::command(id), command).await?;
    print_ack(target, &action, id, ack.as_deref());
    Ok(())
}

async fn handle_spawn(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult {
    let id = matches.value_of("id").unwrap_or_default();
    let mut client = connect(target).await?;

    let spawn = json!({"cmd": "spawn", "truck_id": id});
    let ack = publish_and_ack(&mut client, target, id, topics::SPAWN, spawn).await?;
    print_ack(target, "spawn", id, ack.as_deref());
    if ack.is_none() {
        return Ok(());
    }

    // Place the new truck explicitly, as operators expect.
    let reset = json!({
        "cmd": "reset_position",
        "x": number(matches, "x")?,
        "y": number(matches, "y")?,
        "heading": number(matches, "heading")?,
    });
    let ack = publish_and_ack(&mut client, target, id, &topics::command(id), reset).await?;
    print_ack(target, "reset_position", id, ack.as_deref());
    Ok(())
}

async fn handle_remove(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult {
    let ids: Vec<&str> = matches.values_of("ids").map(Iterator::collect).unwrap_or_default();
    let mut client = connect(target).await?;
    client.publish(topics::REMOVE, json!({"cmd": "remove", "truck_id": ids})).await?;

    match target.format {
        "json" => println!("{}", json!({"action": "remove", "truck_id": ids})),
        _ => println!("{} Remove requested for {}", "✅".green(), ids.join(", ").bright_cyan()),
    }
    Ok(())
}

async fn handle_fault(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult {
    let id = matches.value_of("id").unwrap_or_default();
    let mut command = json!({"cmd": "set_fault"});
    for flag in ["electrical", "hydraulic"] {
        if let Some(state) = matches.value_of(flag) {
            command[flag] = json!(state == "on");
        }
    }
    if command.as_object().map_or(0, serde_json::Map::len) == 1 {
        println!("{}", "Nothing to change. Pass --electrical and/or --hydraulic.".yellow());
        return Ok(());
    }
    send_truck_command(target, id, command).await
}

async fn handle_drive(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult {
    let id = matches.value_of("id").unwrap_or_default();
    let update = json!({
        "throttle_percent": number(matches, "throttle")?,
        "desired_heading": number(matches, "heading")?,
    });
    let mut client = connect(target).await?;
    client.publish(&topics::actuator(id), update.clone()).await?;

    match target.format {
        "json" => println!("{}", json!({"action": "drive", "truck_id": id, "actuator": update})),
        _ => println!(
            "{} {} throttle {}% heading {}°",
            "🕹️ ".green(),
            id.bright_cyan(),
            update["throttle_percent"],
            update["desired_heading"]
        ),
    }
    Ok(())
}

async fn handle_list(target: &Target<'_>) -> CliResult {
    let reply_to = format!("fleetctl/{}/list", std::process::id());
    let mut client = connect(target).await?;
    client.subscribe(&reply_to).await?;
    client.publish(topics::LIST, json!({"reply_to": reply_to})).await?;

    let frame = match client.wait_for(&reply_to, REPLY_TIMEOUT).await {
        Ok(frame) => frame,
        Err(GatewayError::Timeout(timeout)) => {
            eprintln!("{} No fleet listing after {:?}", "⏰".yellow(), timeout);
            eprintln!("{} Server may be overloaded or unresponsive", "💡".yellow());
            return Err("list timeout".into());
        }
        Err(e) => return Err(e.into()),
    };

    if target.format == "json" {
        println!("{}", frame.payload);
        return Ok(());
    }

    let records: Vec<TruckRecord> = serde_json::from_str(&frame.payload)?;
    print_fleet_table(&records);
    Ok(())
}

fn print_fleet_table(records: &[TruckRecord]) {
    if records.is_empty() {
        println!("{}", "No trucks live.".yellow());
        return;
    }

    println!(
        "{}",
        format!(
            "{:<10} {:>9} {:>9} {:>8} {:>7} {:>7} {:>5} {:>5}",
            "ID", "X", "Y", "HEADING", "SPEED", "TEMP", "ELEC", "HYD"
        )
        .bright_white()
        .bold()
    );
    for record in records {
        let temperature = format!("{:>7.1}", record.temperature);
        let temperature = if record.temperature > 100.0 {
            temperature.bright_red()
        } else {
            temperature.bright_green()
        };
        println!(
            "{:<10} {:>9.2} {:>9.2} {:>8.1} {:>7.2} {} {} {}",
            record.id.bright_cyan(),
            record.x,
            record.y,
            record.heading,
            record.velocity,
            temperature,
            fault_cell(record.fault_electrical),
            fault_cell(record.fault_hydraulic),
        );
    }
}

fn fault_cell(active: bool) -> ColoredString {
    if active {
        format!("{:>5}", "FAULT").bright_red().bold()
    } else {
        format!("{:>5}", "ok").green()
    }
}

async fn handle_monitor(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult {
    let filter = topics::telemetry(matches.value_of("id").unwrap_or("+"));
    let duration = matches
        .value_of("duration")
        .map(|d| d.parse::<u64>().map(Duration::from_secs))
        .transpose()?;

    let mut client = connect(target).await?;
    client.subscribe(&filter).await?;

    if target.format != "json" {
        println!("{} {}", "📈 Monitoring".bright_blue().bold(), filter.bright_white());
        println!(
            "{}",
            format!(
                "{:<10} {:>6} {:>9} {:>9} {:>8} {:>7} {:>5} {:>5}",
                "ID", "SEQ", "X", "Y", "HEADING", "TEMP", "ELEC", "HYD"
            )
            .bright_white()
        );
    }

    let stream = stream_samples(&mut client, target.format);
    match duration {
        Some(limit) => match tokio::time::timeout(limit, stream).await {
            Ok(result) => result?,
            Err(_) => println!("{}", "Monitoring finished.".dimmed()),
        },
        None => stream.await?,
    }
    Ok(())
}

async fn stream_samples(client: &mut GatewayClient, format: &str) -> Result<(), GatewayError> {
    loop {
        let frame = client.next_message().await?;
        print_sample(&frame, format);
    }
}

fn print_sample(frame: &ServerFrame, format: &str) {
    if format == "json" {
        println!("{}", frame.payload);
        return;
    }
    match serde_json::from_str::<TelemetrySample>(&frame.payload) {
        Ok(sample) => println!(
            "{:<10} {:>6} {:>9.2} {:>9.2} {:>8.1} {:>7.1} {} {}",
            sample.truck_id.bright_cyan(),
            sample.sequence,
            sample.x,
            sample.y,
            sample.heading,
            sample.temperature,
            fault_cell(sample.fault_electrical),
            fault_cell(sample.fault_hydraulic),
        ),
        Err(e) => eprintln!("{} Unreadable sample on {}: {}", "⚠️".yellow(), frame.topic, e),
    }
}

fn handle_server(matches: &ArgMatches<'_>, port: u16) -> CliResult {
    let background = matches.is_present("background");

    println!("{}", "🚀 Starting fleet simulator...".bright_green().bold());

    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--bin", "fleet-sim", "--", "--port"]).arg(port.to_string());

    if background {
        cmd.spawn()?;
        println!("{} Simulator started in background on port {}", "✅".green(), port);
    } else {
        println!("{} Simulator starting on port {} (Press Ctrl+C to stop)", "🌐".bright_blue(), port);
        cmd.status()?;
    }

    Ok(())
}
