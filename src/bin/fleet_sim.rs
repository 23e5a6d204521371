use clap::{App, Arg};
use fleetsim::config::ServerConfig;
use fleetsim::FleetServer;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("fleet-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🚛 Autonomous haul truck fleet simulator")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Gateway bind address")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Gateway port")
                .takes_value(true)
                .validator(|v| v.parse::<u16>().map(|_| ()).map_err(|_| "Port must be 0-65535".into())),
        )
        .arg(
            Arg::with_name("dt")
                .long("dt")
                .value_name("SECONDS")
                .help("Simulation step per tick")
                .takes_value(true)
                .validator(validate_positive),
        )
        .arg(
            Arg::with_name("time-scale")
                .long("time-scale")
                .value_name("FACTOR")
                .help("Run the tick loop this many times faster than real time")
                .takes_value(true)
                .validator(validate_positive),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for reproducible sensor noise")
                .takes_value(true)
                .validator(|v| v.parse::<u64>().map(|_| ()).map_err(|_| "Seed must be an unsigned integer".into())),
        )
        .arg(
            Arg::with_name("truck")
                .short("t")
                .long("truck")
                .value_name("ID")
                .help("Spawn a truck at startup (repeatable)")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match matches.value_of("config") {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = matches.value_of("host") {
        config.host = host.to_string();
    }
    if let Some(port) = matches.value_of("port") {
        config.port = port.parse()?;
    }
    if let Some(dt) = matches.value_of("dt") {
        config.sim.dt = dt.parse()?;
    }
    if let Some(scale) = matches.value_of("time-scale") {
        config.sim.time_scale = scale.parse()?;
    }
    if let Some(seed) = matches.value_of("seed") {
        config.sim.seed = Some(seed.parse()?);
    }
    if let Some(trucks) = matches.values_of("truck") {
        config.initial_trucks.extend(trucks.map(str::to_string));
    }

    println!("🚛 Truck Fleet Simulator");
    println!("========================");

    let server = FleetServer::start(config)?;
    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %server.config().bind_addr(), error = %e, "failed to bind gateway");
            server.shutdown().await;
            return Err(e.into());
        }
    };
    info!(addr = %listener.local_addr()?, "accepting clients");

    server
        .run_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await?;

    println!("🏁 Fleet simulator stopped");
    Ok(())
}

fn validate_positive(v: String) -> Result<(), String> {
    match v.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(()),
        _ => Err("Value must be a positive number".into()),
    }
}
