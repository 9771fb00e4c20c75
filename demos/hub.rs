//! Traffic hub demo with a synthetic traffic feed
//!
//! Run with: cargo run --example hub [CLIENT_IP...]
//!
//! Examples:
//!   cargo run --example hub                    # discover clients from DHCP/ARP
//!   cargo run --example hub 192.168.10.20      # also send to a fixed client
//!
//! GDL90 goes out on UDP port 4000 to every discovered client and to
//! anyone connecting to TCP port 4000. Clients can announce sleep/wake by
//! sending `CANNOT_RECEIVE` / `CAN_RECEIVE` to UDP port 4001.
//!
//! Three synthetic aircraft circle the ownship position, fed from a 1090ES,
//! a UAT and a FLARM "receiver".

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use traffic_hub::{
    Capabilities, ConnectionRegistry, DeliveryStats, Dispatcher, DispatcherConfig, GeoPoint,
    LivenessListener, NetworkConfig, OwnshipConfig, Situation, SituationStore, TcpOutputListener,
    TrafficSource, TrafficTable, TrafficUpdate,
};

const HOME: (f64, f64) = (42.2162, -83.3554);

fn print_usage() {
    eprintln!("Usage: hub [CLIENT_IP...]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  CLIENT_IP   Extra client to send to (in addition to DHCP/ARP discovery)");
}

/// Feed one synthetic target per receiver, each flying a circle
async fn synthetic_feed(table: Arc<TrafficTable>) {
    let targets = [
        (TrafficSource::Es1090, 0xA1B2C3u32, "N123AB", 0.05, 4500),
        (TrafficSource::Uat, 0xA4D5E6, "N456CD", 0.08, 6500),
        (TrafficSource::Flarm, 0x3E1F2A, "DGLID", 0.03, 3200),
    ];

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut step = 0u32;
    loop {
        ticker.tick().await;
        step = step.wrapping_add(1);

        for (i, (source, address, callsign, radius, altitude)) in targets.iter().enumerate() {
            let angle = (step as f64 * 0.5 + i as f64 * 120.0).to_radians();
            let lat = HOME.0 + radius * angle.cos();
            let lon = HOME.1 + radius * angle.sin();
            let track = (step as f64 * 0.5 + i as f64 * 120.0 + 90.0).rem_euclid(360.0);

            let update = TrafficUpdate::new(*source, *address)
                .position(lat, lon)
                .altitude(*altitude, *source == TrafficSource::Flarm)
                .velocity(track, 110.0)
                .vertical_rate(0.0)
                .callsign(*callsign)
                .emitter_category(1);
            table.upsert(update);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("traffic_hub=debug".parse()?)
                .add_directive("hub=debug".parse()?),
        )
        .init();

    let mut network = NetworkConfig::default();
    for arg in &args {
        let ip: IpAddr = match arg.parse() {
            Ok(ip) => ip,
            Err(e) => {
                eprintln!("Error: invalid client IP '{}': {}", arg, e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        };
        network = network.static_ip(ip);
    }
    let liveness_addr = network.liveness_addr;

    let stats = Arc::new(DeliveryStats::new());
    let registry = ConnectionRegistry::bind(network, stats).await?;
    registry.sync_leases().await?;
    let _rescan = registry.spawn_rescan_task();

    let tcp = TcpOutputListener::bind(
        SocketAddr::from(([0, 0, 0, 0], 4000)),
        Capabilities::GDL90 | Capabilities::AHRS_GDL90,
        Arc::clone(&registry),
    )
    .await?;
    let _tcp = tcp.spawn();
    let _liveness = LivenessListener::bind(liveness_addr, Arc::clone(&registry)).await?.spawn();

    let situation = SituationStore::new();
    situation.set(Situation {
        gps_valid: true,
        position: Some(GeoPoint::new(HOME.0, HOME.1)),
        pressure_altitude_ft: Some(2500.0),
        msl_altitude_ft: Some(2600.0),
        hae_altitude_ft: Some(2480.0),
        vertical_accuracy_m: Some(4.0),
        track_deg: Some(270.0),
        ground_speed_kt: Some(95.0),
        vertical_speed_fpm: Some(0.0),
        nacp: 10,
        ..Situation::default()
    });

    let table = Arc::new(TrafficTable::new());
    let _feed = tokio::spawn(synthetic_feed(Arc::clone(&table)));

    let config = DispatcherConfig::default().ownship(OwnshipConfig::default().callsign("DEMO"));
    let (dispatcher, _handle) = Dispatcher::new(table, situation, Arc::clone(&registry), config);

    println!("Traffic hub running");
    println!("  UDP 4000   -> discovered clients");
    println!("  TCP 4000   -> stream clients");
    println!("  UDP {}   <- CAN_RECEIVE / CANNOT_RECEIVE", liveness_addr.port());
    println!();

    tokio::select! {
        _ = dispatcher.run() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    registry.close_all().await;
    Ok(())
}
