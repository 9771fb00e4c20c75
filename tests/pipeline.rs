//! End-to-end: traffic in, GDL90 datagrams out over localhost UDP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use traffic_hub::protocol::{decode_lat_lon, decode_report, split_frames};
use traffic_hub::server::{LeaseSource, LinkStatus, StaticLeases};
use traffic_hub::traffic::{AddressSpace, AddressType};
use traffic_hub::{
    Capabilities, ConnectionRegistry, DeliveryStats, Dispatcher, DispatcherConfig, LivenessListener,
    NetworkConfig, NetworkOutput, SituationStore, TrafficKey, TrafficSource, TrafficTable,
    TrafficUpdate,
};

/// One quantization step of the 24-bit lat/lon encoding
const LAT_LON_STEP: f64 = 180.0 / 8_388_608.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Hub {
    client: UdpSocket,
    registry: Arc<ConnectionRegistry>,
    table: Arc<TrafficTable>,
    dispatcher: Dispatcher,
}

async fn hub(network: NetworkConfig) -> Hub {
    init_tracing();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = client.local_addr().unwrap().port();

    let network = network
        .udp_bind_addr("127.0.0.1:0".parse().unwrap())
        .outputs(vec![NetworkOutput::new(port, Capabilities::GDL90)]);
    let leases: Arc<dyn LeaseSource> = Arc::new(StaticLeases::new(vec!["127.0.0.1".parse().unwrap()]));
    let registry = ConnectionRegistry::with_leases(network, leases, Arc::new(DeliveryStats::new()))
        .await
        .unwrap();
    registry.sync_leases().await.unwrap();

    let table = Arc::new(TrafficTable::new());
    let (dispatcher, _handle) = Dispatcher::new(
        Arc::clone(&table),
        SituationStore::new(),
        Arc::clone(&registry),
        DispatcherConfig::default(),
    );

    Hub {
        client,
        registry,
        table,
        dispatcher,
    }
}

/// Collect payloads until the socket has been quiet for `quiet`
async fn recv_payloads(socket: &UdpSocket, quiet: Duration) -> Vec<Bytes> {
    let mut payloads = Vec::new();
    let mut buf = vec![0u8; 4096];
    while let Ok(Ok((n, _))) = tokio::time::timeout(quiet, socket.recv_from(&mut buf)).await {
        payloads.extend(split_frames(&buf[..n]));
    }
    payloads
}

#[tokio::test]
async fn test_fusion_encode_and_evict() {
    let hub = hub(NetworkConfig::default().disable_throttle()).await;
    let t0 = Instant::now();
    let wall = Utc::now();

    assert!(hub.table.upsert_at(
        TrafficUpdate::new(TrafficSource::Es1090, 0xABCDEF)
            .position(42.0, -83.0)
            .altitude(3500, false),
        t0,
        wall,
    ));
    // Same raw 24 bits, but a non-ICAO address from FLARM
    assert!(hub.table.upsert_at(
        TrafficUpdate::new(TrafficSource::Flarm, 0xABCDEF)
            .address_type(AddressType::AdsbSelfAssigned)
            .position(42.01, -83.01)
            .altitude(3600, true),
        t0 + Duration::from_millis(500),
        wall,
    ));

    let keys: Vec<TrafficKey> = hub.table.snapshot_at(t0 + Duration::from_secs(1)).iter().map(|r| r.key).collect();
    assert_eq!(
        keys,
        vec![
            TrafficKey::new(AddressSpace::Icao, 0xABCDEF),
            TrafficKey::new(AddressSpace::NonIcao, 0xABCDEF),
        ]
    );

    hub.dispatcher.tick(t0 + Duration::from_secs(1), wall).await;
    let payloads = recv_payloads(&hub.client, Duration::from_millis(300)).await;

    let ids: Vec<u8> = payloads.iter().map(|p| p[0]).collect();
    assert_eq!(ids, vec![0x00, 0xCC, 0x65, 0x14, 0x14]);

    let icao = payloads
        .iter()
        .filter_map(|p| decode_report(p))
        .find(|r| r.address_type == AddressType::AdsbIcao as u8)
        .unwrap();
    assert_eq!(icao.address, 0xABCDEF);
    assert_eq!(icao.altitude_ft, Some(3500));
    // Lat/lon round-trip within one quantization step
    assert!((icao.lat - 42.0).abs() <= LAT_LON_STEP);
    assert!((icao.lon + 83.0).abs() <= LAT_LON_STEP);
    assert!((decode_lat_lon(traffic_hub::protocol::encode_lat_lon(42.0)) - 42.0).abs() <= LAT_LON_STEP);

    assert_eq!(hub.table.evict(t0 + Duration::from_secs(61)), 2);
    assert!(hub.table.snapshot_at(t0 + Duration::from_secs(61)).is_empty());
}

#[tokio::test]
async fn test_sleeping_client_gets_queued_traffic_on_wake() {
    let hub = hub(NetworkConfig::default().disable_throttle()).await;
    let liveness = LivenessListener::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&hub.registry))
        .await
        .unwrap();
    let liveness_addr: SocketAddr = liveness.local_addr().unwrap();
    let liveness_task = liveness.spawn();

    let conn = hub.registry.connections().await.pop().unwrap();
    hub.client.send_to(b"CANNOT_RECEIVE", liveness_addr).await.unwrap();
    for _ in 0..200 {
        if conn.status(Instant::now()) == LinkStatus::Asleep {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(conn.status(Instant::now()), LinkStatus::Asleep);

    let now = Instant::now();
    hub.table.upsert_at(
        TrafficUpdate::new(TrafficSource::Uat, 0xA12345)
            .position(42.0, -83.0)
            .callsign("N12345"),
        now,
        Utc::now(),
    );
    hub.dispatcher.tick(now, Utc::now()).await;

    // Heartbeats are dropped, traffic waits in the queue
    assert!(recv_payloads(&hub.client, Duration::from_millis(200)).await.is_empty());
    assert_eq!(conn.queue_len(), 1);
    assert_eq!(hub.registry.stats().snapshot().dropped_sleeping, 3);

    hub.client.send_to(b"CAN_RECEIVE", liveness_addr).await.unwrap();
    let payloads = recv_payloads(&hub.client, Duration::from_millis(500)).await;
    assert_eq!(payloads.len(), 1);
    let report = decode_report(&payloads[0]).unwrap();
    assert_eq!(report.address, 0xA12345);
    assert_eq!(report.callsign, "N12345");
    assert_eq!(conn.queue_len(), 0);

    liveness_task.abort();
}

#[tokio::test]
async fn test_new_client_is_throttled() {
    let hub = hub(NetworkConfig::default().throttle_pass_every(1000)).await;
    let now = Instant::now();
    for i in 0..3u32 {
        hub.table.upsert_at(
            TrafficUpdate::new(TrafficSource::Es1090, 0xC00000 + i).position(42.0, -83.0 + i as f64 * 0.01),
            now,
            Utc::now(),
        );
    }

    hub.dispatcher.tick(now, Utc::now()).await;
    let payloads = recv_payloads(&hub.client, Duration::from_millis(300)).await;

    // Critical messages pass, the first traffic batch passes the 1-in-N
    // gate, nothing else is sent during warm-up
    let ids: Vec<u8> = payloads.iter().map(|p| p[0]).collect();
    assert_eq!(ids, vec![0x00, 0xCC, 0x65, 0x14, 0x14, 0x14]);

    // Second cycle: traffic is held back
    hub.dispatcher.tick(now + Duration::from_secs(1), Utc::now()).await;
    let payloads = recv_payloads(&hub.client, Duration::from_millis(300)).await;
    let ids: Vec<u8> = payloads.iter().map(|p| p[0]).collect();
    assert_eq!(ids, vec![0x00, 0xCC, 0x65]);
    let conn = hub.registry.connections().await.pop().unwrap();
    assert_eq!(conn.queue_len(), 1);
}
