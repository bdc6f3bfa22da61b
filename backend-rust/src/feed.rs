//! UDP sensor feed listener.
//!
//! Collaborating scanners ship observations as JSON datagrams using the
//! `sensor-events` envelope (`{mode, event_type?, event}`). Each datagram is
//! handed to the service's ingestion pipeline. Malformed packets are logged
//! and dropped; receive errors never crash the server.

use std::net::SocketAddr;
use std::sync::Arc;

use sensor_events::SensorEnvelope;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::service::DroneOpsService;

// ─── Configuration ────────────────────────────────────────────────────────────

pub struct FeedConfig {
    /// UDP port to listen on (default 5575)
    pub udp_port: u16,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            udp_port: std::env::var("DRONE_FEED_UDP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5575),
        }
    }
}

// ─── Listener task ────────────────────────────────────────────────────────────

/// Start the sensor feed UDP listener as a background Tokio task.
pub async fn start_sensor_feed(config: FeedConfig, service: Arc<DroneOpsService>) {
    let addr = format!("0.0.0.0:{}", config.udp_port);
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!("Sensor feed listening on UDP {addr}");
            s
        }
        Err(e) => {
            warn!("Sensor feed: could not bind UDP {addr}: {e} (feed disabled)");
            return;
        }
    };

    let mut buf = vec![0u8; 65536];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                process_datagram(&buf[..len], src, &service).await;
            }
            Err(e) => {
                warn!("Sensor feed: UDP recv error: {e}");
            }
        }
    }
}

async fn process_datagram(data: &[u8], src: SocketAddr, service: &Arc<DroneOpsService>) {
    let envelope: SensorEnvelope = match serde_json::from_slice(data) {
        Ok(e) => e,
        Err(e) => {
            debug!("Sensor feed: malformed datagram from {src}: {e}");
            return;
        }
    };

    debug!(
        "Sensor feed: {} event from {src} ({} bytes)",
        envelope.mode,
        data.len()
    );

    record_device_observation(&envelope, service).await;
    service
        .ingest_event(&envelope.mode, &envelope.event, envelope.event_type.as_deref())
        .await;
}

/// Keep the device cache fresh so correlation refresh has observations to
/// pair. WiFi events land in the network cache, BT events in the device cache.
async fn record_device_observation(envelope: &SensorEnvelope, service: &Arc<DroneOpsService>) {
    let mode = envelope.mode.to_lowercase();
    let mac = envelope
        .event
        .get("bssid")
        .or_else(|| envelope.event.get("address"))
        .or_else(|| envelope.event.get("mac"))
        .and_then(|v| v.as_str());
    let Some(mac) = mac else {
        return;
    };

    let mut record = envelope.event.clone();
    if let Some(obj) = record.as_object_mut() {
        obj.entry("last_seen".to_string())
            .or_insert_with(|| chrono::Utc::now().timestamp().into());
    }

    if mode.starts_with("wifi") {
        service.devices().record_wifi_network(mac, record).await;
    } else if mode.starts_with("bluetooth") || mode.starts_with("bt") {
        service.devices().record_bt_device(mac, record).await;
    }
}
