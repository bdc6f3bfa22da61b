//! udp_tx.rs — UDP transmitter for sensor event envelopes
//!
//! Send errors are logged but never crash the simulator.

use std::net::UdpSocket;

use sensor_events::SensorEnvelope;
use tracing::{debug, warn};

pub struct UdpTransmitter {
    socket: UdpSocket,
    target: String,
}

impl UdpTransmitter {
    pub fn new(target: &str) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target: target.to_string(),
        })
    }

    pub fn send(&self, envelope: &SensorEnvelope) {
        let bytes = match serde_json::to_vec(envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!("UDP: serialize failed: {e}");
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&bytes, &self.target) {
            warn!("UDP: send failed: {e}");
        } else {
            debug!("UDP → {} mode={}", self.target, envelope.mode);
        }
    }
}
