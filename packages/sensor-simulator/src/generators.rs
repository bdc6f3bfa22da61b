//! generators.rs — synthetic sensor event fabrication
//!
//! Mixes drone-shaped and benign traffic so detector thresholds are exercised
//! from both sides. Remote-ID events carry a random-walked position, which
//! gives the backend track points to append.

use rand::seq::SliceRandom;
use rand::Rng;
use sensor_events::{modes, SensorEnvelope};
use serde_json::json;

const DRONE_OUIS: &[&str] = &["60:60:1F", "90:3A:E6", "00:12:1C", "48:1C:B9", "AC:89:95"];
const DRONE_SSIDS: &[&str] = &[
    "DJI-Mavic3-Pro",
    "Anafi-Thermal-01",
    "Autel-EVO-Lite",
    "Skydio-2-Plus",
    "OpenDroneID-beacon",
];
const BENIGN_SSIDS: &[&str] = &["HomeNet-5G", "CoffeeShop-Guest", "office-wlan", "printer-setup"];
const DRONE_BT_NAMES: &[&str] = &["Mavic RC", "Parrot Skycontroller", "DroneBeacon RID"];
const BENIGN_BT_NAMES: &[&str] = &["JBL Flip 5", "Keyboard K380", "Galaxy Buds"];
const RF_BANDS_MHZ: &[f64] = &[433.92, 868.0, 915.0, 2400.0, 5800.0];

pub struct EventGenerator {
    drone_ratio: f64,
    uas_lat: f64,
    uas_lon: f64,
}

impl EventGenerator {
    pub fn new(drone_ratio: f64) -> Self {
        Self {
            drone_ratio,
            uas_lat: 37.7749,
            uas_lon: -122.4194,
        }
    }

    pub fn next_event(&mut self) -> SensorEnvelope {
        let mut rng = rand::thread_rng();
        let drone = rng.gen_bool(self.drone_ratio);
        match rng.gen_range(0..4) {
            0 => self.wifi_event(drone),
            1 => self.bluetooth_event(drone),
            2 => self.rf_event(drone),
            _ => self.remote_id_event(),
        }
    }

    fn random_mac(rng: &mut impl Rng, oui: Option<&str>) -> String {
        let tail = format!(
            "{:02X}:{:02X}:{:02X}",
            rng.gen::<u8>(),
            rng.gen::<u8>(),
            rng.gen::<u8>()
        );
        match oui {
            Some(prefix) => format!("{prefix}:{tail}"),
            None => format!(
                "{:02X}:{:02X}:{:02X}:{tail}",
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                rng.gen::<u8>()
            ),
        }
    }

    fn wifi_event(&self, drone: bool) -> SensorEnvelope {
        let mut rng = rand::thread_rng();
        let (bssid, ssid) = if drone {
            let oui = DRONE_OUIS.choose(&mut rng).copied();
            (
                Self::random_mac(&mut rng, oui),
                *DRONE_SSIDS.choose(&mut rng).unwrap(),
            )
        } else {
            (
                Self::random_mac(&mut rng, None),
                *BENIGN_SSIDS.choose(&mut rng).unwrap(),
            )
        };

        SensorEnvelope::new(
            modes::WIFI,
            json!({
                "bssid": bssid,
                "ssid": ssid,
                "rssi": rng.gen_range(-90..-30),
                "channel": rng.gen_range(1..12),
            }),
        )
        .with_event_type("network_update")
    }

    fn bluetooth_event(&self, drone: bool) -> SensorEnvelope {
        let mut rng = rand::thread_rng();
        let name = if drone {
            *DRONE_BT_NAMES.choose(&mut rng).unwrap()
        } else {
            *BENIGN_BT_NAMES.choose(&mut rng).unwrap()
        };
        let uuids = if drone && rng.gen_bool(0.5) {
            json!(["0000fffa-0000-1000-8000-00805f9b34fb"])
        } else {
            json!([])
        };

        SensorEnvelope::new(
            modes::BLUETOOTH,
            json!({
                "address": Self::random_mac(&mut rng, None),
                "name": name,
                "rssi": rng.gen_range(-95..-40),
                "service_uuids": uuids,
            }),
        )
        .with_event_type("advertisement")
    }

    fn rf_event(&self, drone: bool) -> SensorEnvelope {
        let mut rng = rand::thread_rng();
        let frequency = if drone {
            RF_BANDS_MHZ.choose(&mut rng).unwrap() + rng.gen_range(-2.0..2.0)
        } else {
            // Well off the known control/video bands
            rng.gen_range(80.0..110.0)
        };

        SensorEnvelope::new(
            modes::SUBGHZ,
            json!({
                "capture_id": format!("cap-{:06}", rng.gen_range(0..1_000_000)),
                "frequency_mhz": (frequency * 1000.0).round() / 1000.0,
                "power_dbm": rng.gen_range(-70.0..-20.0),
            }),
        )
    }

    fn remote_id_event(&mut self) -> SensorEnvelope {
        let mut rng = rand::thread_rng();
        // Random-walk the simulated airframe
        self.uas_lat += rng.gen_range(-0.0005..0.0005);
        self.uas_lon += rng.gen_range(-0.0005..0.0005);

        SensorEnvelope::new(
            "remote_id_feed",
            json!({
                "uas_id": format!("UAS-{:04}", rng.gen_range(1..30)),
                "operator_id": format!("OP-{:03}", rng.gen_range(1..10)),
                "lat": self.uas_lat,
                "lon": self.uas_lon,
                "altitude_m": rng.gen_range(20.0..120.0),
                "speed_mps": rng.gen_range(0.0..18.0),
                "heading_deg": rng.gen_range(0.0..360.0),
            }),
        )
        .with_event_type("broadcast")
    }
}
