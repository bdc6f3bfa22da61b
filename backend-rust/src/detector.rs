//! Heuristics for identifying drone-related emissions across WiFi/BT/RF feeds.
//!
//! One entry point, [`detect_from_event`], dispatches on the feed mode prefix
//! and emits zero or more detection candidates. Scoring is additive per
//! carrier with an explicit threshold; an embedded Remote ID payload floors
//! the score regardless of the other evidence.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::remote_id::{decode_remote_id_payload, RemoteIdRecord};

static SSID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(^|[-_\s])(dji|mavic|phantom|inspire|matrice|mini)([-_\s]|$)").unwrap(),
        Regex::new(r"(?i)(^|[-_\s])(parrot|anafi|bebop)([-_\s]|$)").unwrap(),
        Regex::new(r"(?i)(^|[-_\s])(autel|evo)([-_\s]|$)").unwrap(),
        Regex::new(r"(?i)(^|[-_\s])(skydio|yuneec)([-_\s]|$)").unwrap(),
        Regex::new(r"(?i)(^|[-_\s])(uas|uav|drone|rid|opendroneid)([-_\s]|$)").unwrap(),
    ]
});

static BT_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(dji|mavic|phantom|inspire|matrice|mini)").unwrap(),
        Regex::new(r"(?i)(parrot|anafi|bebop)").unwrap(),
        Regex::new(r"(?i)(autel|evo)").unwrap(),
        Regex::new(r"(?i)(skydio|yuneec)").unwrap(),
        Regex::new(r"(?i)(remote\s?id|opendroneid|uas|uav|drone)").unwrap(),
    ]
});

static DRONE_OUI_PREFIXES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("60:60:1F", "DJI"),
        ("90:3A:E6", "DJI"),
        ("34:D2:62", "DJI"),
        ("90:3A:AF", "DJI"),
        ("00:12:1C", "Parrot"),
        ("90:03:B7", "Parrot"),
        ("48:1C:B9", "Autel"),
        ("AC:89:95", "Skydio"),
    ])
});

static MHZ_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9]{2,4}(?:\.[0-9]+)?)\s*MHz").unwrap());

const REMOTE_ID_UUID_HINTS: &[&str] = &["fffa", "faff", "fffb"];
const RF_FREQ_HINTS_MHZ: &[f64] = &[315.0, 433.92, 868.0, 915.0, 1200.0, 2400.0, 5800.0];

// ─── Candidate shapes ─────────────────────────────────────────────────────────

/// Track seed carried by a candidate when the Remote ID payload held a fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSeed {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub quality: Option<f64>,
    pub source: String,
}

/// A scored detection candidate, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub source: String,
    pub identifier: String,
    pub classification: String,
    pub confidence: f64,
    pub payload: Value,
    pub remote_id: Option<RemoteIdRecord>,
    pub track: Option<TrackSeed>,
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn normalize_mac(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    };
    let text = text.trim().to_uppercase().replace('-', ":");
    if text.len() >= 8 {
        text
    } else {
        String::new()
    }
}

/// Treat null and blank strings as absent so fallback keys get probed.
fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn str_field(obj: &Value, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn maybe_track_from_remote_id(remote_id: &RemoteIdRecord, source: &str) -> Option<TrackSeed> {
    if !remote_id.detected {
        return None;
    }
    let lat = remote_id.lat?;
    let lon = remote_id.lon?;
    Some(TrackSeed {
        lat,
        lon,
        altitude_m: remote_id.altitude_m,
        speed_mps: remote_id.speed_mps,
        heading_deg: remote_id.heading_deg,
        quality: Some(remote_id.confidence),
        source: source.to_string(),
    })
}

// ─── WiFi ─────────────────────────────────────────────────────────────────────

fn extract_wifi_network(event: &Value) -> Option<&Value> {
    if !event.is_object() {
        return None;
    }
    if let Some(network) = event.get("network") {
        if network.is_object() {
            return Some(network);
        }
    }
    if ["bssid", "essid", "ssid"].iter().any(|k| event.get(*k).is_some()) {
        return Some(event);
    }
    None
}

fn detect_wifi(event: &Value) -> Vec<DetectionCandidate> {
    let network = match extract_wifi_network(event) {
        Some(n) => n,
        None => return vec![],
    };

    let bssid = normalize_mac(
        non_empty(network.get("bssid"))
            .or_else(|| non_empty(network.get("mac")))
            .or_else(|| non_empty(network.get("id"))),
    );
    let ssid = {
        let essid = str_field(network, "essid");
        if !essid.is_empty() {
            essid
        } else {
            let ssid = str_field(network, "ssid");
            if !ssid.is_empty() {
                ssid
            } else {
                str_field(network, "display_name")
            }
        }
    };

    let identifier = if !bssid.is_empty() { bssid.clone() } else { ssid.clone() };
    if identifier.is_empty() {
        return vec![];
    }

    let mut score: f64 = 0.0;
    let mut reasons: Vec<String> = Vec::new();

    if !ssid.is_empty() && SSID_PATTERNS.iter().any(|p| p.is_match(&ssid)) {
        score += 0.45;
        reasons.push("ssid_pattern".to_string());
    }

    let brand_hint = if bssid.len() >= 8 {
        DRONE_OUI_PREFIXES.get(&bssid[..8]).copied()
    } else {
        None
    };
    if let Some(brand) = brand_hint {
        score += 0.45;
        reasons.push(format!("known_oui:{brand}"));
    }

    let remote_id = decode_remote_id_payload(network);
    if remote_id.detected {
        score = score.max(0.75);
        reasons.push("remote_id_payload".to_string());
    }

    if score < 0.5 {
        return vec![];
    }

    let confidence = round3(score).min(1.0);
    let classification = if remote_id.detected {
        "wifi_drone_remote_id"
    } else {
        "wifi_drone_signature"
    };
    let track = maybe_track_from_remote_id(&remote_id, "wifi");

    vec![DetectionCandidate {
        source: "wifi".to_string(),
        identifier,
        classification: classification.to_string(),
        confidence,
        payload: json!({
            "network": network,
            "reasons": reasons,
            "brand_hint": brand_hint,
        }),
        remote_id: remote_id.detected.then_some(remote_id),
        track,
    }]
}

// ─── Bluetooth ────────────────────────────────────────────────────────────────

fn extract_bt_device(event: &Value) -> Option<&Value> {
    if !event.is_object() {
        return None;
    }
    if let Some(device) = event.get("device") {
        if device.is_object() {
            return Some(device);
        }
    }
    if ["device_id", "address", "name", "manufacturer_name", "service_uuids"]
        .iter()
        .any(|k| event.get(*k).is_some())
    {
        return Some(event);
    }
    None
}

fn detect_bluetooth(event: &Value) -> Vec<DetectionCandidate> {
    let device = match extract_bt_device(event) {
        Some(d) => d,
        None => return vec![],
    };

    let address = normalize_mac(non_empty(device.get("address")).or_else(|| non_empty(device.get("mac"))));
    let device_id = str_field(device, "device_id");
    let name = str_field(device, "name");
    let manufacturer = str_field(device, "manufacturer_name");

    let identifier = if !address.is_empty() {
        address
    } else if !device_id.is_empty() {
        device_id
    } else {
        name.clone()
    };
    if identifier.is_empty() {
        return vec![];
    }

    let mut score: f64 = 0.0;
    let mut reasons: Vec<String> = Vec::new();

    let haystack = format!("{name} {manufacturer}");
    let haystack = haystack.trim();
    if !haystack.is_empty() && BT_NAME_PATTERNS.iter().any(|p| p.is_match(haystack)) {
        score += 0.55;
        reasons.push("name_or_vendor_pattern".to_string());
    }

    if let Some(Value::Array(uuids)) = device.get("service_uuids") {
        for uuid in uuids {
            let compact = match uuid {
                Value::String(s) => s.replace('-', "").to_lowercase(),
                other => other.to_string().replace('-', "").to_lowercase(),
            };
            let tail = if compact.len() >= 4 {
                &compact[compact.len() - 4..]
            } else {
                compact.as_str()
            };
            if REMOTE_ID_UUID_HINTS.contains(&tail) {
                score = score.max(0.7);
                reasons.push("remote_id_service_uuid".to_string());
                break;
            }
        }
    }

    if let Some(tracker) = device.get("tracker").filter(|t| t.is_object()) {
        let is_tracker = tracker
            .get("is_tracker")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let tracker_type = str_field(tracker, "type").to_lowercase();
        if is_tracker && tracker_type.contains("drone") {
            score = score.max(0.7);
            reasons.push("tracker_engine_drone_label".to_string());
        }
    }

    let remote_id = decode_remote_id_payload(device);
    if remote_id.detected {
        score = score.max(0.75);
        reasons.push("remote_id_payload".to_string());
    }

    if score < 0.55 {
        return vec![];
    }

    let confidence = round3(score).min(1.0);
    let classification = if remote_id.detected {
        "bluetooth_drone_remote_id"
    } else {
        "bluetooth_drone_signature"
    };
    let track = maybe_track_from_remote_id(&remote_id, "bluetooth");

    vec![DetectionCandidate {
        source: "bluetooth".to_string(),
        identifier,
        classification: classification.to_string(),
        confidence,
        payload: json!({
            "device": device,
            "reasons": reasons,
        }),
        remote_id: remote_id.detected.then_some(remote_id),
        track,
    }]
}

// ─── RF ───────────────────────────────────────────────────────────────────────

fn extract_frequency_mhz(event: &Value) -> Option<f64> {
    if !event.is_object() {
        return None;
    }

    let mut candidates: Vec<Option<f64>> = vec![
        value_as_f64(event.get("frequency_mhz")),
        value_as_f64(event.get("frequency")),
    ];
    if let Some(hz) = value_as_f64(event.get("frequency_hz")) {
        candidates.push(Some(hz / 1_000_000.0));
    }

    for candidate in candidates.into_iter().flatten() {
        let mut f = candidate;
        if f > 100_000.0 {
            // likely in Hz
            f /= 1_000_000.0;
        }
        if (1.0..=7000.0).contains(&f) {
            return Some((f * 1_000_000.0).round() / 1_000_000.0);
        }
    }

    let text = {
        let t = str_field(event, "text");
        if !t.is_empty() {
            t
        } else {
            str_field(event, "message")
        }
    };
    MHZ_TEXT_RE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn closest_freq_delta(freq_mhz: f64) -> f64 {
    RF_FREQ_HINTS_MHZ
        .iter()
        .map(|hint| (freq_mhz - hint).abs())
        .fold(f64::INFINITY, f64::min)
}

fn detect_rf(event: &Value) -> Vec<DetectionCandidate> {
    let freq_mhz = match extract_frequency_mhz(event) {
        Some(f) => f,
        None => return vec![],
    };

    let delta = closest_freq_delta(freq_mhz);
    if delta > 35.0 {
        return vec![];
    }

    let score = (0.85 - delta / 100.0).max(0.5);
    let confidence = round3(score).min(1.0);

    let event_id = {
        let capture = str_field(event, "capture_id");
        if !capture.is_empty() {
            capture
        } else {
            let id = str_field(event, "id");
            if !id.is_empty() {
                id
            } else {
                format!("{freq_mhz:.3}MHz")
            }
        }
    };

    vec![DetectionCandidate {
        source: "rf".to_string(),
        identifier: format!("rf:{event_id}"),
        classification: "rf_drone_link_activity".to_string(),
        confidence,
        payload: json!({
            "event": event,
            "frequency_mhz": freq_mhz,
            "delta_from_known_band_mhz": round3(delta),
            "known_bands_mhz": RF_FREQ_HINTS_MHZ,
        }),
        remote_id: None,
        track: None,
    }]
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

/// Detect drone-relevant signals from a normalized mode event.
pub fn detect_from_event(mode: &str, event: &Value, event_type: Option<&str>) -> Vec<DetectionCandidate> {
    let mode_lower = mode.trim().to_lowercase();

    if mode_lower.starts_with("wifi") {
        return detect_wifi(event);
    }
    if mode_lower.starts_with("bluetooth") || mode_lower.starts_with("bt") {
        return detect_bluetooth(event);
    }
    if matches!(
        mode_lower.as_str(),
        "subghz" | "listening_scanner" | "waterfall" | "listening"
    ) {
        return detect_rf(event);
    }

    // Opportunistic decode from any feed that carries explicit remote ID payloads.
    let remote_id = decode_remote_id_payload(event);
    if remote_id.detected {
        let identifier = remote_id
            .uas_id
            .clone()
            .or_else(|| remote_id.operator_id.clone())
            .unwrap_or_else(|| "remote_id".to_string());
        let source = if mode_lower.is_empty() {
            "unknown".to_string()
        } else {
            mode_lower.clone()
        };
        let confidence = if remote_id.confidence > 0.0 {
            remote_id.confidence
        } else {
            0.6
        };
        let track = maybe_track_from_remote_id(&remote_id, &source);
        return vec![DetectionCandidate {
            source,
            identifier,
            classification: "remote_id_detected".to_string(),
            confidence,
            payload: json!({"event": event, "event_type": event_type}),
            remote_id: Some(remote_id),
            track,
        }];
    }

    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wifi_ssid_and_oui_score_together() {
        let event = json!({"bssid": "60:60:1F:AA:BB:CC", "ssid": "DJI-OPS-TEST"});
        let hits = detect_from_event("wifi", &event, Some("network_update"));
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.source, "wifi");
        assert_eq!(hit.classification, "wifi_drone_signature");
        assert_eq!(hit.identifier, "60:60:1F:AA:BB:CC");
        assert!(hit.confidence >= 0.9);
    }

    #[test]
    fn wifi_plain_network_stays_quiet() {
        let event = json!({"bssid": "AA:BB:CC:DD:EE:FF", "ssid": "HomeNet"});
        assert!(detect_from_event("wifi", &event, None).is_empty());
    }

    #[test]
    fn wifi_remote_id_payload_floors_score() {
        let event = json!({
            "network": {
                "bssid": "AA:BB:CC:00:11:22",
                "ssid": "nondescript",
                "remote_id": {"uas_id": "UAS-77", "lat": 1.0, "lon": 2.0},
            }
        });
        let hits = detect_from_event("wifi_scan", &event, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].classification, "wifi_drone_remote_id");
        assert!(hits[0].confidence >= 0.75);
        let track = hits[0].track.as_ref().expect("track seed");
        assert_eq!(track.lat, 1.0);
        assert_eq!(track.lon, 2.0);
    }

    #[test]
    fn bluetooth_service_uuid_hint() {
        let event = json!({
            "address": "11:22:33:44:55:66",
            "name": "unremarkable",
            "service_uuids": ["0000fffa-0000-1000-8000-00805f9b34fb"],
        });
        let hits = detect_from_event("bluetooth", &event, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "bluetooth");
        assert_eq!(hits[0].confidence, 0.7);
        assert_eq!(hits[0].identifier, "11:22:33:44:55:66");
    }

    #[test]
    fn bluetooth_name_below_threshold_without_pattern() {
        let event = json!({"address": "11:22:33:44:55:66", "name": "headphones"});
        assert!(detect_from_event("bt", &event, None).is_empty());
    }

    #[test]
    fn rf_band_match_scores_by_delta() {
        let event = json!({"frequency_mhz": 868.5});
        let hits = detect_from_event("subghz", &event, None);
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.source, "rf");
        assert_eq!(hit.classification, "rf_drone_link_activity");
        assert!((hit.confidence - 0.845).abs() < 1e-9);
    }

    #[test]
    fn rf_far_from_known_bands_is_dropped() {
        let event = json!({"frequency_mhz": 600.0});
        assert!(detect_from_event("waterfall", &event, None).is_empty());
    }

    #[test]
    fn rf_hz_values_are_scaled() {
        let event = json!({"frequency_hz": 433920000.0, "capture_id": "cap-9"});
        let hits = detect_from_event("listening_scanner", &event, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identifier, "rf:cap-9");
        assert!((hits[0].confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn rf_frequency_parsed_from_text() {
        let event = json!({"message": "burst near 915 MHz observed", "id": "b1"});
        let hits = detect_from_event("listening", &event, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identifier, "rf:b1");
    }

    #[test]
    fn unknown_mode_probes_remote_id_opportunistically() {
        let event = json!({"uas_id": "OPP-1", "lat": 4.5, "lon": 5.5});
        let hits = detect_from_event("mesh", &event, Some("telemetry"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].classification, "remote_id_detected");
        assert_eq!(hits[0].identifier, "OPP-1");
        assert!(hits[0].track.is_some());
    }

    #[test]
    fn unknown_mode_without_remote_id_is_silent() {
        let event = json!({"noise": true});
        assert!(detect_from_event("mesh", &event, None).is_empty());
    }
}
