//! Remote ID payload normalization and lightweight decoding.
//!
//! Feeds hand us anything: structured maps, JSON text, raw byte blobs, or
//! opaque strings. Everything funnels through one normalization path and comes
//! out as a fixed-shape [`RemoteIdRecord`] with an additive confidence score.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DRONE_ID_KEYS: &[&str] = &["uas_id", "drone_id", "serial_number", "serial", "id", "uasId"];
const OPERATOR_ID_KEYS: &[&str] = &["operator_id", "pilot_id", "operator", "operatorId"];
const LAT_KEYS: &[&str] = &["lat", "latitude"];
const LON_KEYS: &[&str] = &["lon", "lng", "longitude"];
const ALT_KEYS: &[&str] = &["alt", "altitude", "altitude_m", "height"];
const SPEED_KEYS: &[&str] = &["speed", "speed_mps", "ground_speed"];
const HEADING_KEYS: &[&str] = &["heading", "heading_deg", "course"];

const ID_PREFIXES: &[&str] = &["remote_id", "message", "uas"];
const OPERATOR_PREFIXES: &[&str] = &["remote_id", "message", "operator"];
const POSITION_PREFIXES: &[&str] = &["remote_id", "message", "position"];

// ─── Input union ──────────────────────────────────────────────────────────────

/// Open-unioned decoder input, normalized at the boundary.
#[derive(Debug, Clone)]
pub enum RemoteIdPayload {
    Dict(Map<String, Value>),
    Json(String),
    Bytes(Vec<u8>),
    Raw(String),
}

impl From<Value> for RemoteIdPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Dict(map),
            Value::String(text) => Self::Json(text),
            Value::Null => Self::Raw(String::new()),
            other => Self::Raw(other.to_string()),
        }
    }
}

impl From<&Value> for RemoteIdPayload {
    fn from(value: &Value) -> Self {
        value.clone().into()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Dict,
    Json,
    Raw,
    Empty,
}

// ─── Decoded record ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIdRecord {
    pub detected: bool,
    pub source_format: SourceFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uas_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    pub confidence: f64,
    pub raw: Value,
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn get_nested<'a>(data: &'a Map<String, Value>, prefix: &str, key: &str) -> Option<&'a Value> {
    match data.get(prefix) {
        Some(Value::Object(inner)) => inner.get(key),
        _ => None,
    }
}

/// Probe `keys` at the top level first (a present-but-null key wins there),
/// then under each nested prefix, skipping nulls.
fn pick<'a>(data: &'a Map<String, Value>, keys: &[&str], prefixes: &[&str]) -> Option<&'a Value> {
    for key in keys {
        if let Some(value) = data.get(*key) {
            return Some(value);
        }
    }
    for prefix in prefixes {
        for key in keys {
            if let Some(value) = get_nested(data, prefix, key) {
                if !value.is_null() {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn coerce_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::Bool(b)) => *b,
        Some(Value::Object(m)) => !m.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        _ => false,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn normalize_input(payload: RemoteIdPayload) -> (Map<String, Value>, SourceFormat) {
    let text = match payload {
        RemoteIdPayload::Dict(map) => return (map, SourceFormat::Dict),
        RemoteIdPayload::Bytes(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        RemoteIdPayload::Json(text) | RemoteIdPayload::Raw(text) => text.trim().to_string(),
    };

    if text.is_empty() {
        return (Map::new(), SourceFormat::Empty);
    }

    // JSON-first parsing; only a top-level object counts as structured.
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
        return (map, SourceFormat::Json);
    }

    let mut map = Map::new();
    map.insert("raw".to_string(), Value::String(text));
    (map, SourceFormat::Raw)
}

// ─── Decoder ──────────────────────────────────────────────────────────────────

/// Decode/normalize a Remote ID-like payload into a common shape.
pub fn decode_remote_id_payload(payload: impl Into<RemoteIdPayload>) -> RemoteIdRecord {
    let (data, source_format) = normalize_input(payload.into());

    let drone_id = pick(&data, DRONE_ID_KEYS, ID_PREFIXES);
    let operator_id = pick(&data, OPERATOR_ID_KEYS, OPERATOR_PREFIXES);

    let lat = coerce_float(pick(&data, LAT_KEYS, POSITION_PREFIXES));
    let lon = coerce_float(pick(&data, LON_KEYS, POSITION_PREFIXES));
    let altitude_m = coerce_float(pick(&data, ALT_KEYS, POSITION_PREFIXES));
    let speed_mps = coerce_float(pick(&data, SPEED_KEYS, POSITION_PREFIXES));
    let heading_deg = coerce_float(pick(&data, HEADING_KEYS, POSITION_PREFIXES));

    let uas_id = if truthy(drone_id) {
        drone_id.map(stringify)
    } else {
        None
    };
    let operator = if truthy(operator_id) {
        operator_id.map(stringify)
    } else {
        None
    };

    let mut confidence: f64 = 0.0;
    if uas_id.is_some() {
        confidence += 0.35;
    }
    if lat.is_some() && lon.is_some() {
        confidence += 0.35;
    }
    if altitude_m.is_some() {
        confidence += 0.15;
    }
    if operator.is_some() {
        confidence += 0.15;
    }
    let confidence = round3(confidence.min(1.0));

    let detected = uas_id.is_some() || (lat.is_some() && lon.is_some() && confidence >= 0.35);

    RemoteIdRecord {
        detected,
        source_format,
        uas_id,
        operator_id: operator,
        lat,
        lon,
        altitude_m,
        speed_mps,
        heading_deg,
        confidence,
        raw: Value::Object(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_dict_payload() {
        let payload = json!({
            "remote_id": {
                "uas_id": "UAS-001",
                "operator_id": "OP-007",
                "lat": 37.7749,
                "lon": -122.4194,
                "altitude_m": 121.5,
                "speed_mps": 12.3,
                "heading_deg": 270.0,
            }
        });

        let decoded = decode_remote_id_payload(payload);
        assert!(decoded.detected);
        assert_eq!(decoded.source_format, SourceFormat::Dict);
        assert_eq!(decoded.uas_id.as_deref(), Some("UAS-001"));
        assert_eq!(decoded.operator_id.as_deref(), Some("OP-007"));
        assert_eq!(decoded.lat, Some(37.7749));
        assert_eq!(decoded.lon, Some(-122.4194));
        assert_eq!(decoded.altitude_m, Some(121.5));
        assert_eq!(decoded.speed_mps, Some(12.3));
        assert_eq!(decoded.heading_deg, Some(270.0));
        assert_eq!(decoded.confidence, 1.0);
    }

    #[test]
    fn decodes_json_string_with_alt_coercion() {
        let payload = r#"{"uas_id":"RID-ABC","lat":35.0,"lon":-115.0,"altitude":80}"#;

        let decoded = decode_remote_id_payload(RemoteIdPayload::Json(payload.to_string()));
        assert!(decoded.detected);
        assert_eq!(decoded.source_format, SourceFormat::Json);
        assert_eq!(decoded.uas_id.as_deref(), Some("RID-ABC"));
        assert_eq!(decoded.lat, Some(35.0));
        assert_eq!(decoded.lon, Some(-115.0));
        assert_eq!(decoded.altitude_m, Some(80.0));
        // uas 0.35 + position 0.35 + altitude 0.15
        assert!(decoded.confidence >= 0.85);
    }

    #[test]
    fn opaque_text_is_raw_and_not_detected() {
        let decoded = decode_remote_id_payload(RemoteIdPayload::Raw("not-a-remote-id-payload".into()));
        assert!(!decoded.detected);
        assert_eq!(decoded.source_format, SourceFormat::Raw);
        assert!(decoded.uas_id.is_none());
        assert!(decoded.operator_id.is_none());
        assert_eq!(decoded.raw["raw"], "not-a-remote-id-payload");
    }

    #[test]
    fn empty_bytes_are_empty_format() {
        let decoded = decode_remote_id_payload(RemoteIdPayload::Bytes(b"   ".to_vec()));
        assert!(!decoded.detected);
        assert_eq!(decoded.source_format, SourceFormat::Empty);
        assert_eq!(decoded.confidence, 0.0);
    }

    #[test]
    fn position_only_payload_detects_at_threshold() {
        let decoded = decode_remote_id_payload(json!({"lat": 51.5, "lon": -0.1}));
        assert!(decoded.detected);
        assert_eq!(decoded.confidence, 0.35);
        assert!(decoded.uas_id.is_none());
    }

    #[test]
    fn non_coercible_numbers_become_none() {
        let decoded = decode_remote_id_payload(json!({
            "uas_id": "X1",
            "lat": "not-a-number",
            "lon": -115.0,
        }));
        assert!(decoded.lat.is_none());
        // uas only: no position bonus
        assert_eq!(decoded.confidence, 0.35);
    }

    #[test]
    fn round_trips_through_json_text() {
        let original = json!({
            "uas_id": "RT-1",
            "operator_id": "OP-9",
            "lat": 12.5,
            "lon": 99.25,
            "altitude_m": 30,
        });
        let text = serde_json::to_string(&original).unwrap();
        let decoded = decode_remote_id_payload(RemoteIdPayload::Json(text));
        assert_eq!(decoded.uas_id.as_deref(), Some("RT-1"));
        assert_eq!(decoded.operator_id.as_deref(), Some("OP-9"));
        assert_eq!(decoded.lat, Some(12.5));
        assert_eq!(decoded.lon, Some(99.25));
        assert_eq!(decoded.altitude_m, Some(30.0));
    }
}
