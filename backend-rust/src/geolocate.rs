//! Location estimation seam.
//!
//! The real trilateration math lives in an external library; the service only
//! needs something that turns ≥3 observations into a position estimate. The
//! built-in estimator is a signal-weighted centroid with an
//! environment-scaled accuracy figure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub signal_dbm: Option<f64>,
    #[serde(default)]
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationEstimate {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: f64,
    pub method: String,
    pub observation_count: usize,
    pub environment: String,
}

pub trait GeoEstimator: Send + Sync {
    /// Returns None when the observation set is unusable (fewer than 3 points).
    fn estimate(&self, observations: &[Observation], environment: &str) -> Option<LocationEstimate>;
}

#[derive(Default)]
pub struct WeightedCentroidEstimator;

impl WeightedCentroidEstimator {
    fn weight(observation: &Observation) -> f64 {
        if let Some(distance) = observation.distance_m {
            return 1.0 / distance.max(1.0);
        }
        if let Some(signal) = observation.signal_dbm {
            // -30 dBm ≈ on top of the emitter, -100 dBm ≈ fringe
            return ((100.0 + signal) / 70.0).clamp(0.05, 1.0);
        }
        0.5
    }
}

impl GeoEstimator for WeightedCentroidEstimator {
    fn estimate(&self, observations: &[Observation], environment: &str) -> Option<LocationEstimate> {
        if observations.len() < 3 {
            return None;
        }

        let mut lat_sum = 0.0;
        let mut lon_sum = 0.0;
        let mut weight_sum = 0.0;
        for obs in observations {
            let w = Self::weight(obs);
            lat_sum += obs.lat * w;
            lon_sum += obs.lon * w;
            weight_sum += w;
        }
        let lat = lat_sum / weight_sum;
        let lon = lon_sum / weight_sum;

        // Mean spread of the observation set, degrees → meters (coarse)
        let spread_m = observations
            .iter()
            .map(|o| {
                let dlat = (o.lat - lat) * 111_320.0;
                let dlon = (o.lon - lon) * 111_320.0 * lat.to_radians().cos();
                (dlat * dlat + dlon * dlon).sqrt()
            })
            .sum::<f64>()
            / observations.len() as f64;

        let environment_factor = match environment {
            "indoor" => 2.0,
            "urban" => 1.5,
            _ => 1.0,
        };

        Some(LocationEstimate {
            lat,
            lon,
            accuracy_m: (spread_m * environment_factor).max(5.0),
            method: "weighted_centroid".to_string(),
            observation_count: observations.len(),
            environment: environment.to_string(),
        })
    }
}
