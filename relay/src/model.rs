use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on identifier-like string fields (device id, location).
pub const MAX_ID_LEN: usize = 128;

/// Irrigation pump relay state, reported verbatim by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PumpState {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

/// Environmental/irrigation telemetry (field garden nodes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub rain_level: f64,
    pub pump_state: PumpState,
}

/// Structural-health telemetry (vibration nodes on bridges and spans).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub vibration_x: f64,
    pub vibration_y: f64,
    pub vibration_z: f64,
    pub temperature_c: f64,
    pub humidity_percent: f64,
    pub battery_voltage: f64,
    pub error_code: u32,
}

/// One validated telemetry record. The variant is selected at ingestion time
/// by which required-field set the upstream payload carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reading {
    Environmental(EnvironmentalReading),
    Structural(StructuralReading),
}

impl Reading {
    pub fn device_id(&self) -> &str {
        match self {
            Reading::Environmental(r) => &r.device_id,
            Reading::Structural(r) => &r.device_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Reading::Environmental(r) => r.timestamp,
            Reading::Structural(r) => r.timestamp,
        }
    }
}

/// A reading after persistence. `seq` is the store-assigned sequence id,
/// used by viewers as a stable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub seq: i64,
    #[serde(flatten)]
    pub reading: Reading,
}
