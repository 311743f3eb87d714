use crate::model::{EnvironmentalReading, PumpState, Reading, StructuralReading};
use serde::Serialize;

// Structural status bands.
const TEMP_LOW_C: f64 = 0.0;
const TEMP_HIGH_C: f64 = 40.0;
const HUMIDITY_LOW: f64 = 30.0;
const HUMIDITY_HIGH: f64 = 80.0;
const BATTERY_LOW_V: f64 = 3.4;
const BATTERY_HIGH_V: f64 = 4.1;

// Structural danger limits. Z sits near 1g at rest.
const VIBRATION_LIMIT_G: f64 = 0.3;
const VIBRATION_Z_REST_G: f64 = 1.0;
const VIBRATION_Z_TOLERANCE_G: f64 = 0.4;
const DANGER_TEMP_LOW_C: f64 = -5.0;
const DANGER_TEMP_HIGH_C: f64 = 50.0;
const DANGER_HUMIDITY_LOW: f64 = 10.0;
const DANGER_HUMIDITY_HIGH: f64 = 95.0;
const DANGER_BATTERY_V: f64 = 3.0;

// Environmental status bands, from the irrigation controller's rules.
const ENV_TEMP_LOW_C: f64 = 15.0;
const ENV_TEMP_HIGH_C: f64 = 31.0;
const ENV_HUMIDITY_LOW: f64 = 50.0;
const ENV_HUMIDITY_HIGH: f64 = 80.0;
// Analog rain sensor reads above this when dry.
const RAIN_WET_THRESHOLD: f64 = 4000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeHealth {
    Ok,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralStatus {
    pub temperature: Level,
    pub humidity: Level,
    pub battery: Level,
    pub node_health: NodeHealth,
    pub danger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalStatus {
    pub temperature: Level,
    pub humidity: Level,
    pub raining: bool,
    pub pump: PumpState,
}

/// Derived status of the latest reading. Never stored; recomputed from
/// scratch on every arrival, with no memory of past classifications.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Structural(StructuralStatus),
    Environmental(EnvironmentalStatus),
}

impl Classification {
    /// Whether the latest reading should trigger the alert UI.
    pub fn danger(&self) -> bool {
        match self {
            Classification::Structural(s) => s.danger,
            Classification::Environmental(_) => false,
        }
    }
}

pub fn classify(reading: &Reading) -> Classification {
    match reading {
        Reading::Structural(r) => Classification::Structural(classify_structural(r)),
        Reading::Environmental(r) => Classification::Environmental(classify_environmental(r)),
    }
}

pub fn classify_structural(r: &StructuralReading) -> StructuralStatus {
    let danger = r.vibration_x.abs() > VIBRATION_LIMIT_G
        || r.vibration_y.abs() > VIBRATION_LIMIT_G
        || (r.vibration_z - VIBRATION_Z_REST_G).abs() > VIBRATION_Z_TOLERANCE_G
        || r.temperature_c < DANGER_TEMP_LOW_C
        || r.temperature_c > DANGER_TEMP_HIGH_C
        || r.humidity_percent < DANGER_HUMIDITY_LOW
        || r.humidity_percent > DANGER_HUMIDITY_HIGH
        || r.battery_voltage < DANGER_BATTERY_V
        || r.error_code > 0;

    StructuralStatus {
        temperature: band(r.temperature_c, TEMP_LOW_C, TEMP_HIGH_C),
        humidity: band(r.humidity_percent, HUMIDITY_LOW, HUMIDITY_HIGH),
        battery: band(r.battery_voltage, BATTERY_LOW_V, BATTERY_HIGH_V),
        node_health: if r.error_code == 0 {
            NodeHealth::Ok
        } else {
            NodeHealth::Fault
        },
        danger,
    }
}

pub fn classify_environmental(r: &EnvironmentalReading) -> EnvironmentalStatus {
    EnvironmentalStatus {
        temperature: band(r.temperature, ENV_TEMP_LOW_C, ENV_TEMP_HIGH_C),
        humidity: band(r.humidity, ENV_HUMIDITY_LOW, ENV_HUMIDITY_HIGH),
        raining: r.rain_level < RAIN_WET_THRESHOLD,
        pump: r.pump_state,
    }
}

fn band(value: f64, low: f64, high: f64) -> Level {
    if value < low {
        Level::Low
    } else if value > high {
        Level::High
    } else {
        Level::Normal
    }
}
