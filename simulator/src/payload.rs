use chrono::Utc;
use rand::Rng;
use serde::Serialize;

/// Structural node payload, as published by the bridge-mounted sensors.
#[derive(Debug, Serialize)]
pub struct StructuralPayload {
    pub sensor_id: String,
    pub location: String,
    pub timestamp: String,
    pub telemetry: Telemetry,
    pub device_health: DeviceHealth,
}

#[derive(Debug, Serialize)]
pub struct Telemetry {
    pub vibration_x: f64,
    pub vibration_y: f64,
    pub vibration_z: f64,
    pub temperature_c: f64,
    pub humidity_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct DeviceHealth {
    pub battery_v: f64,
    pub error_code: u32,
}

/// Irrigation controller payload. The firmware sends no timestamp; the
/// relay stamps it at ingestion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalPayload {
    pub device_id: String,
    pub temp: f64,
    pub humid: f64,
    pub soil: i64,
    pub rain: i64,
    pub pump: &'static str,
}

/// Quiet structural readings: vibration near rest, healthy battery.
pub fn structural_normal(rng: &mut impl Rng, sensor_id: &str, location: &str) -> StructuralPayload {
    StructuralPayload {
        sensor_id: sensor_id.to_string(),
        location: location.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        telemetry: Telemetry {
            vibration_x: rng.gen_range(-0.05..0.05),
            vibration_y: rng.gen_range(-0.05..0.05),
            vibration_z: 1.0 + rng.gen_range(-0.05..0.05),
            temperature_c: rng.gen_range(15.0..30.0),
            humidity_percent: rng.gen_range(40.0..60.0),
        },
        device_health: DeviceHealth {
            battery_v: rng.gen_range(3.6..4.1),
            error_code: 0,
        },
    }
}

/// Structural stress scenario: resonant vibration, environmental extremes,
/// critical battery and a device fault.
pub fn structural_danger(rng: &mut impl Rng, sensor_id: &str, location: &str) -> StructuralPayload {
    let temperature_c = if rng.gen_bool(0.5) {
        rng.gen_range(-10.0..-5.0)
    } else {
        rng.gen_range(55.0..65.0)
    };
    let humidity_percent = if rng.gen_bool(0.5) {
        rng.gen_range(5.0..15.0)
    } else {
        rng.gen_range(90.0..100.0)
    };

    StructuralPayload {
        sensor_id: sensor_id.to_string(),
        location: location.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        telemetry: Telemetry {
            vibration_x: rng.gen_range(0.0..0.8),
            vibration_y: rng.gen_range(0.0..0.6),
            vibration_z: rng.gen_range(0.4..1.6),
            temperature_c,
            humidity_percent,
        },
        device_health: DeviceHealth {
            battery_v: rng.gen_range(2.8..3.2),
            error_code: rng.gen_range(1..=4),
        },
    }
}

/// Garden-node readings with the controller's own pump rules: water when the
/// soil is dry and it is not raining, or when the air is hot and dry.
pub fn environmental(rng: &mut impl Rng, device_id: &str) -> EnvironmentalPayload {
    let temp = rng.gen_range(18.0..36.0);
    let humid = rng.gen_range(35.0..90.0);
    let soil = rng.gen_range(1500..3500);
    let rain = rng.gen_range(3000..4200);

    let pump_on = (soil > 2700 && rain > 4000) || temp > 31.0 || humid < 50.0;

    EnvironmentalPayload {
        device_id: device_id.to_string(),
        temp,
        humid,
        soil,
        rain,
        pump: if pump_on { "ON" } else { "OFF" },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_normal_stays_in_safe_bands() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let p = structural_normal(&mut rng, "shm-node-alpha-01", "bridge-span-north");
            assert!(p.telemetry.vibration_x.abs() <= 0.3);
            assert!((p.telemetry.vibration_z - 1.0).abs() <= 0.4);
            assert!(p.device_health.battery_v >= 3.0);
            assert_eq!(p.device_health.error_code, 0);
        }
    }

    #[test]
    fn test_structural_danger_always_faults() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let p = structural_danger(&mut rng, "shm-node-beta-02", "bridge-span-central");
            assert!(p.device_health.error_code >= 1);
            assert!(p.device_health.battery_v < 3.4);
        }
    }

    #[test]
    fn test_environmental_pump_spelling() {
        let mut rng = rand::thread_rng();
        let p = environmental(&mut rng, "MakerFeatherS3_01");
        assert!(p.pump == "ON" || p.pump == "OFF");
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("deviceId").is_some());
        assert!(json.get("timestamp").is_none());
    }
}
