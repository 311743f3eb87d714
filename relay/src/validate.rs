use crate::model::{
    EnvironmentalReading, PumpState, Reading, StructuralReading, MAX_ID_LEN,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

const VIBRATION_LIMIT: f64 = 50.0;
const TEMP_C_MIN: f64 = -100.0;
const TEMP_C_MAX: f64 = 200.0;
const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;
const BATTERY_V_MIN: f64 = 0.0;
const BATTERY_V_MAX: f64 = 20.0;

/// Turns a raw upstream message into a typed reading, or the full list of
/// reasons it was rejected. Pure: the ingestion clock is an input so the
/// timestamp default stays deterministic.
///
/// The variant is picked by which required-field set is present; payloads
/// matching neither shape are rejected outright.
pub fn parse_reading(raw: &Value, received_at: DateTime<Utc>) -> Result<Reading, Vec<String>> {
    let obj = match raw.as_object() {
        Some(obj) => obj,
        None => return Err(vec!["Payload must be a JSON object".to_string()]),
    };

    if obj.contains_key("sensor_id")
        || obj.contains_key("telemetry")
        || obj.contains_key("device_health")
    {
        parse_structural(obj, received_at).map(Reading::Structural)
    } else if obj.contains_key("soil") || obj.contains_key("rain") || obj.contains_key("pump") {
        parse_environmental(obj, received_at).map(Reading::Environmental)
    } else {
        Err(vec![
            "Payload matches neither known reading shape".to_string()
        ])
    }
}

fn parse_structural(
    obj: &serde_json::Map<String, Value>,
    received_at: DateTime<Utc>,
) -> Result<StructuralReading, Vec<String>> {
    let mut errors = Vec::new();

    let device_id = required_id(obj.get("sensor_id"), "sensor_id", &mut errors);
    let location = required_id(obj.get("location"), "location", &mut errors);
    let timestamp = parse_timestamp(obj.get("timestamp"), received_at, &mut errors);

    let telemetry = obj.get("telemetry").and_then(Value::as_object);
    let health = obj.get("device_health").and_then(Value::as_object);
    let field = |group: Option<&serde_json::Map<String, Value>>, key: &str| {
        group.and_then(|g| g.get(key)).cloned()
    };

    let vibration_x = bounded_number(
        field(telemetry, "vibration_x").as_ref(),
        -VIBRATION_LIMIT,
        VIBRATION_LIMIT,
        "vibration_x must be a finite number within [-50,50]",
        &mut errors,
    );
    let vibration_y = bounded_number(
        field(telemetry, "vibration_y").as_ref(),
        -VIBRATION_LIMIT,
        VIBRATION_LIMIT,
        "vibration_y must be a finite number within [-50,50]",
        &mut errors,
    );
    let vibration_z = bounded_number(
        field(telemetry, "vibration_z").as_ref(),
        -VIBRATION_LIMIT,
        VIBRATION_LIMIT,
        "vibration_z must be a finite number within [-50,50]",
        &mut errors,
    );
    let temperature_c = bounded_number(
        field(telemetry, "temperature_c").as_ref(),
        TEMP_C_MIN,
        TEMP_C_MAX,
        "temperature_c must be a finite number within [-100,200]",
        &mut errors,
    );
    let humidity_percent = bounded_number(
        field(telemetry, "humidity_percent").as_ref(),
        HUMIDITY_MIN,
        HUMIDITY_MAX,
        "humidity_percent must be a finite number within [0,100]",
        &mut errors,
    );
    let battery_voltage = bounded_number(
        field(health, "battery_v").as_ref(),
        BATTERY_V_MIN,
        BATTERY_V_MAX,
        "battery_v must be a finite number within [0,20]",
        &mut errors,
    );
    let error_code = unsigned_integer(
        field(health, "error_code").as_ref(),
        "error_code must be a non-negative integer",
        &mut errors,
    );

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(StructuralReading {
        device_id: device_id.unwrap_or_default(),
        timestamp: timestamp.unwrap_or(received_at),
        location: location.unwrap_or_default(),
        vibration_x: vibration_x.unwrap_or_default(),
        vibration_y: vibration_y.unwrap_or_default(),
        vibration_z: vibration_z.unwrap_or_default(),
        temperature_c: temperature_c.unwrap_or_default(),
        humidity_percent: humidity_percent.unwrap_or_default(),
        battery_voltage: battery_voltage.unwrap_or_default(),
        error_code: error_code.unwrap_or_default(),
    })
}

fn parse_environmental(
    obj: &serde_json::Map<String, Value>,
    received_at: DateTime<Utc>,
) -> Result<EnvironmentalReading, Vec<String>> {
    let mut errors = Vec::new();

    let device_id = required_id(obj.get("deviceId"), "deviceId", &mut errors);
    let timestamp = parse_timestamp(obj.get("timestamp"), received_at, &mut errors);

    // The firmware documents no ranges for these, so only presence and
    // numeric type are enforced.
    let temperature = finite_number(obj.get("temp"), "temp must be a finite number", &mut errors);
    let humidity = finite_number(obj.get("humid"), "humid must be a finite number", &mut errors);
    let soil_moisture =
        finite_number(obj.get("soil"), "soil must be a finite number", &mut errors);
    let rain_level = finite_number(obj.get("rain"), "rain must be a finite number", &mut errors);

    let pump_state = match obj.get("pump").and_then(Value::as_str) {
        Some("ON") => Some(PumpState::On),
        Some("OFF") => Some(PumpState::Off),
        _ => {
            errors.push("pump is required and must be \"ON\" or \"OFF\"".to_string());
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(EnvironmentalReading {
        device_id: device_id.unwrap_or_default(),
        timestamp: timestamp.unwrap_or(received_at),
        temperature: temperature.unwrap_or_default(),
        humidity: humidity.unwrap_or_default(),
        soil_moisture: soil_moisture.unwrap_or_default(),
        rain_level: rain_level.unwrap_or_default(),
        pump_state: pump_state.unwrap_or(PumpState::Off),
    })
}

fn required_id(
    value: Option<&Value>,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match value.and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() && s.len() <= MAX_ID_LEN => Some(s.trim().to_string()),
        _ => {
            errors.push(format!(
                "{} is required and must be a string <= {} chars",
                name, MAX_ID_LEN
            ));
            None
        }
    }
}

/// Numeric coercion: plain JSON numbers or numeric-looking strings are
/// accepted; NaN and infinities are rejected in both forms.
fn coerce_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn finite_number(value: Option<&Value>, message: &str, errors: &mut Vec<String>) -> Option<f64> {
    match coerce_number(value) {
        Some(v) => Some(v),
        None => {
            errors.push(message.to_string());
            None
        }
    }
}

fn bounded_number(
    value: Option<&Value>,
    min: f64,
    max: f64,
    message: &str,
    errors: &mut Vec<String>,
) -> Option<f64> {
    match coerce_number(value) {
        Some(v) if v >= min && v <= max => Some(v),
        _ => {
            errors.push(message.to_string());
            None
        }
    }
}

fn unsigned_integer(value: Option<&Value>, message: &str, errors: &mut Vec<String>) -> Option<u32> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed.and_then(|v| u32::try_from(v).ok()) {
        Some(v) => Some(v),
        None => {
            errors.push(message.to_string());
            None
        }
    }
}

/// Absent timestamps fall back to the ingestion clock; present-but-invalid
/// timestamps are a validation failure, never a silent default.
fn parse_timestamp(
    value: Option<&Value>,
    received_at: DateTime<Utc>,
    errors: &mut Vec<String>,
) -> Option<DateTime<Utc>> {
    match value {
        None | Some(Value::Null) => Some(received_at),
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => {
                errors.push(
                    "timestamp must be an RFC 3339 string or epoch milliseconds".to_string(),
                );
                None
            }
        },
        Some(Value::Number(n)) => match n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
            Some(ts) => Some(ts),
            None => {
                errors.push(
                    "timestamp must be an RFC 3339 string or epoch milliseconds".to_string(),
                );
                None
            }
        },
        Some(_) => {
            errors.push("timestamp must be an RFC 3339 string or epoch milliseconds".to_string());
            None
        }
    }
}
