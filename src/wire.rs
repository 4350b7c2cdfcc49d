//! JSON wire format for [`Measurement`]
//!
//! ```json
//! {
//!   "timestamp": 1234.567,
//!   "accel": {"x": 0.0, "y": 0.0, "z": 9.81},
//!   "gyro": {"x": 0.0, "y": 0.0, "z": 0.0},
//!   "compass": {"x": 0.4, "y": 0.0, "z": 0.3},
//!   "fusionPose": {"x": 0.0, "y": 0.0, "z": 0.0},
//!   "tiltHeading": 0.0,
//!   "pressure": 1013.2,
//!   "pressureValid": true,
//!   "pressureTemperature": 21.5,
//!   "pressureTemperatureValid": true
//! }
//! ```
//!
//! `timestamp` is in milliseconds with a fractional part, so microsecond
//! timestamps survive a round trip. The pressure and humidity groups appear
//! only when the measurement carries that reading. A group is recognised by
//! either its value or its validity flag, and a `null` value decodes as an
//! invalid zero.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ImuError;
use crate::types::{HumidityReading, Measurement, PressureReading};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Vec3Json {
    x: f32,
    y: f32,
    z: f32,
}

impl From<Vector3<f32>> for Vec3Json {
    fn from(v: Vector3<f32>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vec3Json> for Vector3<f32> {
    fn from(v: Vec3Json) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementJson {
    timestamp: f64,
    accel: Vec3Json,
    gyro: Vec3Json,
    compass: Vec3Json,
    fusion_pose: Vec3Json,
    tilt_heading: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pressure: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pressure_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pressure_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pressure_temperature_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    humidity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    humidity_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    humidity_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    humidity_temperature_valid: Option<bool>,
}

impl From<&Measurement> for MeasurementJson {
    fn from(m: &Measurement) -> Self {
        Self {
            timestamp: m.timestamp as f64 / 1_000.0,
            accel: m.accel.into(),
            gyro: m.gyro.into(),
            compass: m.compass.into(),
            fusion_pose: m.fusion_pose.into(),
            tilt_heading: m.tilt_heading,
            pressure: m.pressure.map(|p| p.pressure),
            pressure_valid: m.pressure.map(|p| p.pressure_valid),
            pressure_temperature: m.pressure.map(|p| p.temperature),
            pressure_temperature_valid: m.pressure.map(|p| p.temperature_valid),
            humidity: m.humidity.map(|h| h.humidity),
            humidity_valid: m.humidity.map(|h| h.humidity_valid),
            humidity_temperature: m.humidity.map(|h| h.temperature),
            humidity_temperature_valid: m.humidity.map(|h| h.temperature_valid),
        }
    }
}

impl TryFrom<MeasurementJson> for Measurement {
    type Error = ImuError;

    fn try_from(json: MeasurementJson) -> Result<Self, Self::Error> {
        if !json.timestamp.is_finite() {
            return Err(ImuError::InvalidWire {
                field: "timestamp",
                reason: "not a finite number",
            });
        }
        if json.timestamp < 0.0 {
            return Err(ImuError::InvalidWire {
                field: "timestamp",
                reason: "negative",
            });
        }
        let micros = (json.timestamp * 1_000.0).round();
        if micros >= u64::MAX as f64 {
            return Err(ImuError::InvalidWire {
                field: "timestamp",
                reason: "out of range",
            });
        }

        let pressure = (json.pressure.is_some() || json.pressure_valid.is_some()).then(|| {
            let (pressure, pressure_valid) = reading(json.pressure, json.pressure_valid);
            let (temperature, temperature_valid) =
                reading(json.pressure_temperature, json.pressure_temperature_valid);
            PressureReading {
                pressure,
                pressure_valid,
                temperature,
                temperature_valid,
            }
        });
        let humidity = (json.humidity.is_some() || json.humidity_valid.is_some()).then(|| {
            let (humidity, humidity_valid) = reading(json.humidity, json.humidity_valid);
            let (temperature, temperature_valid) =
                reading(json.humidity_temperature, json.humidity_temperature_valid);
            HumidityReading {
                humidity,
                humidity_valid,
                temperature,
                temperature_valid,
            }
        });

        Ok(Measurement {
            timestamp: micros as u64,
            accel: json.accel.into(),
            gyro: json.gyro.into(),
            compass: json.compass.into(),
            fusion_pose: json.fusion_pose.into(),
            tilt_heading: json.tilt_heading,
            pressure,
            humidity,
        })
    }
}

// Missing or null values are invalid zeros; missing flags are false
fn reading(value: Option<f32>, valid: Option<bool>) -> (f32, bool) {
    match value {
        Some(value) => (value, valid.unwrap_or(false)),
        None => (0.0, false),
    }
}

/// Encode a measurement as a JSON string
pub fn to_json(measurement: &Measurement) -> Result<String, ImuError> {
    Ok(serde_json::to_string(&MeasurementJson::from(measurement))?)
}

/// Encode a measurement as a JSON value
pub fn to_json_value(measurement: &Measurement) -> Result<serde_json::Value, ImuError> {
    Ok(serde_json::to_value(MeasurementJson::from(measurement))?)
}

/// Decode a measurement from a JSON string
///
/// A reading's validity flags default to `false` when absent.
pub fn from_json(json: &str) -> Result<Measurement, ImuError> {
    let decoded: MeasurementJson = serde_json::from_str(json)?;
    decoded.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> Measurement {
        Measurement {
            timestamp: 1_234_567,
            accel: Vector3::new(0.01, -0.02, 9.81),
            gyro: Vector3::new(0.001, 0.0, -0.003),
            compass: Vector3::new(0.41, -0.02, 0.29),
            fusion_pose: Vector3::new(0.001, -0.002, 0.35),
            tilt_heading: 0.349,
            pressure: None,
            humidity: None,
        }
    }

    #[test]
    fn test_timestamp_is_fractional_milliseconds() {
        let value = to_json_value(&measurement()).unwrap();
        assert_eq!(value["timestamp"].as_f64(), Some(1_234.567));
    }

    #[test]
    fn test_absent_readings_are_omitted() {
        let value = to_json_value(&measurement()).unwrap();
        let object = value.as_object().unwrap();

        assert!(object.contains_key("fusionPose"));
        assert!(object.contains_key("tiltHeading"));
        assert!(!object.contains_key("pressure"));
        assert!(!object.contains_key("humidityValid"));
    }

    #[test]
    fn test_validity_defaults_to_false() {
        let json = r#"{
            "timestamp": 10.0,
            "accel": {"x": 0.0, "y": 0.0, "z": 9.81},
            "gyro": {"x": 0.0, "y": 0.0, "z": 0.0},
            "compass": {"x": 1.0, "y": 0.0, "z": 0.0},
            "fusionPose": {"x": 0.0, "y": 0.0, "z": 0.0},
            "tiltHeading": 0.0,
            "humidity": 41.5
        }"#;

        let decoded = from_json(json).unwrap();
        assert_eq!(decoded.timestamp, 10_000);
        let humidity = decoded.humidity.unwrap();
        assert_eq!(humidity.humidity, 41.5);
        assert!(!humidity.humidity_valid);
        assert!(decoded.pressure.is_none());
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let mut value = to_json_value(&measurement()).unwrap();
        value["timestamp"] = serde_json::json!(-1.0);

        let result = from_json(&value.to_string());
        assert!(matches!(
            result,
            Err(ImuError::InvalidWire {
                field: "timestamp",
                ..
            })
        ));
    }

    #[test]
    fn test_huge_timestamp_rejected() {
        let mut value = to_json_value(&measurement()).unwrap();
        value["timestamp"] = serde_json::json!(1e30);

        let result = from_json(&value.to_string());
        assert!(matches!(
            result,
            Err(ImuError::InvalidWire {
                field: "timestamp",
                reason: "out of range",
            })
        ));
    }

    #[test]
    fn test_null_reading_keeps_its_group() {
        let m = Measurement {
            pressure: Some(PressureReading {
                pressure: f32::NAN,
                pressure_valid: false,
                temperature: 20.0,
                temperature_valid: true,
            }),
            ..measurement()
        };

        let json = to_json(&m).unwrap();
        assert!(json.contains(r#""pressure":null"#));

        let pressure = from_json(&json).unwrap().pressure.unwrap();
        assert_eq!(pressure.pressure, 0.0);
        assert!(!pressure.pressure_valid);
        assert_eq!(pressure.temperature, 20.0);
        assert!(pressure.temperature_valid);
    }

    #[test]
    fn test_missing_field_is_wire_error() {
        let result = from_json(r#"{"timestamp": 1.0}"#);
        assert!(matches!(result, Err(ImuError::Wire(_))));
    }
}
