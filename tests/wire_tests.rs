use imu_fusion::wire::{from_json, to_json, to_json_value};
use imu_fusion::{
    CalibrationProfile, Imu, PressureReading, RawSample, ReplaySource, SimulatedSource,
    SimulationSettings,
};
use nalgebra::Vector3;

fn simulated(pressure: Option<f32>, humidity: Option<f32>) -> Imu<SimulatedSource> {
    let source = SimulatedSource::new(SimulationSettings {
        angular_rate: Vector3::new(0.1, -0.2, 0.3),
        accel_noise: 0.05,
        gyro_noise: 0.01,
        compass_noise: 0.01,
        pressure,
        humidity,
        start_timestamp: 1_700_000_000_123_456,
        seed: 99,
        ..Default::default()
    });
    Imu::new(source, CalibrationProfile::default()).unwrap()
}

#[test]
fn test_round_trip_imu_only() {
    let mut imu = simulated(None, None);

    for _ in 0..25 {
        let measurement = imu.read_once().unwrap();
        let decoded = from_json(&to_json(&measurement).unwrap()).unwrap();
        assert_eq!(decoded, measurement);
    }
}

#[test]
fn test_round_trip_with_environmental_readings() {
    let mut imu = simulated(Some(1013.25), Some(45.5));

    for _ in 0..25 {
        let measurement = imu.read_once().unwrap();
        assert!(measurement.pressure.is_some());
        assert!(measurement.humidity.is_some());

        let decoded = from_json(&to_json(&measurement).unwrap()).unwrap();
        assert_eq!(decoded, measurement);
    }
}

#[test]
fn test_round_trip_with_unreadable_pressure() {
    let sample = RawSample::new(
        5_000,
        Vector3::new(0.0, 0.0, 9.81),
        Vector3::zeros(),
        Vector3::new(0.4, 0.0, 0.3),
    )
    .with_pressure(PressureReading {
        pressure: f32::NAN,
        pressure_valid: false,
        temperature: 20.0,
        temperature_valid: true,
    });
    let mut imu = Imu::new(ReplaySource::from_samples([sample]), CalibrationProfile::default())
        .unwrap();

    let measurement = imu.read_once().unwrap();
    let decoded = from_json(&to_json(&measurement).unwrap()).unwrap();

    assert_eq!(decoded, measurement);
    let pressure = decoded.pressure.unwrap();
    assert!(!pressure.pressure_valid);
    assert_eq!(pressure.temperature, 20.0);
}

#[test]
fn test_field_names() {
    let mut imu = simulated(Some(1013.25), None);
    let measurement = imu.read_once().unwrap();
    let value = to_json_value(&measurement).unwrap();
    let object = value.as_object().unwrap();

    for key in [
        "timestamp",
        "accel",
        "gyro",
        "compass",
        "fusionPose",
        "tiltHeading",
        "pressure",
        "pressureValid",
        "pressureTemperature",
        "pressureTemperatureValid",
    ] {
        assert!(object.contains_key(key), "missing {key}");
    }
    for key in ["humidity", "humidityValid", "humidityTemperature", "humidityTemperatureValid"] {
        assert!(!object.contains_key(key), "unexpected {key}");
    }

    assert_eq!(value["pressureValid"], serde_json::json!(true));
    assert!(value["fusionPose"]["z"].is_number());
    assert_eq!(value["timestamp"].as_f64(), Some(1_700_000_000_123.456));
}
