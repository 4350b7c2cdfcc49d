use std::path::PathBuf;

use imu_fusion::{CalibrationProfile, Imu, SimulatedSource, SimulationSettings, wire};
use nalgebra::Vector3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imu_fusion=info".into()),
        )
        .init();

    // Optional calibration profile path as the first argument
    let path = std::env::args().nth(1).map(PathBuf::from);
    let profile = CalibrationProfile::load(path.as_deref())?;

    // replace this with a source backed by real hardware
    let source = SimulatedSource::new(SimulationSettings {
        angular_rate: Vector3::new(0.0, 0.0, 0.5), // rad/s
        pressure: Some(1013.25),
        ..Default::default()
    });
    let mut imu = Imu::new(source, profile)?;

    for _ in 0..10 {
        let measurement = imu.read_once()?;
        let pose = measurement.fusion_pose;

        println!(
            "Roll: {:.2}, Pitch: {:.2}, Yaw: {:.2}, Heading: {:.2}",
            pose.x.to_degrees(),
            pose.y.to_degrees(),
            pose.z.to_degrees(),
            measurement.tilt_heading.to_degrees()
        );
    }

    println!("{}", wire::to_json(&imu.latest()?)?);
    Ok(())
}
