use std::time::Duration;

use imu_fusion::{
    CalibrationProfile, CycleEvent, Imu, ReplaySource, SensorSource, SimulatedSource,
    SimulationSettings,
};
use nalgebra::Vector3;
use tracing::{info, warn};

fn run<S: SensorSource + Send + 'static>(source: S) -> Result<(), Box<dyn std::error::Error>> {
    let imu = Imu::new(source, CalibrationProfile::default())?;
    let handle = imu.start_continuous_with_events(|event| match event {
        CycleEvent::Published(measurement) => {
            let pose = measurement.fusion_pose;
            println!(
                "{:>10}us  roll {:7.2}  pitch {:7.2}  yaw {:7.2}",
                measurement.timestamp,
                pose.x.to_degrees(),
                pose.y.to_degrees(),
                pose.z.to_degrees()
            );
        }
        CycleEvent::Failed(err) => warn!(%err, "Cycle failed"),
    })?;

    std::thread::sleep(Duration::from_millis(500));

    // Inputs change at the next cycle boundary
    info!("Disabling gyro and accelerometer");
    handle.reconfigure(false, false, true);
    std::thread::sleep(Duration::from_millis(200));
    handle.reconfigure(true, true, true);
    std::thread::sleep(Duration::from_millis(300));

    let imu = handle.stop()?;
    let stats = imu.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        dropped = stats.dropped_events,
        "Done"
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imu_fusion=info,continuous=info".into()),
        )
        .init();

    // Replay a recording when given one, otherwise simulate at 50 Hz
    match std::env::args().nth(1) {
        Some(path) => run(ReplaySource::from_csv_path(path)?),
        None => run(SimulatedSource::new(SimulationSettings {
            sample_rate: 50.0,
            angular_rate: Vector3::new(0.1, 0.0, 0.6),
            accel_noise: 0.05,
            gyro_noise: 0.005,
            compass_noise: 0.005,
            paced: true,
            ..Default::default()
        })),
    }
}
