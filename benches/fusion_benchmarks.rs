use criterion::{Criterion, black_box, criterion_group, criterion_main};
use imu_fusion::compass::tilt_heading;
use imu_fusion::wire::{from_json, to_json};
use imu_fusion::{
    CalibrationProfile, Fusion, FusionState, Imu, RawSample, SimulatedSource, SimulationSettings,
    SnapshotStore, step,
};
use nalgebra::Vector3;
use rand::prelude::*;
use rand_pcg::Pcg64;
use std::f32::consts::PI;

const PERIOD_US: u64 = 10_000; // 100 Hz

// Pre-generated samples to keep RNG cost out of the measured loop
struct PreGeneratedSamples {
    samples: Vec<RawSample>,
    index: usize,
}

impl PreGeneratedSamples {
    fn new(count: usize, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let samples = (0..count)
            .map(|i| {
                let time = i as f32 * 0.01;
                let phase = time * 0.5 * 2.0 * PI;

                let gyro = Vector3::new(
                    0.2 * phase.sin() + rng.random_range(-0.01..0.01),
                    0.2 * (phase * 1.3).cos() + rng.random_range(-0.01..0.01),
                    0.2 * (phase * 0.7).sin() + rng.random_range(-0.01..0.01),
                );
                let accel = Vector3::new(
                    -0.98 * phase.sin() + rng.random_range(-0.02..0.02),
                    0.98 * phase.cos() + rng.random_range(-0.02..0.02),
                    9.81 + rng.random_range(-0.02..0.02),
                );
                let compass = Vector3::new(
                    0.4 + 0.05 * phase.cos() + rng.random_range(-0.01..0.01),
                    0.05 * phase.sin() + rng.random_range(-0.01..0.01),
                    0.3 + rng.random_range(-0.01..0.01),
                );

                RawSample::new(i as u64 * PERIOD_US, accel, gyro, compass)
            })
            .collect();

        Self { samples, index: 0 }
    }

    fn next(&mut self) -> RawSample {
        let sample = self.samples[self.index];
        self.index = (self.index + 1) % self.samples.len();
        sample
    }
}

/// Benchmark a single pure fusion step
fn bench_step(c: &mut Criterion) {
    let profile = CalibrationProfile::default();
    let mut data = PreGeneratedSamples::new(1_000, 42);
    let state = Fusion::new().update(&data.next(), &profile).state;
    let sample = data.next();

    c.bench_function("fusion_step", |b| {
        b.iter(|| step(black_box(&sample), black_box(&state), black_box(&profile)))
    });
}

/// Benchmark the stateful filter over a varying stream
fn bench_fusion_stream(c: &mut Criterion) {
    let profile = CalibrationProfile::default();
    let mut data = PreGeneratedSamples::new(1_000, 42);
    let mut fusion = Fusion::new();

    c.bench_function("fusion_update_stream", |b| {
        b.iter(|| {
            let mut sample = data.next();
            // Keep timestamps increasing across wrap-around
            sample.timestamp = fusion.state().sample_count() * PERIOD_US;
            fusion.update(black_box(&sample), black_box(&profile))
        })
    });
}

/// Benchmark seeding the filter from the first sample
fn bench_first_sample(c: &mut Criterion) {
    let profile = CalibrationProfile::default();
    let sample = PreGeneratedSamples::new(1, 7).next();

    c.bench_function("fusion_first_sample", |b| {
        b.iter(|| step(black_box(&sample), &FusionState::new(), black_box(&profile)))
    });
}

/// Benchmark applying the static calibration
fn bench_correction(c: &mut Criterion) {
    let profile = CalibrationProfile::from_toml_str(
        "[accel]\nbias = [0.1, -0.1, 0.05]\n[compass]\nhard_iron = [0.02, 0.01, -0.03]\n",
    )
    .unwrap();
    let sample = PreGeneratedSamples::new(1, 7).next();

    c.bench_function("calibration_correct", |b| {
        b.iter(|| profile.correct(black_box(&sample)))
    });
}

/// Benchmark tilt-compensated heading
fn bench_tilt_heading(c: &mut Criterion) {
    let sample = PreGeneratedSamples::new(1, 7).next();

    c.bench_function("tilt_heading", |b| {
        b.iter(|| tilt_heading(black_box(&sample.accel), black_box(&sample.compass)))
    });
}

/// Benchmark a full read, correct, fuse, publish cycle
fn bench_read_once(c: &mut Criterion) {
    let source = SimulatedSource::new(SimulationSettings {
        angular_rate: Vector3::new(0.1, 0.2, 0.3),
        accel_noise: 0.02,
        gyro_noise: 0.01,
        compass_noise: 0.01,
        ..Default::default()
    });
    let mut imu = Imu::new(source, CalibrationProfile::default()).unwrap();

    c.bench_function("imu_read_once", |b| b.iter(|| imu.read_once().unwrap()));
}

/// Benchmark snapshot publish and read
fn bench_snapshot(c: &mut Criterion) {
    let source = SimulatedSource::new(SimulationSettings::default());
    let mut imu = Imu::new(source, CalibrationProfile::default()).unwrap();
    let measurement = imu.read_once().unwrap();
    let store = SnapshotStore::new();
    let reader = store.reader();
    store.publish(measurement);

    c.bench_function("snapshot_publish", |b| {
        b.iter(|| store.publish(black_box(measurement)))
    });
    c.bench_function("snapshot_read", |b| b.iter(|| black_box(reader.read().unwrap())));
}

/// Benchmark the JSON wire codec
fn bench_wire(c: &mut Criterion) {
    let source = SimulatedSource::new(SimulationSettings {
        pressure: Some(1013.25),
        humidity: Some(40.0),
        ..Default::default()
    });
    let mut imu = Imu::new(source, CalibrationProfile::default()).unwrap();
    let measurement = imu.read_once().unwrap();
    let json = to_json(&measurement).unwrap();

    c.bench_function("wire_to_json", |b| {
        b.iter(|| to_json(black_box(&measurement)).unwrap())
    });
    c.bench_function("wire_from_json", |b| {
        b.iter(|| from_json(black_box(&json)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_step,
    bench_fusion_stream,
    bench_first_sample,
    bench_correction,
    bench_tilt_heading,
    bench_read_once,
    bench_snapshot,
    bench_wire
);

criterion_main!(benches);
