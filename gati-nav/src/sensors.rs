//! Sensor signal processing and the background sampling task.
//!
//! Four ADC channels are sampled every `sample_period_ms` (10 ms by default):
//!
//! | Channel | Signal | Processing |
//! |---------|--------|------------|
//! | wheel L/R | slot encoder (analog) | EMA (w=3) + single-threshold hysteresis, one count per level change |
//! | proximity L/R | IR reflectance | floor filter + EMA (w=10) + threshold, published as near/far sentinel |
//!
//! The hysteresis uses one switch point per wheel rather than a Schmitt
//! trigger pair, so a smoothed signal hovering at the switch point can
//! double-count. The smoothing keeps that rare at the sampling rate used.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::SensorConfig;
use crate::error::{GatiError, Result};
use crate::hal::{AnalogInput, Clock};
use crate::shared::SharedSensorState;
use crate::types::Side;
use crate::utils::wait_delay;

/// One step of an exponential moving average with weight `weight`
#[inline]
pub fn moving_update(sample: f64, previous: f64, weight: f64) -> f64 {
    (weight - 1.0) * previous / weight + sample / weight
}

/// Debounced level-change detector for one wheel slot sensor
#[derive(Debug, Clone)]
pub struct PulseDetector {
    average: f64,
    is_high: bool,
    switch_point: f64,
    weight: f64,
}

impl PulseDetector {
    pub fn new(switch_point: f64, weight: f64) -> Self {
        Self {
            average: 0.0,
            is_high: false,
            switch_point,
            weight,
        }
    }

    /// Feed one raw sample. Returns true when the smoothed level flips.
    pub fn update(&mut self, sample: i32) -> bool {
        self.average = moving_update(sample as f64, self.average, self.weight);
        let is_high = self.average > self.switch_point;
        if is_high != self.is_high {
            self.is_high = is_high;
            return true;
        }
        false
    }

    pub fn is_high(&self) -> bool {
        self.is_high
    }

    pub fn average(&self) -> f64 {
        self.average
    }
}

/// Smoothed near/far decision for one proximity sensor
#[derive(Debug, Clone)]
pub struct ProximityFilter {
    average: f64,
    threshold: f64,
    ignore_floor: i32,
    weight: f64,
}

impl ProximityFilter {
    pub fn new(threshold: f64, ignore_floor: i32, weight: f64) -> Self {
        Self {
            average: 0.0,
            threshold,
            ignore_floor,
            weight,
        }
    }

    /// Feed one raw sample. Samples under the floor are noise: the average is
    /// left alone and `None` is returned. Otherwise returns whether an object
    /// is near.
    pub fn update(&mut self, sample: i32) -> Option<bool> {
        if sample < self.ignore_floor {
            return None;
        }
        self.average = moving_update(sample as f64, self.average, self.weight);
        Some(self.average > self.threshold)
    }

    pub fn average(&self) -> f64 {
        self.average
    }
}

/// Raw samples from one sampling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSamples {
    pub proximity: [i32; 2],
    pub wheel: [i32; 2],
}

/// Turns raw ADC samples into pulse counts and obstacle flags in [`SharedSensorState`]
pub struct SignalProcessor {
    config: SensorConfig,
    wheels: [PulseDetector; 2],
    proximity: [ProximityFilter; 2],
    shared: Arc<SharedSensorState>,
}

impl SignalProcessor {
    pub fn new(config: SensorConfig, shared: Arc<SharedSensorState>) -> Self {
        let wheels = [
            PulseDetector::new(config.switch_point_left, config.wheel_ema_weight),
            PulseDetector::new(config.switch_point_right, config.wheel_ema_weight),
        ];
        let proximity = [
            ProximityFilter::new(
                config.obstacle_proximity_left,
                config.ignore_floor_left,
                config.proximity_ema_weight,
            ),
            ProximityFilter::new(
                config.obstacle_proximity_right,
                config.ignore_floor_right,
                config.proximity_ema_weight,
            ),
        ];
        Self {
            config,
            wheels,
            proximity,
            shared,
        }
    }

    /// Read all four channels once
    pub fn read(&self, adc: &dyn AnalogInput) -> SensorSamples {
        let ch = &self.config.channels;
        SensorSamples {
            proximity: [
                adc.read_channel(ch.proximity_left),
                adc.read_channel(ch.proximity_right),
            ],
            wheel: [adc.read_channel(ch.wheel_left), adc.read_channel(ch.wheel_right)],
        }
    }

    /// Process one sampling pass. Bad samples are logged and skipped.
    pub fn process(&mut self, samples: SensorSamples) {
        for side in Side::BOTH {
            let i = side.index();

            let raw = samples.proximity[i];
            if raw < 0 {
                tracing::warn!("Bad {} proximity sample {}, skipping", side, raw);
            } else if let Some(near) = self.proximity[i].update(raw) {
                self.shared.set_obstacle(side, near);
            }

            let raw = samples.wheel[i];
            if raw < 0 {
                tracing::warn!("Bad {} wheel sample {}, skipping", side, raw);
            } else if self.wheels[i].update(raw) {
                self.shared.record_pulse(side);
            }
        }
    }

    pub fn wheel_detector(&self, side: Side) -> &PulseDetector {
        &self.wheels[side.index()]
    }

    pub fn proximity_filter(&self, side: Side) -> &ProximityFilter {
        &self.proximity[side.index()]
    }
}

/// Handle to the background sampling thread.
///
/// Stopping sets the shared stop flag and joins; the thread finishes its
/// current sample first. Dropping the handle stops the task too.
pub struct SensorTask {
    shared: Arc<SharedSensorState>,
    handle: Option<JoinHandle<()>>,
}

impl SensorTask {
    /// Spawn the sampling loop. Fails if another task already feeds `shared`.
    pub fn spawn(
        config: SensorConfig,
        shared: Arc<SharedSensorState>,
        adc: Arc<dyn AnalogInput>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if !shared.claim_task() {
            return Err(GatiError::SensorTask(
                "a sensor task is already running for this state".to_string(),
            ));
        }

        let period_ms = config.sample_period_ms;
        let thread_state = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("sensors".into())
            .spawn(move || {
                let processor = SignalProcessor::new(config, Arc::clone(&thread_state));
                sampling_loop(processor, &thread_state, adc.as_ref(), clock.as_ref(), period_ms);
                thread_state.release_task();
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                shared.release_task();
                return Err(GatiError::SensorTask(format!(
                    "Failed to spawn sensor thread: {}",
                    e
                )));
            }
        };

        tracing::info!("Sensor task started ({}ms period)", period_ms);
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request stop and wait for the thread to exit
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        tracing::info!("Asked for sensor stop");
        self.shared.request_stop();
        handle
            .join()
            .map_err(|e| GatiError::SensorTask(format!("Sensor thread panicked: {:?}", e)))
    }
}

impl Drop for SensorTask {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Stopping sensor task failed: {}", e);
        }
    }
}

fn sampling_loop(
    mut processor: SignalProcessor,
    shared: &SharedSensorState,
    adc: &dyn AnalogInput,
    clock: &dyn Clock,
    period_ms: u64,
) {
    while !shared.should_stop() {
        let last_time = clock.now_ms();

        let samples = processor.read(adc);
        tracing::trace!(
            "adc: prox_l={}, prox_r={}, wheel_l={}, wheel_r={}",
            samples.proximity[0],
            samples.proximity[1],
            samples.wheel[0],
            samples.wheel[1]
        );
        processor.process(samples);

        wait_delay(clock, period_ms, last_time);
    }
    tracing::info!("Sensor task terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SystemClock;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn processor() -> (SignalProcessor, Arc<SharedSensorState>) {
        let shared = Arc::new(SharedSensorState::new());
        (
            SignalProcessor::new(SensorConfig::default(), Arc::clone(&shared)),
            shared,
        )
    }

    fn wheels(left: i32, right: i32) -> SensorSamples {
        SensorSamples {
            proximity: [300, 300],
            wheel: [left, right],
        }
    }

    #[test]
    fn test_moving_update() {
        assert_eq!(moving_update(300.0, 0.0, 3.0), 100.0);
        assert_eq!(moving_update(300.0, 300.0, 3.0), 300.0);
        assert_eq!(moving_update(90.0, 100.0, 10.0), 99.0);
    }

    #[test]
    fn test_constant_low_input_never_counts() {
        let (mut p, shared) = processor();
        for _ in 0..10_000 {
            p.process(wheels(379, 200));
        }
        assert_eq!(shared.peek_pulse_count(Side::Left), 0);
        assert_eq!(shared.peek_pulse_count(Side::Right), 0);
    }

    #[test]
    fn test_single_crossing_counts_once() {
        let (mut p, shared) = processor();
        for _ in 0..20 {
            p.process(wheels(100, 100));
        }
        for _ in 0..50 {
            p.process(wheels(650, 100));
        }
        assert_eq!(shared.peek_pulse_count(Side::Left), 1);
        assert_eq!(shared.peek_pulse_count(Side::Right), 0);
        assert!(p.wheel_detector(Side::Left).is_high());
    }

    #[test]
    fn test_square_wave_counts_every_edge() {
        let (mut p, shared) = processor();
        // 8 levels of 5 samples each: low, high, low, ... gives 7 level changes
        for level in 0..8 {
            let raw = if level % 2 == 0 { 150 } else { 650 };
            for _ in 0..5 {
                p.process(wheels(raw, raw));
            }
        }
        assert_eq!(shared.take_pulse_count(Side::Left), 7);
        assert_eq!(shared.take_pulse_count(Side::Right), 7);
    }

    #[test]
    fn test_single_sample_spike_is_smoothed_out() {
        let (mut p, shared) = processor();
        for _ in 0..20 {
            p.process(wheels(150, 150));
        }
        // One 650 sample moves the EMA to ~317: below the switch point
        p.process(wheels(650, 150));
        for _ in 0..20 {
            p.process(wheels(150, 150));
        }
        assert_eq!(shared.peek_pulse_count(Side::Left), 0);
    }

    #[test]
    fn test_proximity_near_and_far() {
        let (mut p, shared) = processor();
        for _ in 0..50 {
            p.process(SensorSamples {
                proximity: [870, 300],
                wheel: [0, 0],
            });
        }
        assert!(shared.has_obstacle(1500.0));
        assert_eq!(shared.obstacle_distance_mm(Side::Left), 0);
        assert_eq!(shared.obstacle_distance_mm(Side::Right), 100_000);

        for _ in 0..50 {
            p.process(SensorSamples {
                proximity: [300, 300],
                wheel: [0, 0],
            });
        }
        assert!(!shared.has_obstacle(1500.0));
    }

    #[test]
    fn test_proximity_below_floor_is_ignored() {
        let mut filter = ProximityFilter::new(600.0, 200, 10.0);
        assert_eq!(filter.update(199), None);
        assert_eq!(filter.average(), 0.0);
        assert_eq!(filter.update(800), Some(false));
        assert_eq!(filter.average(), 80.0);

        let (mut p, shared) = processor();
        for _ in 0..50 {
            p.process(SensorSamples {
                proximity: [100, 50],
                wheel: [0, 0],
            });
        }
        // No valid sample yet: sentinel still "unknown", which reads as clear
        assert_eq!(shared.obstacle_distance_mm(Side::Left), 1_000_000);
        assert!(!shared.has_obstacle(1500.0));
    }

    #[test]
    fn test_negative_samples_are_skipped() {
        let (mut p, shared) = processor();
        for _ in 0..20 {
            p.process(SensorSamples {
                proximity: [-1, -1],
                wheel: [-5, -5],
            });
        }
        assert_eq!(shared.peek_pulse_count(Side::Left), 0);
        assert_eq!(p.wheel_detector(Side::Left).average(), 0.0);
        assert_eq!(p.proximity_filter(Side::Right).average(), 0.0);
    }

    /// Square wave on both wheel channels, flipping every `half_period` reads
    struct SquareWave {
        reads: AtomicI32,
        half_period: i32,
    }

    impl AnalogInput for SquareWave {
        fn read_channel(&self, channel: u8) -> i32 {
            match channel {
                0 | 1 => 300,
                2 | 3 => {
                    let n = self.reads.fetch_add(1, Ordering::Relaxed) / 2;
                    if (n / self.half_period) % 2 == 0 { 150 } else { 650 }
                }
                _ => 0,
            }
        }
    }

    #[test]
    fn test_sensor_task_counts_and_stops() {
        let shared = Arc::new(SharedSensorState::new());
        let adc = Arc::new(SquareWave {
            reads: AtomicI32::new(0),
            half_period: 4,
        });
        let clock = Arc::new(SystemClock::new());
        let config = SensorConfig {
            sample_period_ms: 1,
            ..SensorConfig::default()
        };

        let task = SensorTask::spawn(config.clone(), Arc::clone(&shared), adc.clone(), clock.clone())
            .unwrap();
        assert!(task.is_running());

        // A second task on the same state is refused
        assert!(SensorTask::spawn(config, Arc::clone(&shared), adc, clock.clone()).is_err());

        clock.sleep_ms(100);
        task.stop().unwrap();

        assert!(shared.peek_pulse_count(Side::Left) > 0);
        assert!(shared.peek_pulse_count(Side::Right) > 0);
        assert!(!shared.has_obstacle(1500.0));
        assert!(shared.should_stop());
    }
}
