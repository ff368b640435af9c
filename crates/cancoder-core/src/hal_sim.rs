use crate::config::CancoderConfiguration;
use crate::hal::{DeviceError, SensorBackend, SimulatedBackend};
use crate::signal::{Frame, SignalKind};

pub const DEFAULT_UPDATE_HZ: f64 = 50.0;
pub const MIN_UPDATE_HZ: f64 = 4.0;
pub const MAX_UPDATE_HZ: f64 = 1000.0;

/// Periodic transmit schedule of one status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameSchedule {
    period_us: Option<u64>,
    phase_us: u64,
}

impl FrameSchedule {
    fn at_hz(hz: f64, phase_us: u64) -> Self {
        if hz == 0.0 {
            return Self {
                period_us: None,
                phase_us,
            };
        }
        let hz = hz.clamp(MIN_UPDATE_HZ, MAX_UPDATE_HZ);
        Self {
            period_us: Some((1_000_000.0 / hz).round() as u64),
            phase_us,
        }
    }

    fn last_at_or_before(&self, now_us: u64) -> Option<u64> {
        let period = self.period_us?;
        if now_us < self.phase_us {
            return None;
        }
        Some(self.phase_us + (now_us - self.phase_us) / period * period)
    }

    fn next_after(&self, after_us: u64) -> Option<u64> {
        let period = self.period_us?;
        if after_us < self.phase_us {
            return Some(self.phase_us);
        }
        Some(self.phase_us + ((after_us - self.phase_us) / period + 1) * period)
    }
}

/// CANcoder backend whose magnet reading comes from a physics simulation.
///
/// Frames carry the device state at their transmit time. Every mutation
/// first flushes frames due up to the mutation time, so frames sent before a
/// change keep the old value.
#[derive(Debug, Clone)]
pub struct SimulatedCancoder {
    raw_position: f64,
    raw_velocity: f64,
    position_offset: f64,
    config: CancoderConfiguration,
    schedules: [FrameSchedule; 3],
    latest: [Option<Frame>; 3],
}

impl SimulatedCancoder {
    pub fn new() -> Self {
        Self {
            raw_position: 0.0,
            raw_velocity: 0.0,
            position_offset: 0.0,
            config: CancoderConfiguration::default(),
            schedules: [FrameSchedule::at_hz(DEFAULT_UPDATE_HZ, 0); 3],
            latest: [None; 3],
        }
    }

    pub fn config(&self) -> &CancoderConfiguration {
        &self.config
    }

    /// Update period of `kind` in microseconds, `None` when disabled.
    pub fn update_period_us(&self, kind: SignalKind) -> Option<u64> {
        self.schedules[kind.index()].period_us
    }

    fn magnet_position(&self) -> f64 {
        let magnet = &self.config.magnet_sensor;
        magnet.sensor_direction.sign() * self.raw_position + magnet.magnet_offset
    }

    fn reported(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Position => self.magnet_position() + self.position_offset,
            SignalKind::Velocity => {
                self.config.magnet_sensor.sensor_direction.sign() * self.raw_velocity
            }
            SignalKind::AbsolutePosition => wrap_absolute(
                self.magnet_position(),
                self.config.magnet_sensor.absolute_sensor_discontinuity_point,
            ),
        }
    }

    fn flush(&mut self, now_us: u64) {
        for kind in SignalKind::ALL {
            self.latest_frame(kind, now_us);
        }
    }
}

impl Default for SimulatedCancoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap `position` into `[point - 1, point)`.
pub fn wrap_absolute(position: f64, discontinuity_point: f64) -> f64 {
    let low = discontinuity_point - 1.0;
    position - (position - low).floor()
}

impl SensorBackend for SimulatedCancoder {
    fn apply_config(
        &mut self,
        config: &CancoderConfiguration,
        now_us: u64,
    ) -> Result<(), DeviceError> {
        config.validate()?;
        self.flush(now_us);
        self.config = *config;
        Ok(())
    }

    fn set_update_frequency(
        &mut self,
        kind: SignalKind,
        hz: f64,
        now_us: u64,
    ) -> Result<(), DeviceError> {
        if !hz.is_finite() || hz < 0.0 {
            return Err(DeviceError::InvalidParam {
                param: "update frequency",
                value: hz,
            });
        }
        self.flush(now_us);
        self.schedules[kind.index()] = FrameSchedule::at_hz(hz, now_us);
        Ok(())
    }

    fn set_position(&mut self, rotations: f64, now_us: u64) -> Result<(), DeviceError> {
        if !rotations.is_finite() {
            return Err(DeviceError::InvalidParam {
                param: "position",
                value: rotations,
            });
        }
        self.flush(now_us);
        self.position_offset = rotations - self.magnet_position();
        Ok(())
    }

    fn latest_frame(&mut self, kind: SignalKind, now_us: u64) -> Option<Frame> {
        let idx = kind.index();
        if let Some(due_us) = self.schedules[idx].last_at_or_before(now_us) {
            let stale = self.latest[idx].map_or(true, |frame| frame.timestamp_us < due_us);
            if stale {
                self.latest[idx] = Some(Frame {
                    value: self.reported(kind),
                    timestamp_us: due_us,
                });
            }
        }
        self.latest[idx]
    }

    fn next_arrival(&self, kind: SignalKind, after_us: u64) -> Option<u64> {
        self.schedules[kind.index()].next_after(after_us)
    }
}

impl SimulatedBackend for SimulatedCancoder {
    fn set_raw_position(&mut self, rotations: f64, now_us: u64) {
        self.flush(now_us);
        self.raw_position = rotations;
    }

    fn set_raw_velocity(&mut self, rotations_per_s: f64, now_us: u64) {
        self.flush(now_us);
        self.raw_velocity = rotations_per_s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorDirection;

    #[test]
    fn frames_arrive_on_period() {
        let mut sim = SimulatedCancoder::new();
        sim.set_update_frequency(SignalKind::Position, 100.0, 0)
            .unwrap();
        assert_eq!(sim.next_arrival(SignalKind::Position, 0), Some(10_000));
        assert_eq!(sim.next_arrival(SignalKind::Position, 10_000), Some(20_000));
        let frame = sim.latest_frame(SignalKind::Position, 25_000).unwrap();
        assert_eq!(frame.timestamp_us, 20_000);
    }

    #[test]
    fn frames_before_a_change_keep_old_value() {
        let mut sim = SimulatedCancoder::new();
        sim.set_update_frequency(SignalKind::Position, 100.0, 0)
            .unwrap();
        sim.set_raw_position(1.0, 15_000);
        let frame = sim.latest_frame(SignalKind::Position, 15_000).unwrap();
        assert_eq!(frame.timestamp_us, 10_000);
        assert_eq!(frame.value, 0.0);

        let frame = sim.latest_frame(SignalKind::Position, 20_000).unwrap();
        assert_eq!(frame.value, 1.0);
    }

    #[test]
    fn zero_hz_disables_signal() {
        let mut sim = SimulatedCancoder::new();
        sim.set_update_frequency(SignalKind::Velocity, 0.0, 0)
            .unwrap();
        assert_eq!(sim.next_arrival(SignalKind::Velocity, 0), None);
        assert_eq!(sim.update_period_us(SignalKind::Velocity), None);
    }

    #[test]
    fn frequency_is_clamped() {
        let mut sim = SimulatedCancoder::new();
        sim.set_update_frequency(SignalKind::Position, 1.0, 0).unwrap();
        assert_eq!(sim.update_period_us(SignalKind::Position), Some(250_000));
        sim.set_update_frequency(SignalKind::Position, 5_000.0, 0)
            .unwrap();
        assert_eq!(sim.update_period_us(SignalKind::Position), Some(1_000));
    }

    #[test]
    fn rejects_negative_frequency() {
        let mut sim = SimulatedCancoder::new();
        let err = sim
            .set_update_frequency(SignalKind::Position, -1.0, 0)
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParam { .. }));
    }

    #[test]
    fn set_position_offsets_reported_position() {
        let mut sim = SimulatedCancoder::new();
        sim.set_raw_position(2.0, 0);
        sim.set_position(0.4, 0).unwrap();
        sim.set_raw_position(2.5, 0);
        let frame = sim.latest_frame(SignalKind::Position, 20_000).unwrap();
        assert!((frame.value - 0.9).abs() < 1e-12);
    }

    #[test]
    fn direction_flips_position_and_velocity() {
        let mut sim = SimulatedCancoder::new();
        let mut cfg = CancoderConfiguration::default();
        cfg.magnet_sensor.sensor_direction = SensorDirection::ClockwisePositive;
        sim.apply_config(&cfg, 0).unwrap();
        sim.set_raw_position(0.25, 0);
        sim.set_raw_velocity(3.0, 0);
        let pos = sim.latest_frame(SignalKind::Position, 20_000).unwrap();
        let vel = sim.latest_frame(SignalKind::Velocity, 20_000).unwrap();
        assert_eq!(pos.value, -0.25);
        assert_eq!(vel.value, -3.0);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut sim = SimulatedCancoder::new();
        let mut cfg = CancoderConfiguration::default();
        cfg.magnet_sensor.magnet_offset = -3.0;
        assert!(matches!(
            sim.apply_config(&cfg, 0),
            Err(DeviceError::InvalidConfig(_))
        ));
        assert_eq!(*sim.config(), CancoderConfiguration::default());
    }

    #[test]
    fn absolute_position_wraps() {
        assert!((wrap_absolute(0.7, 0.5) - -0.3).abs() < 1e-12);
        assert!((wrap_absolute(-0.5, 0.5) - -0.5).abs() < 1e-12);
        assert!((wrap_absolute(1.25, 1.0) - 0.25).abs() < 1e-12);
        assert!((wrap_absolute(3.0, 1.0)).abs() < 1e-12);
    }
}
