use crate::config::{CancoderConfiguration, ConfigError};
use crate::signal::{Frame, SignalKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DeviceError {
    #[error("configuration rejected: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("invalid {param}: {value}")]
    InvalidParam { param: &'static str, value: f64 },
}

/// Transport-level view of a sensor: what the device proxy talks to.
///
/// All times are microseconds on the same clock the proxy reads. A backend
/// never blocks; waiting is the proxy's job.
pub trait SensorBackend {
    fn apply_config(
        &mut self,
        config: &CancoderConfiguration,
        now_us: u64,
    ) -> Result<(), DeviceError>;

    /// `hz == 0` disables the signal's periodic frame.
    fn set_update_frequency(
        &mut self,
        kind: SignalKind,
        hz: f64,
        now_us: u64,
    ) -> Result<(), DeviceError>;

    /// Issue a write of the reported position, in rotations.
    fn set_position(&mut self, rotations: f64, now_us: u64) -> Result<(), DeviceError>;

    /// Newest frame for `kind` received at or before `now_us`.
    fn latest_frame(&mut self, kind: SignalKind, now_us: u64) -> Option<Frame>;

    /// Receive time of the first frame for `kind` strictly after `after_us`,
    /// or `None` if nothing is scheduled.
    fn next_arrival(&self, kind: SignalKind, after_us: u64) -> Option<u64>;
}

impl<B: SensorBackend + ?Sized> SensorBackend for Box<B> {
    fn apply_config(
        &mut self,
        config: &CancoderConfiguration,
        now_us: u64,
    ) -> Result<(), DeviceError> {
        (**self).apply_config(config, now_us)
    }

    fn set_update_frequency(
        &mut self,
        kind: SignalKind,
        hz: f64,
        now_us: u64,
    ) -> Result<(), DeviceError> {
        (**self).set_update_frequency(kind, hz, now_us)
    }

    fn set_position(&mut self, rotations: f64, now_us: u64) -> Result<(), DeviceError> {
        (**self).set_position(rotations, now_us)
    }

    fn latest_frame(&mut self, kind: SignalKind, now_us: u64) -> Option<Frame> {
        (**self).latest_frame(kind, now_us)
    }

    fn next_arrival(&self, kind: SignalKind, after_us: u64) -> Option<u64> {
        (**self).next_arrival(kind, after_us)
    }
}

/// Backends that accept physics from a simulation in place of a magnet.
pub trait SimulatedBackend: SensorBackend {
    fn set_raw_position(&mut self, rotations: f64, now_us: u64);
    fn set_raw_velocity(&mut self, rotations_per_s: f64, now_us: u64);
}
