//! Device proxy for a CANcoder and its status signals.

use crate::config::CancoderConfiguration;
use crate::hal::{DeviceError, SensorBackend, SimulatedBackend};
use crate::signal::{SignalKind, SignalSample, SignalStatus};
use crate::timebase::{duration_us, Clock};
use log::{debug, info, warn};
use std::time::Duration;

pub struct Cancoder<B: SensorBackend, C: Clock> {
    id: u32,
    bus: String,
    backend: B,
    clock: C,
}

impl<B: SensorBackend, C: Clock> Cancoder<B, C> {
    pub fn new(id: u32, bus: impl Into<String>, backend: B, clock: C) -> Self {
        Self {
            id,
            bus: bus.into(),
            backend,
            clock,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn bus(&self) -> &str {
        &self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Apply a full configuration. A rejection leaves the previous one in place.
    pub fn apply_config(&mut self, config: &CancoderConfiguration) -> Result<(), DeviceError> {
        let now = self.clock.now_us();
        match self.backend.apply_config(config, now) {
            Ok(()) => {
                info!(
                    "CANcoder {} on {}: configuration applied ({:?})",
                    self.id, self.bus, config.magnet_sensor
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "CANcoder {} on {}: configuration rejected: {}",
                    self.id, self.bus, err
                );
                Err(err)
            }
        }
    }

    pub fn signal(&mut self, kind: SignalKind) -> StatusSignal<'_, B, C> {
        StatusSignal {
            kind,
            backend: &mut self.backend,
            clock: &self.clock,
        }
    }

    pub fn position(&mut self) -> StatusSignal<'_, B, C> {
        self.signal(SignalKind::Position)
    }

    pub fn velocity(&mut self) -> StatusSignal<'_, B, C> {
        self.signal(SignalKind::Velocity)
    }

    pub fn absolute_position(&mut self) -> StatusSignal<'_, B, C> {
        self.signal(SignalKind::AbsolutePosition)
    }

    /// Write the reported position, then wait up to `timeout` for a Position
    /// frame that reflects it.
    ///
    /// A missed deadline is not an error: the returned sample carries
    /// `SignalStatus::RxTimeout` and whatever value was last received.
    pub fn set_position(
        &mut self,
        rotations: f64,
        timeout: Duration,
    ) -> Result<SignalSample, DeviceError> {
        let now = self.clock.now_us();
        self.backend.set_position(rotations, now)?;
        let confirmed = self.position().wait_for_update(timeout);
        if !confirmed.status.is_ok() {
            warn!(
                "CANcoder {}: set_position({}) not confirmed within {:?}",
                self.id, rotations, timeout
            );
        }
        Ok(confirmed)
    }
}

impl<B: SimulatedBackend, C: Clock> Cancoder<B, C> {
    /// Backdoor into the simulated magnet reading.
    pub fn sim_state(&mut self) -> SimState<'_, B, C> {
        SimState {
            backend: &mut self.backend,
            clock: &self.clock,
        }
    }
}

/// Borrowed handle to one status signal of a device.
pub struct StatusSignal<'a, B: SensorBackend, C: Clock> {
    kind: SignalKind,
    backend: &'a mut B,
    clock: &'a C,
}

impl<B: SensorBackend, C: Clock> StatusSignal<'_, B, C> {
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn set_update_frequency(&mut self, hz: f64) -> Result<(), DeviceError> {
        let now = self.clock.now_us();
        self.backend.set_update_frequency(self.kind, hz, now)
    }

    /// Cached read: the newest frame already received, no waiting.
    pub fn refresh(&mut self) -> SignalSample {
        let now = self.clock.now_us();
        let frame = self.backend.latest_frame(self.kind, now);
        SignalSample::from_frame(self.kind, frame, now)
    }

    /// Fresh read: block for a frame newer than the one cached right now,
    /// but never past `timeout`.
    pub fn wait_for_update(&mut self, timeout: Duration) -> SignalSample {
        let start = self.clock.now_us();
        let deadline = start.saturating_add(duration_us(timeout));
        let baseline = self
            .backend
            .latest_frame(self.kind, start)
            .map(|frame| frame.timestamp_us);

        loop {
            let now = self.clock.now_us();
            let frame = self.backend.latest_frame(self.kind, now);
            let newer = match (frame, baseline) {
                (Some(frame), Some(base)) => frame.timestamp_us > base,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if newer {
                return SignalSample::from_frame(self.kind, frame, now);
            }
            if now >= deadline {
                let sample = SignalSample::from_frame(self.kind, frame, now);
                debug!(
                    "{} wait timed out after {}us (latency {}s)",
                    self.kind.name(),
                    now - start,
                    sample.latency_s
                );
                return match sample.status {
                    SignalStatus::NoData => sample,
                    _ => sample.with_status(SignalStatus::RxTimeout),
                };
            }
            let wake = self
                .backend
                .next_arrival(self.kind, now)
                .map_or(deadline, |arrival| arrival.min(deadline));
            self.clock.sleep_until_us(wake);
        }
    }
}

/// Write access to the simulated raw state of a device.
pub struct SimState<'a, B: SimulatedBackend, C: Clock> {
    backend: &'a mut B,
    clock: &'a C,
}

impl<B: SimulatedBackend, C: Clock> SimState<'_, B, C> {
    pub fn set_raw_position(&mut self, rotations: f64) {
        let now = self.clock.now_us();
        self.backend.set_raw_position(rotations, now);
    }

    pub fn set_velocity(&mut self, rotations_per_s: f64) {
        let now = self.clock.now_us();
        self.backend.set_raw_velocity(rotations_per_s, now);
    }
}
