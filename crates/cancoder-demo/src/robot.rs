//! The demo program: configure the CANcoder, report its signals twice a
//! second, zero it to 0.4 rotations on teleop entry and drive it from a
//! simulated wrist.

use crate::infra::audit::{AuditEventType, AuditLogger};
use cancoder_core::sim_feed::{ControllerInput, SimulationFeed};
use cancoder_core::{
    Cancoder, CancoderConfiguration, Clock, DeviceError, ModeSource, ReportCadence, Robot,
    RobotMode, SignalKind, SignalSample, SimulatedBackend, StateExchange, TelemetrySnapshot,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Target written on teleop entry.
pub const TELEOP_POSITION_ROT: f64 = 0.4;
/// Deadline for the position write and for its read-back.
pub const SET_POSITION_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum RobotError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("report output failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub config: CancoderConfiguration,
    pub update_hz: f64,
    pub report_period: Duration,
    pub read_timeout: Duration,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            config: CancoderConfiguration::default(),
            update_hz: 100.0,
            report_period: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
        }
    }
}

pub struct CancoderRobot<B: SimulatedBackend, C: Clock, I: ControllerInput> {
    device: Cancoder<B, C>,
    feed: SimulationFeed,
    input: I,
    settings: DemoSettings,
    cadence: ReportCadence,
    out: Box<dyn Write + Send>,
    exchange: Arc<StateExchange>,
    audit: Option<Arc<AuditLogger>>,
    mode: Option<RobotMode>,
    tick_count: u64,
    reports_emitted: u64,
    read_timeouts: u64,
}

impl<B: SimulatedBackend, C: Clock, I: ControllerInput> CancoderRobot<B, C, I> {
    pub fn new(
        device: Cancoder<B, C>,
        feed: SimulationFeed,
        input: I,
        settings: DemoSettings,
        out: Box<dyn Write + Send>,
        exchange: Arc<StateExchange>,
    ) -> Self {
        let cadence = ReportCadence::new(device.clock().now_us(), settings.report_period);
        Self {
            device,
            feed,
            input,
            settings,
            cadence,
            out,
            exchange,
            audit: None,
            mode: None,
            tick_count: 0,
            reports_emitted: 0,
            read_timeouts: 0,
        }
    }

    pub fn with_audit(mut self, audit: Option<Arc<AuditLogger>>) -> Self {
        self.audit = audit;
        self
    }

    pub fn device(&self) -> &Cancoder<B, C> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Cancoder<B, C> {
        &mut self.device
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports_emitted
    }

    pub fn read_timeouts(&self) -> u64 {
        self.read_timeouts
    }

    fn record(&self, event_type: AuditEventType, details: serde_json::Value) {
        if let Some(audit) = &self.audit {
            let now = self.device.clock().now_us();
            audit.record(now, event_type, details);
        }
    }

    fn report(&mut self) -> Result<(), RobotError> {
        let position = self.device.position().refresh();
        writeln!(
            self.out,
            "Position is {} with {}s of latency",
            position, position.latency_s
        )?;

        let velocity = self
            .device
            .velocity()
            .wait_for_update(self.settings.read_timeout);
        if !velocity.status.is_ok() {
            self.read_timeouts += 1;
        }
        writeln!(
            self.out,
            "Velocity is {} {} with {}s of latency",
            velocity.value, velocity.units, velocity.latency_s
        )?;
        writeln!(self.out)?;
        self.out.flush()?;

        self.reports_emitted += 1;
        Ok(())
    }

    fn publish(&mut self, position: &SignalSample, velocity: &SignalSample) {
        let sim = self.feed.last();
        self.exchange.publish_state(TelemetrySnapshot {
            timestamp_us: self.device.clock().now_us(),
            tick_count: self.tick_count,
            mode: self.mode,
            position_rot: position.value,
            velocity_rps: velocity.value,
            position_latency_s: position.latency_s,
            velocity_latency_s: velocity.latency_s,
            sim_voltage: sim.voltage,
            mechanism_angle_deg: sim.angle_deg,
            reports_emitted: self.reports_emitted,
            read_timeouts: self.read_timeouts,
            mechanism: Some(self.feed.mechanism().clone()),
        });
    }
}

impl<B: SimulatedBackend, C: Clock, I: ControllerInput> Robot for CancoderRobot<B, C, I> {
    type Error = RobotError;

    fn robot_init(&mut self) -> Result<(), RobotError> {
        self.device.apply_config(&self.settings.config)?;
        self.record(
            AuditEventType::ConfigApplied,
            serde_json::json!({
                "device_id": self.device.id(),
                "bus": self.device.bus(),
                "config": &self.settings.config,
            }),
        );

        let hz = self.settings.update_hz;
        self.device.position().set_update_frequency(hz)?;
        self.device.velocity().set_update_frequency(hz)?;
        info!(update_hz = hz, "Position and velocity update frequency set");
        Ok(())
    }

    fn robot_periodic(&mut self) -> Result<(), RobotError> {
        self.tick_count += 1;
        let now = self.device.clock().now_us();
        if self.cadence.poll(now) {
            self.report()?;
        }

        let position = self.device.position().refresh();
        let velocity = self.device.signal(SignalKind::Velocity).refresh();
        self.publish(&position, &velocity);
        Ok(())
    }

    fn teleop_init(&mut self) -> Result<(), RobotError> {
        let confirmed = self
            .device
            .set_position(TELEOP_POSITION_ROT, SET_POSITION_TIMEOUT)?;
        if !confirmed.status.is_ok() {
            self.record(
                AuditEventType::ConfirmationTimeout,
                serde_json::json!({
                    "target": TELEOP_POSITION_ROT,
                    "timeout_s": SET_POSITION_TIMEOUT.as_secs_f64(),
                    "status": format!("{:?}", confirmed.status),
                }),
            );
        }

        let current = self
            .device
            .position()
            .wait_for_update(SET_POSITION_TIMEOUT);
        writeln!(
            self.out,
            "Set the position to {} rotations, we are currently at {}",
            TELEOP_POSITION_ROT, current
        )?;
        self.out.flush()?;

        self.record(
            AuditEventType::PositionSet,
            serde_json::json!({
                "target": TELEOP_POSITION_ROT,
                "confirmed": confirmed.status.is_ok(),
                "reported": current.value,
                "latency_s": current.latency_s,
            }),
        );
        Ok(())
    }

    fn simulation_periodic(&mut self) -> Result<(), RobotError> {
        let frame = self.feed.step(&mut self.device, &mut self.input);
        debug!(
            axis = frame.axis,
            voltage = frame.voltage,
            position_rot = frame.position_rot,
            "Simulation step"
        );
        Ok(())
    }

    fn on_mode_change(&mut self, from: Option<RobotMode>, to: RobotMode) {
        self.mode = Some(to);
        self.record(
            AuditEventType::ModeTransition,
            serde_json::json!({ "from": from, "to": to }),
        );
    }
}

/// Dashboard axis when one is fresh, otherwise the local fallback.
pub struct ExchangeAxis {
    exchange: Arc<StateExchange>,
    fallback: Option<f64>,
}

impl ExchangeAxis {
    pub fn new(exchange: Arc<StateExchange>, fallback: Option<f64>) -> Self {
        Self { exchange, fallback }
    }
}

impl ControllerInput for ExchangeAxis {
    fn left_y(&mut self, now_us: u64) -> Option<f64> {
        self.exchange.get_axis(now_us).or(self.fallback)
    }
}

/// Dashboard mode override on top of a local mode source.
pub struct RemoteModeSource<M: ModeSource> {
    exchange: Arc<StateExchange>,
    local: M,
}

impl<M: ModeSource> RemoteModeSource<M> {
    pub fn new(exchange: Arc<StateExchange>, local: M) -> Self {
        Self { exchange, local }
    }
}

impl<M: ModeSource> ModeSource for RemoteModeSource<M> {
    fn mode(&mut self, now_us: u64) -> RobotMode {
        match self.exchange.requested_mode() {
            Some(mode) => mode,
            None => self.local.mode(now_us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cancoder_core::sim_feed::ConstantAxis;
    use cancoder_core::{
        FixedMode, ModeSchedule, Scheduler, SchedulerConfig, SimClock, SimulatedCancoder,
    };
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    /// Report sink the test can read back after the robot has taken ownership.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    type TestRobot = CancoderRobot<SimulatedCancoder, SimClock, ConstantAxis>;

    fn robot(clock: &SimClock, axis: f64, settings: DemoSettings) -> (TestRobot, SharedSink) {
        let sink = SharedSink::default();
        let device = Cancoder::new(1, "rio", SimulatedCancoder::new(), clock.clone());
        let robot = CancoderRobot::new(
            device,
            SimulationFeed::falcon_wrist(),
            ConstantAxis(axis),
            settings,
            Box::new(sink.clone()),
            Arc::new(StateExchange::new(500_000)),
        );
        (robot, sink)
    }

    fn run_for<M: ModeSource>(robot: TestRobot, clock: &SimClock, modes: M, ticks: u64) -> TestRobot {
        let mut scheduler = Scheduler::new(
            robot,
            clock.clone(),
            modes,
            SchedulerConfig {
                max_ticks: Some(ticks),
                ..Default::default()
            },
        );
        scheduler.run(&AtomicBool::new(false)).unwrap();
        scheduler.into_robot()
    }

    #[test]
    fn reports_twice_a_second() {
        let clock = SimClock::new();
        let (robot, sink) = robot(&clock, 0.0, DemoSettings::default());
        let robot = run_for(robot, &clock, FixedMode(RobotMode::Disabled), 100);

        let text = sink.text();
        assert_eq!(text.matches("Position is ").count() as u64, robot.reports_emitted());
        assert!(robot.reports_emitted() >= 3);
        assert!(text.contains("Position is 0 rotations with "));
        assert!(text.contains("Velocity is 0 rotations per second with "));
        assert!(text.contains("s of latency\n\n"));
        assert_eq!(robot.read_timeouts(), 0);
    }

    #[test]
    fn teleop_entry_sets_position() {
        let clock = SimClock::new();
        let (robot, sink) = robot(&clock, 0.0, DemoSettings::default());
        let modes: ModeSchedule = "0:disabled,0.1:teleop".parse().unwrap();
        run_for(robot, &clock, modes, 20);

        let text = sink.text();
        assert_eq!(text.matches("Set the position to").count(), 1);
        assert!(text.contains("Set the position to 0.4 rotations, we are currently at 0.4 rotations"));
    }

    #[test]
    fn invalid_config_is_fatal() {
        let clock = SimClock::new();
        let mut settings = DemoSettings::default();
        settings.config.magnet_sensor.magnet_offset = 3.0;
        let (robot, _sink) = robot(&clock, 0.0, settings);
        let mut scheduler = Scheduler::new(
            robot,
            clock.clone(),
            FixedMode(RobotMode::Disabled),
            SchedulerConfig::default(),
        );
        assert!(matches!(
            scheduler.tick(),
            Err(RobotError::Device(DeviceError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn disabled_velocity_times_out_at_read_timeout() {
        let clock = SimClock::new();
        let settings = DemoSettings {
            update_hz: 0.0,
            read_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (robot, sink) = robot(&clock, 0.0, settings);
        let robot = run_for(robot, &clock, FixedMode(RobotMode::Disabled), 30);

        assert!(robot.reports_emitted() >= 1);
        assert_eq!(robot.read_timeouts(), robot.reports_emitted());
        assert!(sink.text().contains("Velocity is "));
    }

    #[test]
    fn snapshot_follows_simulated_wrist() {
        let clock = SimClock::new();
        let (robot, _sink) = robot(&clock, 0.5, DemoSettings::default());
        let exchange = Arc::clone(&robot.exchange);
        run_for(robot, &clock, FixedMode(RobotMode::Disabled), 50);

        let snapshot = exchange.read_state();
        assert_eq!(snapshot.tick_count, 50);
        assert_eq!(snapshot.mode, Some(RobotMode::Disabled));
        assert!(snapshot.sim_voltage > 5.9 && snapshot.sim_voltage < 6.1);
        assert!(snapshot.position_rot > 0.0);
        let mech = snapshot.mechanism.unwrap();
        let wrist = mech.ligament("Wrist").unwrap();
        assert!((wrist.angle_deg - snapshot.mechanism_angle_deg).abs() < 1e-9);
    }

    #[test]
    fn snapshot_velocity_and_latency_come_from_one_sample() {
        let clock = SimClock::new();
        let settings = DemoSettings {
            update_hz: 0.0,
            read_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (robot, _sink) = robot(&clock, 0.0, settings);
        let mut robot = run_for(robot, &clock, FixedMode(RobotMode::Disabled), 30);
        assert!(robot.reports_emitted() >= 1);

        let snapshot = robot.exchange.read_state();
        let cached = robot.device_mut().velocity().refresh();
        assert_eq!(snapshot.velocity_rps, cached.value);
        assert_eq!(snapshot.velocity_latency_s, cached.latency_s);
    }

    #[test]
    fn dashboard_overrides_axis_and_mode() {
        let exchange = Arc::new(StateExchange::new(500_000));
        let mut axis = ExchangeAxis::new(Arc::clone(&exchange), Some(0.2));
        let mut modes = RemoteModeSource::new(Arc::clone(&exchange), FixedMode(RobotMode::Disabled));

        assert_eq!(axis.left_y(0), Some(0.2));
        exchange.submit_axis(cancoder_core::AxisCommand {
            timestamp_us: 1_000,
            left_y: -0.7,
        });
        assert_eq!(axis.left_y(2_000), Some(-0.7));
        assert_eq!(axis.left_y(1_000_000), Some(0.2));

        assert_eq!(modes.mode(0), RobotMode::Disabled);
        exchange.request_mode(Some(RobotMode::Teleop));
        assert_eq!(modes.mode(0), RobotMode::Teleop);
    }
}
