use crate::timebase::{duration_us, Clock};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    Disabled,
    Autonomous,
    Teleop,
    Test,
}

impl RobotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotMode::Disabled => "disabled",
            RobotMode::Autonomous => "autonomous",
            RobotMode::Teleop => "teleop",
            RobotMode::Test => "test",
        }
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModeParseError {
    #[error("unknown robot mode '{0}'")]
    UnknownMode(String),
    #[error("malformed schedule entry '{0}', expected <seconds>:<mode>")]
    MalformedEntry(String),
}

impl FromStr for RobotMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(RobotMode::Disabled),
            "autonomous" | "auto" => Ok(RobotMode::Autonomous),
            "teleop" => Ok(RobotMode::Teleop),
            "test" => Ok(RobotMode::Test),
            other => Err(ModeParseError::UnknownMode(other.to_string())),
        }
    }
}

/// Lifecycle hooks invoked by the [`Scheduler`].
///
/// Every hook defaults to a no-op. An `Err` from any hook stops the
/// scheduler and is handed back to the caller untouched.
#[allow(unused_variables)]
pub trait Robot {
    type Error;

    fn robot_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn robot_periodic(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn simulation_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn simulation_periodic(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn disabled_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn disabled_periodic(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn disabled_exit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn autonomous_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn autonomous_periodic(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn autonomous_exit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn teleop_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn teleop_periodic(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn teleop_exit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn test_init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn test_periodic(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn test_exit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called after the init hook of every transition.
    fn on_mode_change(&mut self, from: Option<RobotMode>, to: RobotMode) {}
}

/// Who decides which mode the robot is in (the driver station, usually).
pub trait ModeSource {
    fn mode(&mut self, now_us: u64) -> RobotMode;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedMode(pub RobotMode);

impl ModeSource for FixedMode {
    fn mode(&mut self, _now_us: u64) -> RobotMode {
        self.0
    }
}

/// Time-ordered list of mode changes. Before the first entry the robot is
/// disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSchedule {
    steps: Vec<(u64, RobotMode)>,
}

impl ModeSchedule {
    pub fn new(mut steps: Vec<(u64, RobotMode)>) -> Self {
        steps.sort_by_key(|(start, _)| *start);
        Self { steps }
    }

    pub fn steps(&self) -> &[(u64, RobotMode)] {
        &self.steps
    }
}

impl FromStr for ModeSchedule {
    type Err = ModeParseError;

    /// Parses `"0:disabled,1.5:teleop"` (seconds since start).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut steps = Vec::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (secs, mode) = entry
                .split_once(':')
                .ok_or_else(|| ModeParseError::MalformedEntry(entry.to_string()))?;
            let secs: f64 = secs
                .trim()
                .parse()
                .map_err(|_| ModeParseError::MalformedEntry(entry.to_string()))?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(ModeParseError::MalformedEntry(entry.to_string()));
            }
            steps.push(((secs * 1_000_000.0) as u64, mode.parse()?));
        }
        Ok(Self::new(steps))
    }
}

impl ModeSource for ModeSchedule {
    fn mode(&mut self, now_us: u64) -> RobotMode {
        self.steps
            .iter()
            .rev()
            .find(|(start, _)| *start <= now_us)
            .map_or(RobotMode::Disabled, |(_, mode)| *mode)
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub period: Duration,
    /// Run the simulation hooks after each tick.
    pub simulation: bool,
    /// Stop after this many ticks (deterministic runs).
    pub max_ticks: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(20),
            simulation: true,
            max_ticks: None,
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub ticks_executed: u64,
    pub ticks_overrun: u64,
    pub max_jitter_us: u64,
    pub mode_transitions: u64,
}

/// Fixed-rate lifecycle driver: one mode init per transition, then mode,
/// robot and simulation periodic hooks every tick, all on the calling thread.
pub struct Scheduler<R: Robot, C: Clock, M: ModeSource> {
    robot: R,
    clock: C,
    modes: M,
    config: SchedulerConfig,
    stats: ExecutionStats,
    current: Option<RobotMode>,
    started: bool,
}

impl<R: Robot, C: Clock, M: ModeSource> Scheduler<R, C, M> {
    pub fn new(robot: R, clock: C, modes: M, config: SchedulerConfig) -> Self {
        Self {
            robot,
            clock,
            modes,
            config,
            stats: ExecutionStats::default(),
            current: None,
            started: false,
        }
    }

    pub fn start(&mut self) -> Result<(), R::Error> {
        if self.started {
            return Ok(());
        }
        self.robot.robot_init()?;
        if self.config.simulation {
            self.robot.simulation_init()?;
        }
        self.started = true;
        Ok(())
    }

    /// Run one iteration now and return the mode it ran in.
    pub fn tick(&mut self) -> Result<RobotMode, R::Error> {
        self.start()?;
        let now = self.clock.now_us();
        let mode = self.modes.mode(now);

        if self.current != Some(mode) {
            let previous = self.current;
            if let Some(previous) = previous {
                self.exit(previous)?;
            }
            info!("Mode transition {:?} -> {}", previous.map(|m| m.as_str()), mode);
            self.current = Some(mode);
            self.stats.mode_transitions += 1;
            self.init(mode)?;
            self.robot.on_mode_change(previous, mode);
        }

        self.periodic(mode)?;
        self.robot.robot_periodic()?;
        if self.config.simulation {
            self.robot.simulation_periodic()?;
        }
        self.stats.ticks_executed += 1;
        Ok(mode)
    }

    /// Tick at the configured period until `stop` is set or the tick limit
    /// is reached. Deadlines stay on whole periods from the start time. A
    /// tick that runs past its deadline counts as one overrun and the
    /// periods it swallowed are skipped rather than replayed.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<ExecutionStats, R::Error> {
        self.start()?;
        let period_us = duration_us(self.config.period).max(1);
        let mut next_tick = self.clock.now_us().saturating_add(period_us);

        while !stop.load(Ordering::Relaxed) {
            if let Some(max) = self.config.max_ticks {
                if self.stats.ticks_executed >= max {
                    break;
                }
            }

            self.clock.sleep_until_us(next_tick);
            let tick_start = self.clock.now_us();
            let jitter_us = tick_start.saturating_sub(next_tick);
            self.stats.max_jitter_us = self.stats.max_jitter_us.max(jitter_us);

            self.tick()?;

            let tick_end = self.clock.now_us();
            next_tick = next_tick.saturating_add(period_us);
            if tick_end > next_tick {
                let late_us = tick_end - next_tick;
                self.stats.ticks_overrun += 1;
                warn!(
                    "Loop time of {}s overrun ({}us late)",
                    self.config.period.as_secs_f64(),
                    late_us
                );
                let skipped = (late_us / period_us + 1).saturating_mul(period_us);
                next_tick = next_tick.saturating_add(skipped);
            }
        }

        Ok(self.stats.clone())
    }

    fn init(&mut self, mode: RobotMode) -> Result<(), R::Error> {
        match mode {
            RobotMode::Disabled => self.robot.disabled_init(),
            RobotMode::Autonomous => self.robot.autonomous_init(),
            RobotMode::Teleop => self.robot.teleop_init(),
            RobotMode::Test => self.robot.test_init(),
        }
    }

    fn periodic(&mut self, mode: RobotMode) -> Result<(), R::Error> {
        match mode {
            RobotMode::Disabled => self.robot.disabled_periodic(),
            RobotMode::Autonomous => self.robot.autonomous_periodic(),
            RobotMode::Teleop => self.robot.teleop_periodic(),
            RobotMode::Test => self.robot.test_periodic(),
        }
    }

    fn exit(&mut self, mode: RobotMode) -> Result<(), R::Error> {
        match mode {
            RobotMode::Disabled => self.robot.disabled_exit(),
            RobotMode::Autonomous => self.robot.autonomous_exit(),
            RobotMode::Teleop => self.robot.teleop_exit(),
            RobotMode::Test => self.robot.test_exit(),
        }
    }

    pub fn current_mode(&self) -> Option<RobotMode> {
        self.current
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn into_robot(self) -> R {
        self.robot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebase::SimClock;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn hit(&mut self, name: &'static str) -> Result<(), String> {
            self.calls.push(name);
            if self.fail_on == Some(name) {
                return Err(format!("{name} failed"));
            }
            Ok(())
        }
    }

    impl Robot for Recorder {
        type Error = String;

        fn robot_init(&mut self) -> Result<(), String> {
            self.hit("robot_init")
        }
        fn robot_periodic(&mut self) -> Result<(), String> {
            self.hit("robot_periodic")
        }
        fn simulation_init(&mut self) -> Result<(), String> {
            self.hit("simulation_init")
        }
        fn simulation_periodic(&mut self) -> Result<(), String> {
            self.hit("simulation_periodic")
        }
        fn disabled_init(&mut self) -> Result<(), String> {
            self.hit("disabled_init")
        }
        fn disabled_periodic(&mut self) -> Result<(), String> {
            self.hit("disabled_periodic")
        }
        fn disabled_exit(&mut self) -> Result<(), String> {
            self.hit("disabled_exit")
        }
        fn teleop_init(&mut self) -> Result<(), String> {
            self.hit("teleop_init")
        }
        fn teleop_periodic(&mut self) -> Result<(), String> {
            self.hit("teleop_periodic")
        }
    }

    #[test]
    fn tick_order_and_single_init() {
        let clock = SimClock::new();
        let mut sched = Scheduler::new(
            Recorder::default(),
            clock.clone(),
            FixedMode(RobotMode::Teleop),
            SchedulerConfig::default(),
        );
        sched.tick().unwrap();
        sched.tick().unwrap();
        assert_eq!(
            sched.robot().calls,
            vec![
                "robot_init",
                "simulation_init",
                "teleop_init",
                "teleop_periodic",
                "robot_periodic",
                "simulation_periodic",
                "teleop_periodic",
                "robot_periodic",
                "simulation_periodic",
            ]
        );
    }

    #[test]
    fn transition_calls_exit_then_init() {
        let clock = SimClock::new();
        let schedule: ModeSchedule = "0:disabled,0.04:teleop".parse().unwrap();
        let mut sched = Scheduler::new(
            Recorder::default(),
            clock.clone(),
            schedule,
            SchedulerConfig {
                simulation: false,
                ..Default::default()
            },
        );
        for _ in 0..4 {
            sched.tick().unwrap();
            clock.advance_us(20_000);
        }
        let calls = &sched.robot().calls;
        assert_eq!(calls.iter().filter(|c| **c == "disabled_init").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "teleop_init").count(), 1);
        let exit = calls.iter().position(|c| *c == "disabled_exit").unwrap();
        let init = calls.iter().position(|c| *c == "teleop_init").unwrap();
        assert_eq!(init, exit + 1);
        assert_eq!(sched.stats().mode_transitions, 2);
        assert_eq!(sched.current_mode(), Some(RobotMode::Teleop));
    }

    #[test]
    fn hook_error_propagates_from_run() {
        let clock = SimClock::new();
        let robot = Recorder {
            fail_on: Some("teleop_init"),
            ..Default::default()
        };
        let mut sched = Scheduler::new(
            robot,
            clock,
            FixedMode(RobotMode::Teleop),
            SchedulerConfig::default(),
        );
        let stop = AtomicBool::new(false);
        assert_eq!(sched.run(&stop).unwrap_err(), "teleop_init failed");
        assert_eq!(sched.stats().ticks_executed, 0);
    }

    #[test]
    fn run_honours_tick_limit_and_period() {
        let clock = SimClock::new();
        let mut sched = Scheduler::new(
            Recorder::default(),
            clock.clone(),
            FixedMode(RobotMode::Disabled),
            SchedulerConfig {
                max_ticks: Some(25),
                ..Default::default()
            },
        );
        let stats = sched.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(stats.ticks_executed, 25);
        assert_eq!(stats.ticks_overrun, 0);
        assert_eq!(clock.now_us(), 25 * 20_000);
    }

    /// Stalls the clock once, on a chosen `robot_periodic` call.
    struct Staller {
        clock: SimClock,
        stall_on: usize,
        stall_us: u64,
        tick_times: Vec<u64>,
    }

    impl Robot for Staller {
        type Error = String;

        fn robot_periodic(&mut self) -> Result<(), String> {
            self.tick_times.push(self.clock.now_us());
            if self.tick_times.len() == self.stall_on {
                self.clock.advance_us(self.stall_us);
            }
            Ok(())
        }
    }

    #[test]
    fn stalled_tick_skips_missed_periods() {
        let clock = SimClock::new();
        let robot = Staller {
            clock: clock.clone(),
            stall_on: 5,
            stall_us: 500_000,
            tick_times: Vec::new(),
        };
        let mut sched = Scheduler::new(
            robot,
            clock.clone(),
            FixedMode(RobotMode::Teleop),
            SchedulerConfig {
                max_ticks: Some(40),
                ..Default::default()
            },
        );
        let stats = sched.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(stats.ticks_executed, 40);
        assert_eq!(stats.ticks_overrun, 1);

        let times = &sched.robot().tick_times;
        assert_eq!(&times[3..7], &[80_000, 100_000, 620_000, 640_000]);
        assert!(times.windows(2).all(|w| w[1] - w[0] >= 20_000));
        assert!(times.iter().all(|t| t % 20_000 == 0));
    }

    struct Panicker;

    impl Robot for Panicker {
        type Error = String;

        fn teleop_periodic(&mut self) -> Result<(), String> {
            panic!("teleop_periodic blew up");
        }
    }

    #[test]
    #[should_panic(expected = "teleop_periodic blew up")]
    fn hook_panic_escapes_run() {
        let mut sched = Scheduler::new(
            Panicker,
            SimClock::new(),
            FixedMode(RobotMode::Teleop),
            SchedulerConfig::default(),
        );
        let _ = sched.run(&AtomicBool::new(false));
    }

    #[test]
    fn hook_panic_is_not_turned_into_a_result() {
        let mut sched = Scheduler::new(
            Panicker,
            SimClock::new(),
            FixedMode(RobotMode::Teleop),
            SchedulerConfig::default(),
        );
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sched.run(&AtomicBool::new(false))
        }));
        let payload = caught.expect_err("run must unwind, not return");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"teleop_periodic blew up"));
    }

    #[test]
    fn stop_flag_ends_run_before_first_tick() {
        let clock = SimClock::new();
        let mut sched = Scheduler::new(
            Recorder::default(),
            clock,
            FixedMode(RobotMode::Disabled),
            SchedulerConfig::default(),
        );
        let stats = sched.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(stats.ticks_executed, 0);
        assert_eq!(sched.robot().calls, vec!["robot_init", "simulation_init"]);
    }

    #[test]
    fn schedule_parsing() {
        let schedule: ModeSchedule = "2:teleop, 0:disabled".parse().unwrap();
        assert_eq!(
            schedule.steps(),
            &[(0, RobotMode::Disabled), (2_000_000, RobotMode::Teleop)]
        );
        assert!("x:teleop".parse::<ModeSchedule>().is_err());
        assert!(matches!(
            "1:flying".parse::<ModeSchedule>(),
            Err(ModeParseError::UnknownMode(_))
        ));
        let mut schedule = schedule;
        assert_eq!(schedule.mode(1_999_999), RobotMode::Disabled);
        assert_eq!(schedule.mode(2_000_000), RobotMode::Teleop);
    }
}
