use crate::mechanism::Mechanism2d;
use crate::scheduler::RobotMode;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub timestamp_us: u64,
    pub tick_count: u64,
    pub mode: Option<RobotMode>,
    pub position_rot: f64,
    pub velocity_rps: f64,
    pub position_latency_s: f64,
    pub velocity_latency_s: f64,
    pub sim_voltage: f64,
    pub mechanism_angle_deg: f64,
    pub reports_emitted: u64,
    pub read_timeouts: u64,
    pub mechanism: Option<Mechanism2d>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCommand {
    pub timestamp_us: u64,
    pub left_y: f64,
}

/// Latest-value cell. Writers overwrite, readers clone.
struct Mailbox<T: Clone> {
    slot: Mutex<T>,
}

impl<T: Clone> Mailbox<T> {
    fn new(value: T) -> Self {
        Self {
            slot: Mutex::new(value),
        }
    }

    fn write(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = value;
    }

    fn read(&self) -> T {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Hand-off point between the scheduler thread and the ambient threads
/// (dashboard bridge, metrics, visualization).
pub struct StateExchange {
    telemetry: Mailbox<TelemetrySnapshot>,
    axis: Mailbox<Option<AxisCommand>>,
    mode: Mailbox<Option<RobotMode>>,
    max_command_age_us: u64,
}

impl StateExchange {
    pub fn new(max_command_age_us: u64) -> Self {
        Self {
            telemetry: Mailbox::new(TelemetrySnapshot::default()),
            axis: Mailbox::new(None),
            mode: Mailbox::new(None),
            max_command_age_us,
        }
    }

    /// Called by the scheduler thread every tick.
    pub fn publish_state(&self, state: TelemetrySnapshot) {
        self.telemetry.write(state);
    }

    pub fn read_state(&self) -> TelemetrySnapshot {
        self.telemetry.read()
    }

    /// Called by the bridge thread.
    pub fn submit_axis(&self, command: AxisCommand) {
        self.axis.write(Some(command));
    }

    /// Axis value unless it is older than the command age limit.
    pub fn get_axis(&self, current_time_us: u64) -> Option<f64> {
        let command = self.axis.read()?;
        let age = current_time_us.saturating_sub(command.timestamp_us);
        if age > self.max_command_age_us {
            None
        } else {
            Some(command.left_y)
        }
    }

    /// `None` hands control back to the local mode schedule.
    pub fn request_mode(&self, mode: Option<RobotMode>) {
        self.mode.write(mode);
    }

    pub fn requested_mode(&self) -> Option<RobotMode> {
        self.mode.read()
    }
}
