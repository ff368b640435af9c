pub mod cadence;
pub mod config;
pub mod device;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod mechanism;
#[cfg(feature = "simulation")]
pub mod motor_sim;
#[cfg(all(test, feature = "simulation"))]
mod properties;
pub mod scheduler;
pub mod signal;
#[cfg(feature = "simulation")]
pub mod sim_feed;
pub mod sync;
pub mod tags;
pub mod timebase;

pub use cadence::ReportCadence;
pub use config::{CancoderConfiguration, ConfigError, MagnetSensorConfigs, SensorDirection};
pub use device::{Cancoder, SimState, StatusSignal};
pub use hal::{DeviceError, SensorBackend, SimulatedBackend};
#[cfg(feature = "simulation")]
pub use hal_sim::SimulatedCancoder;
pub use mechanism::{Color8Bit, Ligament, Mechanism2d, Segment};
#[cfg(feature = "simulation")]
pub use motor_sim::{DcMotor, DcMotorSim};
pub use scheduler::{
    ExecutionStats, FixedMode, ModeSchedule, ModeSource, Robot, RobotMode, Scheduler,
    SchedulerConfig,
};
pub use signal::{Frame, SignalKind, SignalSample, SignalStatus};
#[cfg(feature = "simulation")]
pub use sim_feed::{ConstantAxis, ControllerInput, SimFrame, SimulationFeed};
pub use sync::{AxisCommand, StateExchange, TelemetrySnapshot};
pub use timebase::{duration_us, Clock, SimClock, TimeBase};
