use crate::device::Cancoder;
use crate::hal::SimulatedBackend;
use crate::mechanism::{Color8Bit, Ligament, Mechanism2d};
use crate::motor_sim::{DcMotor, DcMotorSim};
use crate::timebase::Clock;

pub const SUPPLY_VOLTAGE: f64 = 12.0;
pub const SIM_STEP_S: f64 = 0.02;
pub const WRIST_LIGAMENT: &str = "Wrist";

/// Source of the joystick axis that drives the simulated motor.
pub trait ControllerInput {
    /// Normalized axis value, `None` when no controller is attached.
    fn left_y(&mut self, now_us: u64) -> Option<f64>;
}

impl<F: FnMut(u64) -> Option<f64>> ControllerInput for F {
    fn left_y(&mut self, now_us: u64) -> Option<f64> {
        self(now_us)
    }
}

/// Axis pinned to a fixed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantAxis(pub f64);

impl ControllerInput for ConstantAxis {
    fn left_y(&mut self, _now_us: u64) -> Option<f64> {
        Some(self.0)
    }
}

/// Missing or non-finite input reads as 0; everything else is clamped to [-1, 1].
pub fn sanitize_axis(raw: Option<f64>) -> f64 {
    match raw {
        Some(value) if value.is_finite() => value.clamp(-1.0, 1.0),
        _ => 0.0,
    }
}

/// Result of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimFrame {
    pub axis: f64,
    pub voltage: f64,
    pub position_rot: f64,
    pub velocity_rps: f64,
    pub angle_deg: f64,
}

/// Drives a simulated sensor from motor physics.
///
/// Physics reach the device only through its raw sim state; the feed never
/// writes the reported position.
pub struct SimulationFeed {
    motor: DcMotorSim,
    mechanism: Mechanism2d,
    step_s: f64,
    last: SimFrame,
}

impl SimulationFeed {
    pub fn new(motor: DcMotorSim, mechanism: Mechanism2d) -> Self {
        Self {
            motor,
            mechanism,
            step_s: SIM_STEP_S,
            last: SimFrame::default(),
        }
    }

    /// Single Falcon 500, 100:1 reduction, 0.001 kg·m² load, wrist display.
    pub fn falcon_wrist() -> Self {
        Self::new(
            DcMotorSim::new(DcMotor::falcon500(1), 100.0, 0.001),
            wrist_mechanism(),
        )
    }

    pub fn step<B, C, I>(&mut self, device: &mut Cancoder<B, C>, input: &mut I) -> SimFrame
    where
        B: SimulatedBackend,
        C: Clock,
        I: ControllerInput + ?Sized,
    {
        let now = device.clock().now_us();
        let axis = sanitize_axis(input.left_y(now));
        let voltage = axis * SUPPLY_VOLTAGE;
        self.motor.set_input_voltage(voltage);
        self.motor.update(self.step_s);

        let position_rot = self.motor.angular_position_rotations();
        let velocity_rps = self.motor.angular_velocity_rpm() / 60.0;
        let mut sim = device.sim_state();
        sim.set_raw_position(position_rot);
        sim.set_velocity(velocity_rps);

        let angle_deg = position_rot * 360.0;
        if let Some(wrist) = self.mechanism.ligament_mut(WRIST_LIGAMENT) {
            wrist.set_angle(angle_deg);
        }

        self.last = SimFrame {
            axis,
            voltage: self.motor.input_voltage(),
            position_rot,
            velocity_rps,
            angle_deg,
        };
        self.last
    }

    pub fn last(&self) -> SimFrame {
        self.last
    }

    pub fn motor(&self) -> &DcMotorSim {
        &self.motor
    }

    pub fn mechanism(&self) -> &Mechanism2d {
        &self.mechanism
    }
}

/// 1x1 canvas with a wrist and an arrow head at its tip.
pub fn wrist_mechanism() -> Mechanism2d {
    let mut mech = Mechanism2d::new("mech2d", 1.0, 1.0);
    mech.root("base", 0.5, 0.5).append(
        Ligament::new(WRIST_LIGAMENT, 0.25, 90.0, 6.0, Color8Bit::ALICE_BLUE)
            .with_child(Ligament::new(
                "LeftArrow",
                0.1,
                150.0,
                6.0,
                Color8Bit::ALICE_BLUE,
            ))
            .with_child(Ligament::new(
                "RightArrow",
                0.1,
                -150.0,
                6.0,
                Color8Bit::ALICE_BLUE,
            )),
    );
    mech
}
