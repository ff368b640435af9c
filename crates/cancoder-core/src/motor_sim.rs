use std::f64::consts::PI;

/// Steady-state characteristics of a brushed/brushless DC motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcMotor {
    pub nominal_voltage: f64,
    pub stall_torque_nm: f64,
    pub stall_current_a: f64,
    pub free_current_a: f64,
    pub free_speed_rad_s: f64,
    /// Winding resistance, ohms.
    pub r_ohms: f64,
    /// Velocity constant, rad/s per volt.
    pub kv: f64,
    /// Torque constant, N·m per amp.
    pub kt: f64,
}

impl DcMotor {
    pub fn new(
        nominal_voltage: f64,
        stall_torque_nm: f64,
        stall_current_a: f64,
        free_current_a: f64,
        free_speed_rad_s: f64,
        num_motors: u32,
    ) -> Self {
        let n = num_motors.max(1) as f64;
        let stall_torque_nm = stall_torque_nm * n;
        let stall_current_a = stall_current_a * n;
        let free_current_a = free_current_a * n;
        let r_ohms = nominal_voltage / stall_current_a;
        Self {
            nominal_voltage,
            stall_torque_nm,
            stall_current_a,
            free_current_a,
            free_speed_rad_s,
            r_ohms,
            kv: free_speed_rad_s / (nominal_voltage - r_ohms * free_current_a),
            kt: stall_torque_nm / stall_current_a,
        }
    }

    /// Falcon 500 (TalonFX integrated motor).
    pub fn falcon500(num_motors: u32) -> Self {
        Self::new(12.0, 4.69, 257.0, 1.5, rpm_to_rad_s(6380.0), num_motors)
    }
}

pub fn rpm_to_rad_s(rpm: f64) -> f64 {
    rpm * 2.0 * PI / 60.0
}

pub fn rad_s_to_rpm(rad_s: f64) -> f64 {
    rad_s * 60.0 / (2.0 * PI)
}

/// Geared DC motor spinning a flywheel-like load.
///
/// State is output-shaft angle and angular velocity. The plant
/// `x' = A x + B u` with `A = [[0, 1], [0, a]]`, `B = [0, b]` is stepped with
/// its exact zero-order-hold solution, so results do not depend on step size.
#[derive(Debug, Clone)]
pub struct DcMotorSim {
    motor: DcMotor,
    gearing: f64,
    moi_kg_m2: f64,
    a: f64,
    b: f64,

    position_rad: f64,
    velocity_rad_s: f64,
    input_voltage: f64,
}

impl DcMotorSim {
    pub fn new(motor: DcMotor, gearing: f64, moi_kg_m2: f64) -> Self {
        let a = -gearing * gearing * motor.kt / (motor.kv * motor.r_ohms * moi_kg_m2);
        let b = gearing * motor.kt / (motor.r_ohms * moi_kg_m2);
        Self {
            motor,
            gearing,
            moi_kg_m2,
            a,
            b,
            position_rad: 0.0,
            velocity_rad_s: 0.0,
            input_voltage: 0.0,
        }
    }

    pub fn motor(&self) -> &DcMotor {
        &self.motor
    }

    pub fn gearing(&self) -> f64 {
        self.gearing
    }

    pub fn moi_kg_m2(&self) -> f64 {
        self.moi_kg_m2
    }

    /// Voltage is clamped to the motor's nominal supply; non-finite input is 0 V.
    pub fn set_input_voltage(&mut self, volts: f64) {
        let limit = self.motor.nominal_voltage;
        self.input_voltage = if volts.is_finite() {
            volts.clamp(-limit, limit)
        } else {
            0.0
        };
    }

    pub fn input_voltage(&self) -> f64 {
        self.input_voltage
    }

    pub fn update(&mut self, dt_s: f64) {
        let (p0, v0) = (self.position_rad, self.velocity_rad_s);
        let bu = self.b * self.input_voltage;

        if self.a == 0.0 {
            self.position_rad = p0 + v0 * dt_s + 0.5 * bu * dt_s * dt_s;
            self.velocity_rad_s = v0 + bu * dt_s;
            return;
        }

        let decay = (self.a * dt_s).exp() - 1.0;
        self.velocity_rad_s = v0 + (v0 + bu / self.a) * decay;
        self.position_rad = p0 + v0 / self.a * decay + bu / self.a * (decay / self.a - dt_s);
    }

    pub fn angular_position_rad(&self) -> f64 {
        self.position_rad
    }

    pub fn angular_position_rotations(&self) -> f64 {
        self.position_rad / (2.0 * PI)
    }

    pub fn angular_velocity_rad_s(&self) -> f64 {
        self.velocity_rad_s
    }

    pub fn angular_velocity_rpm(&self) -> f64 {
        rad_s_to_rpm(self.velocity_rad_s)
    }

    /// Output-shaft velocity the plant settles at for the current input.
    pub fn steady_state_velocity_rad_s(&self) -> f64 {
        self.input_voltage * self.motor.kv / self.gearing
    }
}
