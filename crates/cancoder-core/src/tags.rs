/// Names under which one telemetry value is exported to each sink.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub rerun_path: &'static str,
}

pub const POSITION_ROT: Tag = Tag {
    key: "position_rot",
    metric: "cancoder_position_rotations",
    rerun_path: "cancoder/position",
};

pub const VELOCITY_RPS: Tag = Tag {
    key: "velocity_rps",
    metric: "cancoder_velocity_rotations_per_second",
    rerun_path: "cancoder/velocity",
};

pub const POSITION_LATENCY_S: Tag = Tag {
    key: "position_latency_s",
    metric: "cancoder_position_latency_seconds",
    rerun_path: "cancoder/latency/position",
};

pub const VELOCITY_LATENCY_S: Tag = Tag {
    key: "velocity_latency_s",
    metric: "cancoder_velocity_latency_seconds",
    rerun_path: "cancoder/latency/velocity",
};

pub const MECHANISM_ANGLE_DEG: Tag = Tag {
    key: "mechanism_angle_deg",
    metric: "cancoder_mechanism_angle_degrees",
    rerun_path: "mech2d/wrist_angle",
};

pub const SIM_VOLTAGE: Tag = Tag {
    key: "sim_voltage",
    metric: "cancoder_sim_motor_voltage",
    rerun_path: "sim/motor_voltage",
};

pub const TIMESTAMP_US: Tag = Tag {
    key: "timestamp_us",
    metric: "cancoder_timestamp_us",
    rerun_path: "system/timestamp_us",
};

pub const MECHANISM: Tag = Tag {
    key: "mechanism",
    metric: "cancoder_mechanism",
    rerun_path: "mech2d",
};
