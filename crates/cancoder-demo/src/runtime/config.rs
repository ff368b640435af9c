use cancoder_core::scheduler::ModeParseError;
use cancoder_core::{ModeSchedule, RobotMode};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODE_SCHEDULE: &str = "0:disabled,1:teleop";

#[derive(Debug, Error)]
pub enum ArgError {
    #[error("{0} expects a value")]
    MissingValue(String),
    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },
    #[error(transparent)]
    Mode(#[from] ModeParseError),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<f64>,
    pub modes: ModeSchedule,
    pub tick: Duration,
    pub report_period: Duration,
    pub read_timeout: Duration,
    pub update_hz: f64,
    /// Axis used while no dashboard client is driving it.
    pub axis: Option<f64>,
    pub device_config: Option<PathBuf>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub bridge_require_handshake: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub event_log: Option<PathBuf>,
    #[cfg(feature = "rerun")]
    pub rerun_enabled: bool,
    #[cfg(feature = "rerun")]
    pub rerun_save_path: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            modes: default_schedule(),
            tick: Duration::from_millis(20),
            report_period: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
            update_hz: 100.0,
            axis: None,
            device_config: None,
            bind_addr: "127.0.0.1:7000".to_string(),
            bridge_enabled: true,
            bridge_require_handshake: false,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            event_log: None,
            #[cfg(feature = "rerun")]
            rerun_enabled: false,
            #[cfg(feature = "rerun")]
            rerun_save_path: None,
        }
    }
}

fn default_schedule() -> ModeSchedule {
    ModeSchedule::new(vec![(0, RobotMode::Disabled), (1_000_000, RobotMode::Teleop)])
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ArgError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ArgError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--run-seconds" => {
                    let secs: f64 = parse_value(args, &mut i)?;
                    if !secs.is_finite() || secs < 0.0 {
                        return Err(invalid(flag, &args[i]));
                    }
                    cfg.run_seconds = Some(secs);
                }
                "--mode" => {
                    let mode: RobotMode = value(args, &mut i)?.parse()?;
                    cfg.modes = ModeSchedule::new(vec![(0, mode)]);
                }
                "--mode-schedule" => {
                    cfg.modes = value(args, &mut i)?.parse()?;
                }
                "--tick-ms" => {
                    cfg.tick = Duration::from_millis(parse_positive_ms(args, &mut i)?);
                }
                "--report-period-ms" => {
                    cfg.report_period = Duration::from_millis(parse_positive_ms(args, &mut i)?);
                }
                "--read-timeout-ms" => {
                    cfg.read_timeout = Duration::from_millis(parse_value(args, &mut i)?);
                }
                "--update-hz" => {
                    cfg.update_hz = parse_value(args, &mut i)?;
                }
                "--axis" => {
                    cfg.axis = Some(parse_value(args, &mut i)?);
                }
                "--device-config" => {
                    cfg.device_config = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--bind" => {
                    cfg.bind_addr = value(args, &mut i)?.to_string();
                }
                "--no-bridge" => {
                    cfg.bridge_enabled = false;
                }
                "--require-handshake" => {
                    cfg.bridge_require_handshake = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    cfg.log_dir = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, &mut i)?.to_string());
                }
                "--event-log" => {
                    cfg.event_log = Some(PathBuf::from(value(args, &mut i)?));
                }
                #[cfg(feature = "rerun")]
                "--rerun" => {
                    cfg.rerun_enabled = true;
                }
                #[cfg(feature = "rerun")]
                "--rerun-save" => {
                    cfg.rerun_enabled = true;
                    cfg.rerun_save_path = Some(value(args, &mut i)?.to_string());
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        Ok(cfg)
    }

    pub fn print_help() {
        println!(
            r#"cancoder-demo - CANcoder signal demo with a simulated wrist

USAGE:
    cancoder-demo [OPTIONS]

OPTIONS:
    --run-seconds <SECS>      Run for a fixed duration then exit
    --mode <MODE>             Hold one mode for the whole run (disabled|autonomous|teleop|test)
    --mode-schedule <LIST>    Timed mode changes, seconds since start [default: {DEFAULT_MODE_SCHEDULE}]
    --tick-ms <MS>            Scheduler period [default: 20]
    --report-period-ms <MS>   Console report cadence [default: 500]
    --read-timeout-ms <MS>    Deadline for the fresh velocity read [default: 500]
    --update-hz <HZ>          Position/velocity update frequency, 0 disables [default: 100]
    --axis <VALUE>            Joystick axis in [-1, 1] when no dashboard drives it
    --device-config <PATH>    JSON CANcoder configuration to apply at startup
    --bind <ADDR>             Dashboard bridge bind address [default: 127.0.0.1:7000]
    --no-bridge               Disable the dashboard bridge
    --require-handshake       Ignore axis/mode messages until a client says hello
    --json-logs               Output logs in JSON format
    --log-dir <DIR>           Also write JSON logs to a daily rolling file in DIR
    --metrics-addr <ADDR>     Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --event-log <PATH>        Append lifecycle events to a JSONL file
    --rerun                   Enable Rerun visualization (requires 'rerun' feature)
    --rerun-save <PATH>       Save Rerun recording to file
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log filter (e.g., RUST_LOG=debug,cancoder_core=trace)

EXAMPLES:
    # Enable teleop after two seconds, push the wrist forward
    cancoder-demo --mode-schedule 0:disabled,2:teleop --axis 0.3 --no-bridge

    # Short run with metrics and an event log
    cancoder-demo --run-seconds 10 --metrics-addr 0.0.0.0:9090 --event-log events.jsonl
"#
        );
    }
}

fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, ArgError> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ArgError::MissingValue(flag.clone()))
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: &mut usize) -> Result<T, ArgError> {
    let raw = value(args, i)?;
    raw.parse().map_err(|_| invalid(&args[*i - 1], raw))
}

fn parse_positive_ms(args: &[String], i: &mut usize) -> Result<u64, ArgError> {
    let ms: u64 = parse_value(args, i)?;
    if ms == 0 {
        return Err(invalid(&args[*i - 1], &args[*i]));
    }
    Ok(ms)
}

fn invalid(flag: &str, value: &str) -> ArgError {
    ArgError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}
