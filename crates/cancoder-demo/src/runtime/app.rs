use crate::infra::audit::{AuditEventType, AuditLogger};
#[cfg(feature = "rerun")]
use crate::integrations::rerun_viz::{run_rerun, RerunConfig};
use crate::robot::{CancoderRobot, DemoSettings, ExchangeAxis, RemoteModeSource, RobotError};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use cancoder_core::config::ConfigLoadError;
use cancoder_core::{
    duration_us, Cancoder, CancoderConfiguration, Clock, ExecutionStats, Scheduler, SchedulerConfig,
    SimulatedCancoder, SimulationFeed, StateExchange, TimeBase,
};
use cancoder_io::bridge::{run_bridge, BridgeConfig};
#[cfg(feature = "rerun")]
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Axis commands older than this are ignored and the wrist coasts to a stop.
const MAX_AXIS_AGE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    DeviceConfig(#[from] ConfigLoadError),
    #[error("failed to open event log: {0}")]
    EventLog(std::io::Error),
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Robot(#[from] RobotError),
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}\n\nRun with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());
    match run(config) {
        Ok(stats) => {
            info!(
                ticks_executed = stats.ticks_executed,
                ticks_overrun = stats.ticks_overrun,
                max_jitter_us = stats.max_jitter_us,
                mode_transitions = stats.mode_transitions,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Demo stopped with an error");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<ExecutionStats, AppError> {
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let device_config = match &config.device_config {
        Some(path) => {
            let loaded = CancoderConfiguration::load(path)?;
            info!(path = %path.display(), "Loaded device configuration");
            loaded
        }
        None => CancoderConfiguration::default(),
    };

    let audit = match &config.event_log {
        Some(path) => {
            let logger = AuditLogger::new(path).map_err(AppError::EventLog)?;
            info!(path = %path.display(), "Event logging enabled");
            Some(Arc::new(logger))
        }
        None => None,
    };

    let exchange = Arc::new(StateExchange::new(duration_us(MAX_AXIS_AGE)));
    let timebase = TimeBase::new();
    let stop = Arc::new(AtomicBool::new(false));

    record(
        audit.as_deref(),
        timebase.now_us(),
        AuditEventType::SystemStart,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "tick_ms": config.tick.as_millis() as u64,
            "report_period_ms": config.report_period.as_millis() as u64,
            "read_timeout_ms": config.read_timeout.as_millis() as u64,
            "bridge_enabled": config.bridge_enabled,
        }),
    );

    let settings = DemoSettings {
        config: device_config,
        update_hz: config.update_hz,
        report_period: config.report_period,
        read_timeout: config.read_timeout,
    };
    let scheduler_config = SchedulerConfig {
        period: config.tick,
        simulation: true,
        max_ticks: None,
    };

    info!(
        tick_ms = config.tick.as_millis() as u64,
        report_period_ms = config.report_period.as_millis() as u64,
        update_hz = config.update_hz,
        "Starting scheduler"
    );

    let scheduler_handle = {
        let exchange = Arc::clone(&exchange);
        let stop = Arc::clone(&stop);
        let audit = audit.clone();
        let modes = config.modes.clone();
        let axis = config.axis;
        thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || -> Result<ExecutionStats, RobotError> {
                let device = Cancoder::new(1, "rio", SimulatedCancoder::new(), timebase);
                let robot = CancoderRobot::new(
                    device,
                    SimulationFeed::falcon_wrist(),
                    ExchangeAxis::new(Arc::clone(&exchange), axis),
                    settings,
                    Box::new(std::io::stdout()),
                    Arc::clone(&exchange),
                )
                .with_audit(audit);
                let mut scheduler = Scheduler::new(
                    robot,
                    timebase,
                    RemoteModeSource::new(exchange, modes),
                    scheduler_config,
                );
                scheduler.run(&stop)
            })
            .map_err(AppError::Spawn)?
    };

    let updater_handle = telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&stop));

    let bridge_handle = if config.bridge_enabled {
        let exchange = Arc::clone(&exchange);
        let stop = Arc::clone(&stop);
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            require_handshake: config.bridge_require_handshake,
            ..Default::default()
        };
        info!(addr = %bridge_config.bind_addr, "Starting bridge");
        Some(thread::spawn(move || {
            if let Err(e) = run_bridge(exchange, timebase, bridge_config, stop) {
                error!(error = %e, "Bridge failed");
            }
        }))
    } else {
        info!("Bridge disabled");
        None
    };

    #[cfg(feature = "rerun")]
    let rerun_handle = if config.rerun_enabled {
        let rerun_config = RerunConfig {
            save_path: config.rerun_save_path.clone().map(PathBuf::from),
            ..Default::default()
        };
        info!("Starting Rerun visualization");
        run_rerun(Arc::clone(&exchange), Arc::clone(&stop), rerun_config)
    } else {
        None
    };

    let started = Instant::now();
    let deadline = config.run_seconds.map(Duration::from_secs_f64);
    if let Some(limit) = deadline {
        info!(seconds = limit.as_secs_f64(), "Running for limited duration");
    }
    while !scheduler_handle.is_finished() {
        if deadline.is_some_and(|limit| started.elapsed() >= limit) {
            stop.store(true, Ordering::Relaxed);
        }
        thread::sleep(Duration::from_millis(20));
    }

    let outcome = join_scheduler(scheduler_handle, &stop);
    stop.store(true, Ordering::Relaxed);

    let _ = updater_handle.join();
    if let Some(handle) = bridge_handle {
        if handle.join().is_err() {
            warn!("Bridge thread panicked");
        }
    }
    #[cfg(feature = "rerun")]
    if let Some(handle) = rerun_handle {
        let _ = handle.join();
    }

    let details = match &outcome {
        Ok(stats) => serde_json::json!({
            "ticks_executed": stats.ticks_executed,
            "ticks_overrun": stats.ticks_overrun,
            "max_jitter_us": stats.max_jitter_us,
        }),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };
    record(audit.as_deref(), timebase.now_us(), AuditEventType::SystemShutdown, details);

    outcome.map_err(AppError::from)
}

/// Wait for the scheduler thread. A panic in a robot hook is re-raised on
/// this thread after the helpers are told to stop.
fn join_scheduler<T>(handle: thread::JoinHandle<T>, stop: &AtomicBool) -> T {
    match handle.join() {
        Ok(outcome) => outcome,
        Err(panic) => {
            stop.store(true, Ordering::Relaxed);
            std::panic::resume_unwind(panic);
        }
    }
}

fn record(
    audit: Option<&AuditLogger>,
    timestamp_us: u64,
    event_type: AuditEventType,
    details: serde_json::Value,
) {
    if let Some(logger) = audit {
        logger.record(timestamp_us, event_type, details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn scheduler_result_passes_through_join() {
        let stop = AtomicBool::new(false);
        let handle = thread::spawn(|| -> Result<u64, String> { Err("hook failed".into()) });
        assert_eq!(join_scheduler(handle, &stop), Err("hook failed".to_string()));
        assert!(!stop.load(Ordering::Relaxed));
    }

    #[test]
    fn scheduler_panic_is_reraised_not_reported() {
        let stop = AtomicBool::new(false);
        let handle = thread::spawn(|| -> Result<u64, String> { panic!("robot hook panicked") });
        let caught = catch_unwind(AssertUnwindSafe(|| join_scheduler(handle, &stop)));
        let payload = caught.expect_err("panic must propagate");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"robot hook panicked"));
        assert!(stop.load(Ordering::Relaxed));
    }
}
