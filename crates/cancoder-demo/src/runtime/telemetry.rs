use cancoder_core::StateExchange;
use cancoder_io::metrics::{
    init_metrics, serve_metrics, MECHANISM_ANGLE_DEG, POSITION_LATENCY_S, POSITION_ROT,
    READ_TIMEOUTS, REPORTS_EMITTED, SIM_VOLTAGE, TICKS_EXECUTED, VELOCITY_LATENCY_S,
    VELOCITY_RPS,
};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Counters accumulated so far, to turn snapshot totals into increments.
#[derive(Debug, Default)]
struct Watermarks {
    ticks: u64,
    reports: u64,
    timeouts: u64,
}

impl Watermarks {
    fn apply(&mut self, snapshot: &cancoder_core::TelemetrySnapshot) {
        POSITION_ROT.set(snapshot.position_rot);
        VELOCITY_RPS.set(snapshot.velocity_rps);
        MECHANISM_ANGLE_DEG.set(snapshot.mechanism_angle_deg);
        SIM_VOLTAGE.set(snapshot.sim_voltage);

        if snapshot.tick_count > self.ticks {
            TICKS_EXECUTED.inc_by(snapshot.tick_count - self.ticks);
            self.ticks = snapshot.tick_count;
        }
        // Latencies are sampled once per report, not once per poll
        if snapshot.reports_emitted > self.reports {
            REPORTS_EMITTED.inc_by(snapshot.reports_emitted - self.reports);
            POSITION_LATENCY_S.observe(snapshot.position_latency_s);
            VELOCITY_LATENCY_S.observe(snapshot.velocity_latency_s);
            self.reports = snapshot.reports_emitted;
        }
        if snapshot.read_timeouts > self.timeouts {
            READ_TIMEOUTS.inc_by(snapshot.read_timeouts - self.timeouts);
            self.timeouts = snapshot.read_timeouts;
        }
    }
}

pub fn start_metrics_updater(
    exchange: Arc<StateExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut watermarks = Watermarks::default();
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            watermarks.apply(&exchange.read_state());
            thread::sleep(Duration::from_millis(100));
        }
        watermarks.apply(&exchange.read_state());
    })
}
