//! Prometheus metrics for the CANcoder demo.
//!
//! Covers the scheduler loop, signal freshness, the simulation feed and
//! the dashboard bridge.

use cancoder_core::tags;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Scheduler Metrics
// ============================================================================

/// Total scheduler ticks executed
pub static TICKS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("cancoder_ticks_executed_total", "Total scheduler ticks executed")
        .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Console reports emitted at the report cadence
pub static REPORTS_EMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "cancoder_reports_emitted_total",
        "Position/velocity reports written to the console",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Signal Metrics
// ============================================================================

/// Fresh reads that hit their deadline
pub static READ_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "cancoder_fresh_read_timeouts_total",
        "Fresh signal reads that returned at their timeout",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Reported position in rotations
pub static POSITION_ROT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::POSITION_ROT.metric, "Reported position in rotations").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Reported velocity in rotations per second
pub static VELOCITY_RPS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::VELOCITY_RPS.metric,
        "Reported velocity in rotations per second",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Cached position read latency distribution
pub static POSITION_LATENCY_S: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            tags::POSITION_LATENCY_S.metric,
            "Latency of cached position reads in seconds",
        )
        .buckets(latency_buckets()),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Fresh velocity read latency distribution
pub static VELOCITY_LATENCY_S: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            tags::VELOCITY_LATENCY_S.metric,
            "Latency of fresh velocity reads in seconds",
        )
        .buckets(latency_buckets()),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

fn latency_buckets() -> Vec<f64> {
    vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5]
}

// ============================================================================
// Simulation Metrics
// ============================================================================

/// Wrist angle published to the mechanism display
pub static MECHANISM_ANGLE_DEG: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::MECHANISM_ANGLE_DEG.metric,
        "Wrist angle published to the mechanism display in degrees",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Voltage applied to the simulated motor
pub static SIM_VOLTAGE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::SIM_VOLTAGE.metric, "Voltage applied to the simulated motor")
        .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Bridge Metrics
// ============================================================================

/// Dashboard client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "cancoder_bridge_connected",
        "Dashboard client connection status (1=connected, 0=disconnected)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Inbound bridge messages dropped as malformed or unsupported
pub static BRIDGE_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "cancoder_bridge_rejected_total",
        "Inbound dashboard messages dropped as malformed or unsupported",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Render the registry in the Prometheus text format.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => match render() {
                    Ok(buffer) => {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        let _ = request.respond(response);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                    }
                },
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the scheduler has ticked
                    if TICKS_EXECUTED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_EXECUTED.get();
    let _ = REPORTS_EMITTED.get();
    let _ = READ_TIMEOUTS.get();
    let _ = POSITION_ROT.get();
    let _ = VELOCITY_RPS.get();
    let _ = POSITION_LATENCY_S.get_sample_count();
    let _ = VELOCITY_LATENCY_S.get_sample_count();
    let _ = MECHANISM_ANGLE_DEG.get();
    let _ = SIM_VOLTAGE.get();
    let _ = BRIDGE_CONNECTED.get();
    let _ = BRIDGE_REJECTED.get();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exports_signal_metrics() {
        init_metrics();
        POSITION_ROT.set(0.4);
        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains(tags::POSITION_ROT.metric));
        assert!(text.contains(tags::VELOCITY_LATENCY_S.metric));
        assert!(text.contains("cancoder_ticks_executed_total"));
    }
}
