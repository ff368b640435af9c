use cancoder_core::{tags, Segment, StateExchange};
use rerun::{Color, LineStrips2D, RecordingStream, RecordingStreamBuilder, Scalar};
use std::path::PathBuf;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct RerunConfig {
    pub update_interval: Duration,
    pub save_path: Option<PathBuf>,
}

impl Default for RerunConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(50),
            save_path: None,
        }
    }
}

pub fn run_rerun(
    exchange: Arc<StateExchange>,
    stop: Arc<AtomicBool>,
    config: RerunConfig,
) -> Option<thread::JoinHandle<()>> {
    let rec = match config.save_path {
        Some(path) => RecordingStreamBuilder::new("cancoder-demo").save(path),
        None => RecordingStreamBuilder::new("cancoder-demo").spawn(),
    };

    let rec = match rec {
        Ok(r) => r,
        Err(err) => {
            warn!("Rerun init failed: {err}");
            return None;
        }
    };

    info!("Rerun viewer spawned");

    Some(thread::spawn(move || loop {
        if stop.load(std::sync::atomic::Ordering::Relaxed) {
            break;
        }

        log_snapshot(&rec, &exchange);
        thread::sleep(config.update_interval);
    }))
}

fn log_snapshot(rec: &RecordingStream, exchange: &StateExchange) {
    let snapshot = exchange.read_state();
    rec.set_time_seconds("sim_time", snapshot.timestamp_us as f64 / 1_000_000.0);

    let scalars = [
        (tags::POSITION_ROT, snapshot.position_rot),
        (tags::VELOCITY_RPS, snapshot.velocity_rps),
        (tags::POSITION_LATENCY_S, snapshot.position_latency_s),
        (tags::VELOCITY_LATENCY_S, snapshot.velocity_latency_s),
        (tags::MECHANISM_ANGLE_DEG, snapshot.mechanism_angle_deg),
        (tags::SIM_VOLTAGE, snapshot.sim_voltage),
    ];
    for (tag, value) in scalars {
        let _ = rec.log(tag.rerun_path, &Scalar::new(value));
    }

    if let Some(mechanism) = &snapshot.mechanism {
        let _ = rec.log(tags::MECHANISM.rerun_path, &line_strips(&mechanism.segments()));
    }
}

fn line_strips(segments: &[Segment]) -> LineStrips2D {
    // Rerun's 2D view has y pointing down; the mechanism canvas has it up.
    let strips: Vec<[[f32; 2]; 2]> = segments
        .iter()
        .map(|s| {
            [
                [s.from[0] as f32, -(s.from[1] as f32)],
                [s.to[0] as f32, -(s.to[1] as f32)],
            ]
        })
        .collect();
    let colors: Vec<Color> = segments
        .iter()
        .map(|s| Color::from_rgb(s.color.r, s.color.g, s.color.b))
        .collect();
    let radii: Vec<f32> = segments
        .iter()
        .map(|s| (s.line_width * 0.002) as f32)
        .collect();
    LineStrips2D::new(strips)
        .with_colors(colors)
        .with_radii(radii)
}
