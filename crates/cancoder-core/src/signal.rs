use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Position,
    Velocity,
    AbsolutePosition,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [
        SignalKind::Position,
        SignalKind::Velocity,
        SignalKind::AbsolutePosition,
    ];

    pub const fn index(self) -> usize {
        match self {
            SignalKind::Position => 0,
            SignalKind::Velocity => 1,
            SignalKind::AbsolutePosition => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SignalKind::Position => "Position",
            SignalKind::Velocity => "Velocity",
            SignalKind::AbsolutePosition => "AbsolutePosition",
        }
    }

    pub const fn units(self) -> &'static str {
        match self {
            SignalKind::Position | SignalKind::AbsolutePosition => "rotations",
            SignalKind::Velocity => "rotations per second",
        }
    }
}

/// One status frame as received from the bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub value: f64,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[default]
    Ok,
    /// A fresh read hit its deadline before a newer frame arrived.
    RxTimeout,
    /// Nothing has been received for this signal yet.
    NoData,
}

impl SignalStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SignalStatus::Ok)
    }
}

/// Snapshot of a status signal at the moment it was read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalSample {
    pub kind: SignalKind,
    pub value: f64,
    pub units: &'static str,
    /// Receive time of the frame backing `value`, if any frame arrived.
    pub timestamp_us: Option<u64>,
    /// Seconds between the frame's receive time and the read.
    pub latency_s: f64,
    pub status: SignalStatus,
}

impl SignalSample {
    pub fn from_frame(kind: SignalKind, frame: Option<Frame>, now_us: u64) -> Self {
        match frame {
            Some(frame) => Self {
                kind,
                value: frame.value,
                units: kind.units(),
                timestamp_us: Some(frame.timestamp_us),
                latency_s: now_us.saturating_sub(frame.timestamp_us) as f64 / 1_000_000.0,
                status: SignalStatus::Ok,
            },
            None => Self {
                kind,
                value: 0.0,
                units: kind.units(),
                timestamp_us: None,
                latency_s: 0.0,
                status: SignalStatus::NoData,
            },
        }
    }

    pub fn with_status(mut self, status: SignalStatus) -> Self {
        self.status = status;
        self
    }
}

impl fmt::Display for SignalSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.units)
    }
}
