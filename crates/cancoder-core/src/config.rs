//! Device configuration record.
//!
//! The proxy applies it as a single write; only the backend looks inside.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorDirection {
    #[default]
    CounterClockwisePositive,
    ClockwisePositive,
}

impl SensorDirection {
    pub fn sign(self) -> f64 {
        match self {
            SensorDirection::CounterClockwisePositive => 1.0,
            SensorDirection::ClockwisePositive => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetSensorConfigs {
    /// Added to the raw magnet reading, in rotations.
    pub magnet_offset: f64,
    pub sensor_direction: SensorDirection,
    /// Absolute position wraps into `[point - 1, point)`.
    pub absolute_sensor_discontinuity_point: f64,
}

impl Default for MagnetSensorConfigs {
    fn default() -> Self {
        Self {
            magnet_offset: 0.0,
            sensor_direction: SensorDirection::CounterClockwisePositive,
            absolute_sensor_discontinuity_point: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CancoderConfiguration {
    pub magnet_sensor: MagnetSensorConfigs,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("magnet offset {requested} outside [{min}, {max}]")]
    MagnetOffsetOutOfRange { requested: f64, min: f64, max: f64 },
    #[error("discontinuity point {requested} outside [{min}, {max}]")]
    DiscontinuityOutOfRange { requested: f64, min: f64, max: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CancoderConfiguration {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigLoadError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let magnet = &self.magnet_sensor;
        if !magnet.magnet_offset.is_finite() || !(-1.0..=1.0).contains(&magnet.magnet_offset) {
            return Err(ConfigError::MagnetOffsetOutOfRange {
                requested: magnet.magnet_offset,
                min: -1.0,
                max: 1.0,
            });
        }
        let point = magnet.absolute_sensor_discontinuity_point;
        if !point.is_finite() || !(0.0..=1.0).contains(&point) {
            return Err(ConfigError::DiscontinuityOutOfRange {
                requested: point,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}
