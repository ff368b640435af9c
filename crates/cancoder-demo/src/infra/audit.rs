//! Append-only event log for device and lifecycle events.
//!
//! One JSON object per line, so the file can be tailed or replayed next to
//! the console reports.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SystemStart,
    SystemShutdown,
    /// Scheduler entered a new mode
    ModeTransition,
    /// Sensor configuration accepted by the device
    ConfigApplied,
    /// Position write issued and read back
    PositionSet,
    /// A confirmation read hit its deadline
    ConfirmationTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe JSONL writer. Shared between the scheduler and the runtime.
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Opens `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Log with the wall-clock time taken now.
    pub fn log_event(
        &self,
        timestamp_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us: unix_now_us(),
            event_type,
            details,
        })
    }

    /// Like [`log_event`](Self::log_event), but a failed write is logged
    /// and the run carries on. Returns whether the entry was written.
    pub fn record(
        &self,
        timestamp_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> bool {
        match self.log_event(timestamp_us, event_type, details) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, ?event_type, "Failed to write event log entry");
                false
            }
        }
    }
}

fn unix_now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn writes_one_entry_per_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events").join("run.jsonl");

        let logger = AuditLogger::new(&path).unwrap();
        logger
            .log_event(
                1_000,
                AuditEventType::SystemStart,
                serde_json::json!({"version": "0.1.0"}),
            )
            .unwrap();
        logger
            .log_event(
                1_020_000,
                AuditEventType::PositionSet,
                serde_json::json!({"target": 0.4, "confirmed": true}),
            )
            .unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event_type, AuditEventType::SystemStart);
        assert!(first.unix_us > 0);

        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.timestamp_us, 1_020_000);
        assert_eq!(second.details["target"], 0.4);
        assert!(lines[1].contains("\"event_type\":\"position_set\""));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn record_reports_failed_write() {
        let logger = AuditLogger::new(Path::new("/dev/full")).unwrap();
        assert!(!logger.record(1, AuditEventType::SystemStart, serde_json::json!({})));
    }

    #[test]
    fn record_writes_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let logger = AuditLogger::new(&path).unwrap();
        assert!(logger.record(5, AuditEventType::SystemShutdown, serde_json::json!({})));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        for ts in [1, 2] {
            let logger = AuditLogger::new(&path).unwrap();
            logger
                .log_event(ts, AuditEventType::SystemShutdown, serde_json::json!({}))
                .unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
