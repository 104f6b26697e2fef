use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

use crate::app::ports::{ClockPort, ObjectSinkPort};
use crate::common::constants::{ALERTS_FILE, ALERTS_KEY, LOG_TIMESTAMP_FORMAT};
use crate::common::error::{PipelineError, Result};
use crate::observability::metrics;

/// Free-text alert trail: `{timestamp} | {message}` lines, mirrored to the sink
#[derive(Clone)]
pub struct AlertLog {
    path: PathBuf,
    sink: Arc<dyn ObjectSinkPort>,
    clock: Arc<dyn ClockPort>,
}

impl AlertLog {
    pub fn new(metadata_dir: &Path, sink: Arc<dyn ObjectSinkPort>, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            path: metadata_dir.join(ALERTS_FILE),
            sink,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn raise(&self, message: &str) -> Result<()> {
        error!(alert = message, "Alert raised");
        metrics::publish::alert_raised();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = format!("{} | {}", self.clock.now().format(LOG_TIMESTAMP_FORMAT), message);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;

        let bytes = fs::read(&self.path)?;
        self.sink
            .upload(ALERTS_KEY, bytes, "text/plain")
            .await
            .map_err(|e| PipelineError::Sink(format!("{}: {}", ALERTS_KEY, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{FixedClock, MemoryObjectSink};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_alerts_append_and_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemoryObjectSink::new();
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 9, 13, 7, 0, 5).unwrap());
        let alerts = AlertLog::new(dir.path(), Arc::new(sink.clone()), Arc::new(clock));

        alerts.raise("rates unavailable").await.unwrap();
        alerts.raise("transactions failed validation").await.unwrap();

        let expected = "2025-09-13 07:00:05 | rates unavailable\n\
                        2025-09-13 07:00:05 | transactions failed validation\n";
        assert_eq!(fs::read_to_string(alerts.path()).unwrap(), expected);
        assert_eq!(sink.get("alerts/alerts.log").unwrap(), expected.as_bytes());
    }
}
