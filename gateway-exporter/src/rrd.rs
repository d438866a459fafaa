//! rrdcached sink: pushes each reading through `rrdupdate`.
//!
//! One round-robin database per field, named `<field>-enphase.rrd` under the
//! configured directory. Updates are spawned and never hold up the poll loop.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::reading::{Reading, ReadingSink};

/// Default updater binary.
pub const RRDUPDATE: &str = "rrdupdate";

#[derive(Debug, Error)]
pub enum RrdError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rrdupdate exited with {code:?}, stdout {stdout:?}, stderr {stderr:?}")]
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// [`ReadingSink`] that forwards readings to rrdcached.
#[derive(Debug, Clone)]
pub struct RrdSink {
    daemon: String,
    dir: PathBuf,
    program: OsString,
}

impl RrdSink {
    pub fn new(daemon: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            daemon: daemon.into(),
            dir: dir.into(),
            program: RRDUPDATE.into(),
        }
    }

    /// Use a different updater binary.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for one field update. Values are truncated to integers.
    pub fn update_args(&self, field: &str, timestamp: i64, value: f64) -> Vec<OsString> {
        let db = self.dir.join(format!("{field}-enphase.rrd"));
        vec![
            format!("--daemon={}", self.daemon).into(),
            db.into_os_string(),
            format!("{}:{}", timestamp, value as i64).into(),
        ]
    }

    /// Run a single `rrdupdate` and wait for it.
    pub async fn update(&self, field: &str, timestamp: i64, value: f64) -> Result<(), RrdError> {
        let args = self.update_args(field, timestamp, value);
        debug!(?args, "Running rrdupdate");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RrdError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(RrdError::Failed {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Update every field of `reading` in turn.
    pub async fn update_all(&self, reading: &Reading) -> Vec<(&'static str, RrdError)> {
        let timestamp = reading.taken_at.timestamp();
        let mut failures = Vec::new();
        for (field, value) in reading.fields() {
            if let Err(e) = self.update(field, timestamp, value).await {
                failures.push((field, e));
            }
        }
        failures
    }
}

impl ReadingSink for RrdSink {
    fn name(&self) -> &'static str {
        "rrd"
    }

    fn record(&self, reading: &Reading) {
        let sink = self.clone();
        let reading = *reading;
        tokio::spawn(async move {
            for (field, e) in sink.update_all(&reading).await {
                warn!(
                    sink = sink.name(),
                    field,
                    daemon = %sink.daemon,
                    error = %e,
                    "rrdupdate failed"
                );
            }
        });
    }
}
