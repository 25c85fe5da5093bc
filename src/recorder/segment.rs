//! Segment recorder
//!
//! Starts one bounded capture invocation and hands the live process back
//! without waiting for it. Retrying is the supervisor's business.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;

use super::error::{RecorderError, RecorderResult};
use crate::ffmpeg::MediaTool;

/// Spawns capture processes through a [`MediaTool`]
#[derive(Clone)]
pub struct SegmentRecorder {
    tool: Arc<dyn MediaTool>,
}

impl SegmentRecorder {
    pub fn new(tool: Arc<dyn MediaTool>) -> Self {
        Self { tool }
    }

    /// Start capturing `stream_url` into `segment_path` for at most `duration`
    ///
    /// Any stale file at `segment_path` is removed first. The returned child
    /// may still be writing; it is killed if dropped.
    pub async fn start(
        &self,
        index: u32,
        stream_url: &str,
        segment_path: &Path,
        duration: Duration,
    ) -> RecorderResult<Child> {
        match tokio::fs::remove_file(segment_path).await {
            Ok(()) => tracing::debug!("Removed stale segment {:?}", segment_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RecorderError::Io(e)),
        }

        let mut command = self.tool.capture_command(stream_url, segment_path, duration);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| RecorderError::SpawnFailed(e.to_string()))?;

        tracing::debug!(
            "Capture attempt {} running as pid {:?}",
            index,
            child.id()
        );

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if !line.is_empty() {
                        tracing::debug!("capture[{}]: {}", index, line);
                    }
                }
            });
        }

        Ok(child)
    }
}
