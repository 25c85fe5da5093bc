#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stream_recorder::ffmpeg::MediaTool;
use stream_recorder::RecorderConfig;
use tokio::process::Command;

/// Reads a concat manifest and appends every listed file to the output
pub const CAT_MANIFEST: &str =
    r#"sed -e "s/^file '//" -e "s/'\$//" "$1" | while IFS= read -r f; do cat "$f"; done > "$2""#;

/// `MediaTool` backed by `sh` scripts
///
/// Capture scripts get the segment path as `$1` and the requested duration
/// in milliseconds as `$2`. The script for each call is chosen by its
/// 1-based call number.
pub struct ScriptTool {
    capture: Box<dyn Fn(usize) -> String + Send + Sync>,
    concat: String,
    calls: AtomicUsize,
}

impl ScriptTool {
    pub fn new(capture: impl Fn(usize) -> String + Send + Sync + 'static) -> Self {
        Self {
            capture: Box::new(capture),
            concat: CAT_MANIFEST.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(script: &str) -> Self {
        let script = script.to_string();
        Self::new(move |_| script.clone())
    }

    pub fn with_concat(mut self, script: &str) -> Self {
        self.concat = script.to_string();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl MediaTool for ScriptTool {
    fn capture_command(&self, _stream_url: &str, output: &Path, duration: Duration) -> Command {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg((self.capture)(call))
            .arg("sh")
            .arg(output)
            .arg(duration.as_millis().to_string());
        command
    }

    fn concat_command(&self, manifest: &Path, output: &Path) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.concat)
            .arg("sh")
            .arg(manifest)
            .arg(output);
        command
    }
}

/// Millisecond-scale timings so real child processes finish quickly
pub fn fast_config() -> RecorderConfig {
    RecorderConfig {
        stall_timeout: Duration::from_millis(300),
        check_interval: Duration::from_millis(50),
        min_segment_size: 100,
        duration_buffer: Duration::ZERO,
        timeout_grace: Duration::from_secs(5),
        terminate_grace: Duration::from_millis(200),
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
        merge_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Writes 10 bytes of `fill` every 100ms, running a little past the requested duration
pub fn steady_writer(fill: char) -> String {
    let chunk: String = std::iter::repeat(fill).take(10).collect();
    format!(
        concat!(
            "i=0; n=$((($2 + 199) / 100)); ",
            r#"while [ $i -lt $n ]; do printf '{}' >> "$1"; sleep 0.1; i=$((i+1)); done"#
        ),
        chunk
    )
}
