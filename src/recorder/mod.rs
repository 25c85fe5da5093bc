//! Resilient recording core
//!
//! A session is recorded as a chain of bounded capture attempts:
//! - SegmentRecorder starts one capture process per attempt
//! - StallMonitor watches it until exit, stall, or timeout
//! - RetryScheduler decides whether and when to try again
//! - SegmentMerger joins the accepted segments into the final file
//! - RecordingSupervisor runs the loop

pub mod config;
pub mod error;
pub mod events;
pub mod merger;
pub mod monitor;
pub mod retry;
pub mod segment;
pub mod state;
pub mod supervisor;

pub use config::RecorderConfig;
pub use error::{RecorderError, RecorderResult};
pub use events::{
    BroadcastObserver, FanOutObserver, RecordingEvent, RecordingObserver, TracingObserver,
};
pub use merger::SegmentMerger;
pub use monitor::{MonitorReport, StallMonitor};
pub use retry::{RetryDecision, RetryScheduler};
pub use segment::SegmentRecorder;
pub use state::{Completion, RecordingOutcome, StopReason, SupervisorState, Verdict};
pub use supervisor::RecordingSupervisor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::ffmpeg::FfmpegTool;

/// Record `stream_url` for `duration` into `output_path` using ffmpeg from PATH
pub async fn record_resilient(
    stream_url: &str,
    duration: Duration,
    output_path: &Path,
    config: RecorderConfig,
) -> RecordingOutcome {
    RecordingSupervisor::new(config, Arc::new(FfmpegTool::default()))
        .record(stream_url, duration, output_path)
        .await
}
