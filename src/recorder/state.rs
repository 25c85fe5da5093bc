//! Recording state management
//!
//! Defines the supervisor state machine, the per-session and per-attempt
//! records, and the outcome handed back to callers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::error::{RecorderError, RecorderResult};
use super::monitor::MonitorReport;

/// Prefix of the private working directory that holds a session's segments
pub const SEGMENT_DIR_PREFIX: &str = ".segments_";

/// Name of the concat manifest inside the working directory
pub const CONCAT_MANIFEST: &str = "concat.txt";

/// How a finished session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Completion {
    /// Output artifact written
    Success,
    /// Segments were captured but could not be merged; they stay on disk
    PartialFailure,
    /// Nothing usable was captured
    Failure,
}

/// Current state of the recording supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorState {
    Idle,
    AttemptStarting,
    AttemptRunning,
    AttemptConcluded,
    Continuing,
    Backoff,
    Merging,
    Done(Completion),
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Terminal condition of one capture attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Verdict {
    /// The tool exited on its own, cleanly or with usable output
    Completed,
    /// The file stopped growing while the tool was alive
    Stalled,
    /// The attempt hit its hard wall-clock ceiling
    TimedOut,
    /// The tool exited with an error and left nothing usable
    ProcessExitedNonZero { code: Option<i32> },
    /// The tool could not be started at all
    SpawnFailed { message: String },
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Completed => write!(f, "completed"),
            Verdict::Stalled => write!(f, "stalled"),
            Verdict::TimedOut => write!(f, "timed out"),
            Verdict::ProcessExitedNonZero { code: Some(code) } => {
                write!(f, "exited with code {}", code)
            }
            Verdict::ProcessExitedNonZero { code: None } => write!(f, "killed by signal"),
            Verdict::SpawnFailed { message } => write!(f, "spawn failed: {}", message),
        }
    }
}

/// Why the supervisor stopped starting new attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    DeadlineReached,
    MaxAttemptsReached,
    TooManyConsecutiveFailures,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::DeadlineReached => write!(f, "deadline reached"),
            StopReason::MaxAttemptsReached => write!(f, "maximum attempts reached"),
            StopReason::TooManyConsecutiveFailures => write!(f, "too many consecutive failures"),
        }
    }
}

/// One supervised recording run
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Opaque stream locator handed to the capture tool
    pub stream_url: String,

    /// Requested total duration
    pub duration: Duration,

    /// Final artifact path
    pub output_path: PathBuf,

    /// Monotonic start
    pub start: Instant,

    /// Fixed at creation; never recomputed
    pub deadline: Instant,
}

impl RecordingSession {
    /// Create a session starting now
    ///
    /// Fails when the deadline cannot be represented on the monotonic clock.
    pub fn new(
        stream_url: impl Into<String>,
        duration: Duration,
        output_path: PathBuf,
    ) -> RecorderResult<Self> {
        let start = Instant::now();
        let deadline = start.checked_add(duration).ok_or_else(|| {
            RecorderError::InvalidConfig(format!("duration of {}s is too long", duration.as_secs()))
        })?;
        Ok(Self {
            stream_url: stream_url.into(),
            duration,
            output_path,
            start,
            deadline,
        })
    }

    /// Session time left, zero once the deadline has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Working directory for this session's segments
    pub fn segment_dir(&self) -> PathBuf {
        segment_dir_for(&self.output_path)
    }

    /// Path of the segment file for a 1-based attempt index
    pub fn segment_path(&self, index: u32) -> PathBuf {
        self.segment_dir()
            .join(format!("segment_{:03}.{}", index, segment_extension(&self.output_path)))
    }
}

/// `<output dir>/.segments_<output stem>`
pub fn segment_dir_for(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "recording".to_string());
    let parent = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}{}", SEGMENT_DIR_PREFIX, stem))
}

/// Segments share the output container so they can be concatenated without re-encoding
fn segment_extension(output_path: &Path) -> String {
    output_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "mp3".to_string())
}

/// An attempt that is about to run
#[derive(Debug, Clone)]
pub struct AttemptPlan {
    /// 1-based, strictly increasing within a session
    pub index: u32,

    /// Segment file written by this attempt
    pub path: PathBuf,

    /// Session time left when the attempt started
    pub window: Duration,

    /// Capture duration handed to the tool
    pub requested_duration: Duration,

    /// Hard ceiling for the whole attempt
    pub timeout: Duration,
}

impl AttemptPlan {
    /// Freeze the attempt with what the monitor observed
    pub fn conclude(self, report: MonitorReport, min_size: u64) -> SegmentAttempt {
        SegmentAttempt {
            index: self.index,
            path: self.path,
            window: self.window,
            requested_duration: self.requested_duration,
            timeout: self.timeout,
            elapsed: report.elapsed,
            idle_tail: report.idle_tail,
            size: report.size,
            valid: report.size > min_size,
            verdict: report.verdict,
        }
    }
}

/// One concluded capture try
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentAttempt {
    pub index: u32,
    pub path: PathBuf,
    pub window: Duration,
    pub requested_duration: Duration,
    pub timeout: Duration,

    /// Observed wall time of the attempt
    pub elapsed: Duration,

    /// Trailing time without file growth before a stall was declared
    pub idle_tail: Duration,

    /// Final size of the segment file in bytes
    pub size: u64,

    pub verdict: Verdict,

    /// Size strictly above the configured minimum
    pub valid: bool,
}

impl SegmentAttempt {
    /// Wall time that carried audio inside the session window
    ///
    /// The capture runs past the deadline by the duration buffer; that
    /// overrun is not counted.
    pub fn covered(&self) -> Duration {
        self.elapsed.saturating_sub(self.idle_tail).min(self.window)
    }
}

/// Supervisor counters for a run
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Resets to zero on every valid segment
    pub consecutive_failures: u32,

    /// Capture invocations so far
    pub attempts: u32,

    /// Sum of covered time over accepted segments
    pub recorded: Duration,

    /// Accepted segments in attempt order
    pub segments: Vec<SegmentAttempt>,
}

impl RunState {
    /// Fold a concluded attempt into the counters
    ///
    /// Returns `true` when the attempt was accepted.
    pub fn record(&mut self, attempt: SegmentAttempt) -> bool {
        if attempt.valid {
            self.consecutive_failures = 0;
            self.recorded += attempt.covered();
            self.segments.push(attempt);
            true
        } else {
            self.consecutive_failures += 1;
            false
        }
    }
}

/// Result of [`record_resilient`](super::record_resilient)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOutcome {
    /// True only for `Done(Success)`
    pub success: bool,

    pub completion: Completion,

    /// Accepted segments that went into the merge
    pub segments_used: usize,

    /// Seconds represented by accepted segments
    pub covered_seconds: f64,

    /// Covered seconds as a percentage of the requested duration
    pub coverage_percent: f64,

    /// Capture invocations made
    pub attempts: u32,

    pub stop_reason: Option<StopReason>,

    /// Final artifact, present only on success
    pub output_path: Option<PathBuf>,

    /// Where preserved segments can be found after a failed merge
    pub preserved_segments: Option<PathBuf>,

    /// Human-readable failure description
    pub error: Option<String>,
}

/// Coverage of `covered` over `requested`, in percent
pub fn coverage_percent(covered: Duration, requested: Duration) -> f64 {
    if requested.is_zero() {
        0.0
    } else {
        covered.as_secs_f64() / requested.as_secs_f64() * 100.0
    }
}
