//! Recording supervisor
//!
//! Runs attempts strictly one after another until the session deadline, the
//! attempt cap, or the failure cap stops it, then merges what was kept.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::RecorderConfig;
use super::error::RecorderError;
use super::events::{RecordingEvent, RecordingObserver, TracingObserver};
use super::merger::SegmentMerger;
use super::monitor::{MonitorReport, StallMonitor};
use super::retry::{AttemptReport, RetryDecision, RetryScheduler};
use super::segment::SegmentRecorder;
use super::state::{
    coverage_percent, AttemptPlan, Completion, RecordingOutcome, RecordingSession, RunState,
    SegmentAttempt, StopReason, SupervisorState, Verdict,
};
use crate::ffmpeg::MediaTool;

/// Drives one resilient recording from first attempt to final artifact
pub struct RecordingSupervisor {
    config: RecorderConfig,
    recorder: SegmentRecorder,
    monitor: StallMonitor,
    scheduler: RetryScheduler,
    merger: SegmentMerger,
    observer: Arc<dyn RecordingObserver>,
    state: Arc<RwLock<SupervisorState>>,
}

impl RecordingSupervisor {
    /// Create a supervisor that logs progress through `tracing`
    pub fn new(config: RecorderConfig, tool: Arc<dyn MediaTool>) -> Self {
        Self {
            recorder: SegmentRecorder::new(tool.clone()),
            monitor: StallMonitor::new(&config),
            scheduler: RetryScheduler::new(&config),
            merger: SegmentMerger::new(tool, config.merge_timeout),
            observer: Arc::new(TracingObserver),
            state: Arc::new(RwLock::new(SupervisorState::Idle)),
            config,
        }
    }

    /// Replace the event sink
    pub fn with_observer(mut self, observer: Arc<dyn RecordingObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get the current supervisor state
    pub fn state(&self) -> SupervisorState {
        *self.state.read()
    }

    fn set_state(&self, state: SupervisorState) {
        *self.state.write() = state;
    }

    fn emit(&self, event: RecordingEvent) {
        self.observer.on_event(&event);
    }

    /// Record `stream_url` into `output_path` for `duration`
    ///
    /// Never returns an error: every failure ends up in the outcome.
    pub async fn record(
        &self,
        stream_url: &str,
        duration: Duration,
        output_path: &Path,
    ) -> RecordingOutcome {
        if let Err(e) = self.config.validate() {
            return self.reject(e, None);
        }
        if duration.is_zero() {
            let e = RecorderError::InvalidConfig("duration must be greater than zero".to_string());
            return self.reject(e, None);
        }

        let session = match RecordingSession::new(stream_url, duration, output_path.into()) {
            Ok(session) => session,
            Err(e) => return self.reject(e, None),
        };

        // Leftovers from an earlier run are never overwritten or swept up
        let segment_dir = session.segment_dir();
        match has_entries(&segment_dir).await {
            Ok(false) => {}
            Ok(true) => {
                let e = RecorderError::WorkDirInUse(segment_dir.clone());
                return self.reject(e, Some(segment_dir));
            }
            Err(e) => return self.reject(RecorderError::Io(e), None),
        }

        self.emit(RecordingEvent::SessionStarted {
            stream_url: session.stream_url.clone(),
            output_path: session.output_path.clone(),
            duration,
        });

        if let Err(e) = tokio::fs::create_dir_all(&segment_dir).await {
            tracing::error!("Could not create segment directory {:?}: {}", segment_dir, e);
            return self.reject(RecorderError::Io(e), None);
        }

        let mut run = RunState::default();
        let stop_reason = self.run_attempts(&session, &mut run).await;
        self.emit(RecordingEvent::Stopped {
            reason: stop_reason,
        });

        self.finish(&session, run, stop_reason).await
    }

    /// Attempt loop; returns why no further attempt will start
    async fn run_attempts(&self, session: &RecordingSession, run: &mut RunState) -> StopReason {
        loop {
            if let Some(reason) =
                self.scheduler
                    .may_start(run.attempts, Instant::now(), session.deadline)
            {
                return reason;
            }

            run.attempts += 1;
            let attempt = self.run_attempt(session, run.attempts).await;
            let index = attempt.index;
            let verdict = attempt.verdict.clone();
            let size = attempt.size;
            let elapsed = attempt.elapsed;

            if !attempt.valid {
                discard_segment(&attempt.path).await;
            }
            let accepted = run.record(attempt);

            self.set_state(SupervisorState::AttemptConcluded);
            self.emit(RecordingEvent::AttemptConcluded {
                index,
                verdict,
                size,
                elapsed,
                accepted,
            });

            let report = AttemptReport {
                accepted,
                consecutive_failures: run.consecutive_failures,
                attempts: run.attempts,
            };
            match self.scheduler.decide(report, Instant::now(), session.deadline) {
                RetryDecision::Stop(reason) => return reason,
                RetryDecision::ContinueImmediately => {
                    self.set_state(SupervisorState::Continuing);
                }
                RetryDecision::ContinueAfterBackoff(delay) => {
                    // Sleeping past the deadline would only delay the stop
                    let delay = delay.min(session.remaining());
                    self.set_state(SupervisorState::Backoff);
                    self.emit(RecordingEvent::BackoffScheduled {
                        consecutive_failures: run.consecutive_failures,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One bounded capture try, concluded
    async fn run_attempt(&self, session: &RecordingSession, index: u32) -> SegmentAttempt {
        self.set_state(SupervisorState::AttemptStarting);

        let remaining = session.remaining();
        let requested = self.config.requested_duration(remaining);
        let plan = AttemptPlan {
            index,
            path: session.segment_path(index),
            window: remaining,
            requested_duration: requested,
            timeout: self.config.attempt_timeout(requested),
        };

        self.emit(RecordingEvent::AttemptStarted {
            index,
            segment_path: plan.path.clone(),
            requested,
            remaining,
        });

        let report = match self
            .recorder
            .start(index, &session.stream_url, &plan.path, requested)
            .await
        {
            Ok(mut child) => {
                self.set_state(SupervisorState::AttemptRunning);
                self.monitor.watch(&mut child, &plan.path, plan.timeout).await
            }
            Err(e) => {
                tracing::error!("[Attempt {}] {}", index, e);
                MonitorReport {
                    verdict: Verdict::SpawnFailed {
                        message: e.to_string(),
                    },
                    size: 0,
                    elapsed: Duration::ZERO,
                    idle_tail: Duration::ZERO,
                }
            }
        };

        plan.conclude(report, self.config.min_segment_size)
    }

    async fn finish(
        &self,
        session: &RecordingSession,
        run: RunState,
        stop_reason: StopReason,
    ) -> RecordingOutcome {
        let segment_dir = session.segment_dir();
        let segments_used = run.segments.len();
        let covered = run.recorded;
        let percent = coverage_percent(covered, session.duration);

        let mut outcome = RecordingOutcome {
            success: false,
            completion: Completion::Failure,
            segments_used,
            covered_seconds: covered.as_secs_f64(),
            coverage_percent: percent,
            attempts: run.attempts,
            stop_reason: Some(stop_reason),
            output_path: None,
            preserved_segments: None,
            error: None,
        };

        if segments_used == 0 {
            tracing::error!("No valid segments recorded");
            remove_if_empty(&segment_dir).await;
            outcome.error = Some(RecorderError::NoValidSegments.to_string());
        } else {
            self.set_state(SupervisorState::Merging);
            self.emit(RecordingEvent::Merging {
                segments: segments_used,
            });

            match self
                .merger
                .merge(run.segments, &session.output_path, &segment_dir)
                .await
            {
                Ok(_) => {
                    outcome.success = true;
                    outcome.completion = Completion::Success;
                    outcome.output_path = Some(session.output_path.clone());
                }
                Err(e) => {
                    outcome.completion = Completion::PartialFailure;
                    outcome.preserved_segments = preserved_dir(&e, &segment_dir);
                    outcome.error = Some(e.to_string());
                }
            }
        }

        self.emit(RecordingEvent::SessionFinished {
            completion: outcome.completion,
            segments: segments_used,
            covered,
            coverage_percent: percent,
        });
        self.set_state(SupervisorState::Done(outcome.completion));
        outcome
    }

    /// Outcome for a session that never got to its first attempt
    fn reject(&self, error: RecorderError, preserved: Option<PathBuf>) -> RecordingOutcome {
        tracing::error!("Recording not started: {}", error);
        self.set_state(SupervisorState::Done(Completion::Failure));
        RecordingOutcome {
            success: false,
            completion: Completion::Failure,
            segments_used: 0,
            covered_seconds: 0.0,
            coverage_percent: 0.0,
            attempts: 0,
            stop_reason: None,
            output_path: None,
            preserved_segments: preserved,
            error: Some(error.to_string()),
        }
    }
}

fn preserved_dir(error: &RecorderError, fallback: &Path) -> Option<PathBuf> {
    match error {
        RecorderError::MergeFailed { segment_dir, .. } => Some(segment_dir.clone()),
        _ => Some(fallback.to_path_buf()),
    }
}

/// Rejected segments never reach the merge
async fn discard_segment(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Discarded invalid segment {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not discard segment {:?}: {}", path, e),
    }
}

async fn has_entries(dir: &Path) -> std::io::Result<bool> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn remove_if_empty(dir: &Path) {
    // remove_dir refuses non-empty directories, which is what we want
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::info!("Keeping working directory {:?}: {}", dir, e);
        }
    }
}
