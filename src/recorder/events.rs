//! Recording events
//!
//! The supervisor reports progress through an injected [`RecordingObserver`]
//! instead of global logger state, so concurrent sessions stay independent.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::state::{Completion, StopReason, Verdict};

/// Events emitted during a resilient recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordingEvent {
    /// Session created and deadline fixed
    SessionStarted {
        stream_url: String,
        output_path: PathBuf,
        duration: Duration,
    },
    /// A capture attempt is about to spawn
    AttemptStarted {
        index: u32,
        segment_path: PathBuf,
        requested: Duration,
        remaining: Duration,
    },
    /// A capture attempt reached a terminal condition
    AttemptConcluded {
        index: u32,
        verdict: Verdict,
        size: u64,
        elapsed: Duration,
        accepted: bool,
    },
    /// Waiting before the next attempt
    BackoffScheduled {
        consecutive_failures: u32,
        delay: Duration,
    },
    /// No more attempts will start
    Stopped { reason: StopReason },
    /// Concatenating accepted segments
    Merging { segments: usize },
    /// Session finished
    SessionFinished {
        completion: Completion,
        segments: usize,
        covered: Duration,
        coverage_percent: f64,
    },
}

/// Sink for [`RecordingEvent`]s
pub trait RecordingObserver: Send + Sync {
    fn on_event(&self, event: &RecordingEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RecordingObserver for TracingObserver {
    fn on_event(&self, event: &RecordingEvent) {
        match event {
            RecordingEvent::SessionStarted {
                stream_url,
                output_path,
                duration,
            } => {
                tracing::info!(
                    "Starting resilient recording: {:?} from {} for {}s",
                    output_path,
                    stream_url,
                    duration.as_secs()
                );
            }
            RecordingEvent::AttemptStarted {
                index,
                segment_path,
                requested,
                remaining,
            } => {
                tracing::info!(
                    "[Attempt {}] Recording segment {:?}, requested {}s, remaining {:.0}s",
                    index,
                    segment_path.file_name().unwrap_or_default(),
                    requested.as_secs(),
                    remaining.as_secs_f64()
                );
            }
            RecordingEvent::AttemptConcluded {
                index,
                verdict,
                size,
                elapsed,
                accepted,
            } => {
                if *accepted {
                    tracing::info!(
                        "Segment {} accepted ({}): {:.1} KB, {:.1}s",
                        index,
                        verdict,
                        *size as f64 / 1024.0,
                        elapsed.as_secs_f64()
                    );
                } else {
                    tracing::warn!(
                        "Segment {} rejected ({}): {} bytes after {:.1}s",
                        index,
                        verdict,
                        size,
                        elapsed.as_secs_f64()
                    );
                }
            }
            RecordingEvent::BackoffScheduled {
                consecutive_failures,
                delay,
            } => {
                tracing::info!(
                    "Waiting {:.1}s before retry ({} consecutive failures)",
                    delay.as_secs_f64(),
                    consecutive_failures
                );
            }
            RecordingEvent::Stopped { reason } => match reason {
                StopReason::TooManyConsecutiveFailures => {
                    tracing::error!(
                        "Giving up: {}. Stream may be permanently unavailable",
                        reason
                    );
                }
                _ => tracing::info!("Stopping: {}", reason),
            },
            RecordingEvent::Merging { segments } => {
                tracing::info!("Merging {} segments", segments);
            }
            RecordingEvent::SessionFinished {
                completion,
                segments,
                covered,
                coverage_percent,
            } => {
                tracing::info!(
                    "Recording finished ({:?}): {} segments, {:.0}s recorded ({:.1}% coverage)",
                    completion,
                    segments,
                    covered.as_secs_f64(),
                    coverage_percent
                );
            }
        }
    }
}

/// Fans events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<RecordingEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RecordingObserver for BroadcastObserver {
    fn on_event(&self, event: &RecordingEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event.clone());
    }
}

/// Forwards every event to each inner observer in order
pub struct FanOutObserver {
    observers: Vec<Arc<dyn RecordingObserver>>,
}

impl FanOutObserver {
    pub fn new(observers: Vec<Arc<dyn RecordingObserver>>) -> Self {
        Self { observers }
    }
}

impl RecordingObserver for FanOutObserver {
    fn on_event(&self, event: &RecordingEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_observer_delivers_events() {
        let observer = BroadcastObserver::default();
        let mut rx = observer.subscribe();

        observer.on_event(&RecordingEvent::Merging { segments: 3 });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, RecordingEvent::Merging { segments: 3 });
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let observer = BroadcastObserver::new(4);
        observer.on_event(&RecordingEvent::Stopped {
            reason: StopReason::DeadlineReached,
        });
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_observer() {
        let first = BroadcastObserver::default();
        let second = BroadcastObserver::default();
        let mut rx1 = first.subscribe();
        let mut rx2 = second.subscribe();

        let fan = FanOutObserver::new(vec![
            Arc::new(first),
            Arc::new(second),
            Arc::new(TracingObserver),
        ]);
        fan.on_event(&RecordingEvent::BackoffScheduled {
            consecutive_failures: 2,
            delay: Duration::from_secs(2),
        });

        assert!(matches!(rx1.recv().await.unwrap(), RecordingEvent::BackoffScheduled { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), RecordingEvent::BackoffScheduled { .. }));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(RecordingEvent::AttemptConcluded {
            index: 2,
            verdict: Verdict::ProcessExitedNonZero { code: Some(1) },
            size: 0,
            elapsed: Duration::from_secs(1),
            accepted: false,
        })
        .unwrap();

        assert_eq!(json["event"], "attemptConcluded");
        assert_eq!(json["index"], 2);
        assert_eq!(json["accepted"], false);
        assert_eq!(json["verdict"]["type"], "processExitedNonZero");
    }
}
