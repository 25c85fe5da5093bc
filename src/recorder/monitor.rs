//! Stall monitor
//!
//! Watches a running capture process and the file it writes. Process exit,
//! the hard attempt timeout and the growth poll race each other; the first
//! terminal condition wins.

use std::path::Path;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use super::config::RecorderConfig;
use super::state::Verdict;

/// What the monitor observed for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub verdict: Verdict,
    /// Segment size after the process is gone
    pub size: u64,
    pub elapsed: Duration,
    /// Time since the last observed growth, when the attempt ended in a stall
    pub idle_tail: Duration,
}

/// Watches one attempt at a time; keeps no state between attempts
#[derive(Debug, Clone)]
pub struct StallMonitor {
    check_interval: Duration,
    stall_timeout: Duration,
    terminate_grace: Duration,
    min_segment_size: u64,
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Poll,
}

impl StallMonitor {
    pub fn new(config: &RecorderConfig) -> Self {
        Self {
            check_interval: config.check_interval,
            stall_timeout: config.stall_timeout,
            terminate_grace: config.terminate_grace,
            min_segment_size: config.min_segment_size,
        }
    }

    /// Block until the process exits, stalls, or exceeds `timeout`
    ///
    /// A timeout too large for the clock means the attempt has no hard ceiling.
    pub async fn watch(
        &self,
        child: &mut Child,
        segment_path: &Path,
        timeout: Duration,
    ) -> MonitorReport {
        let start = Instant::now();
        let hard_deadline = start.checked_add(timeout);
        let deadline_at = hard_deadline.unwrap_or(start);

        let first_tick = start.checked_add(self.check_interval).unwrap_or(start);
        let mut ticker = interval_at(first_tick, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_size = 0u64;
        let mut last_growth = start;
        let mut idle_tail = Duration::ZERO;

        let verdict = loop {
            let wake = tokio::select! {
                biased;
                status = child.wait() => Wake::Exited(status),
                _ = sleep_until(deadline_at), if hard_deadline.is_some() => Wake::TimedOut,
                _ = ticker.tick() => Wake::Poll,
            };

            match wake {
                Wake::Exited(Ok(status)) if status.success() => break Verdict::Completed,
                Wake::Exited(Ok(status)) => {
                    let size = file_size(segment_path).await;
                    if size > self.min_segment_size {
                        tracing::debug!(
                            "Capture exited with {} but left {} usable bytes",
                            status,
                            size
                        );
                        break Verdict::Completed;
                    }
                    tracing::warn!(
                        "Capture exited with {} after {:.1}s",
                        status,
                        start.elapsed().as_secs_f64()
                    );
                    break Verdict::ProcessExitedNonZero {
                        code: status.code(),
                    };
                }
                Wake::Exited(Err(e)) => {
                    tracing::warn!("Failed to wait for capture process: {}", e);
                    terminate(child, self.terminate_grace).await;
                    break Verdict::ProcessExitedNonZero { code: None };
                }
                Wake::TimedOut => {
                    tracing::info!(
                        "Attempt timeout reached ({:.0}s), terminating",
                        timeout.as_secs_f64()
                    );
                    terminate(child, self.terminate_grace).await;
                    break Verdict::TimedOut;
                }
                Wake::Poll => {
                    let size = file_size(segment_path).await;
                    let now = Instant::now();
                    if size > last_size {
                        last_size = size;
                        last_growth = now;
                        continue;
                    }
                    let stalled_for = now.duration_since(last_growth);
                    if stalled_for > self.stall_timeout {
                        tracing::warn!(
                            "Recording stalled (no growth for {:.0}s at {} bytes), terminating",
                            stalled_for.as_secs_f64(),
                            size
                        );
                        idle_tail = stalled_for;
                        terminate(child, self.terminate_grace).await;
                        break Verdict::Stalled;
                    }
                }
            }
        };

        MonitorReport {
            verdict,
            size: file_size(segment_path).await,
            elapsed: start.elapsed(),
            idle_tail,
        }
    }
}

/// Graceful signal, bounded wait, then forced kill if still alive
pub async fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if let Err(e) = send_graceful(child) {
        tracing::debug!("Graceful stop failed, escalating: {}", e);
    } else if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        tracing::debug!("Capture process stopped: {:?}", status);
        return;
    }

    tracing::warn!("Capture process still alive after {:?}, killing", grace);
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill capture process: {}", e);
    }
}

#[cfg(unix)]
fn send_graceful(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = child.id().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "process already reaped")
    })?;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn send_graceful(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tempfile::tempdir;
    use tokio::process::Command;

    fn fast_config() -> RecorderConfig {
        RecorderConfig {
            check_interval: Duration::from_millis(50),
            stall_timeout: Duration::from_millis(300),
            terminate_grace: Duration::from_millis(300),
            min_segment_size: 1000,
            ..Default::default()
        }
    }

    fn spawn(script: &str, output: &Path) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .arg("sh")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_clean_exit_is_completed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn(r#"head -c 4000 /dev/zero > "$1""#, &path);

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_secs(10))
            .await;

        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.size, 4000);
        assert!(report.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_usable_output_is_completed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn(r#"head -c 2000 /dev/zero > "$1"; exit 1"#, &path);

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_secs(10))
            .await;

        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.size, 2000);
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn("exit 3", &path);

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_secs(10))
            .await;

        assert_eq!(report.verdict, Verdict::ProcessExitedNonZero { code: Some(3) });
        assert_eq!(report.size, 0);
    }

    #[tokio::test]
    async fn test_stalled_process_is_terminated_and_keeps_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn(r#"head -c 5000 /dev/zero > "$1"; exec sleep 30"#, &path);

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_secs(20))
            .await;

        assert_eq!(report.verdict, Verdict::Stalled);
        assert_eq!(report.size, 5000);
        assert!(report.elapsed >= Duration::from_millis(300));
        assert!(report.elapsed < Duration::from_secs(5));
        assert!(report.idle_tail > Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_growing_process_is_not_stalled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        // Grows every 50ms for ~1s, well past the 300ms stall threshold
        let mut child = spawn(
            concat!(
                "i=0; while [ $i -lt 20 ]; do ",
                r#"head -c 200 /dev/zero >> "$1"; sleep 0.05; i=$((i+1)); "#,
                "done"
            ),
            &path,
        );

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_secs(20))
            .await;

        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.size, 4000);
    }

    #[tokio::test]
    async fn test_timeout_terminates_growing_process() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn(
            r#"while true; do head -c 500 /dev/zero >> "$1"; sleep 0.05; done"#,
            &path,
        );

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_millis(600))
            .await;

        assert_eq!(report.verdict, Verdict::TimedOut);
        assert!(report.size > 1000);
        assert!(report.elapsed >= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_sigterm_resistant_process_is_killed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn(
            r#"trap '' TERM; head -c 3000 /dev/zero > "$1"; while true; do sleep 0.05; done"#,
            &path,
        );

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::from_secs(20))
            .await;

        assert_eq!(report.verdict, Verdict::Stalled);
        assert_eq!(report.size, 3000);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unbounded_timeout_still_sees_exit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.mp3");
        let mut child = spawn(r#"head -c 4000 /dev/zero > "$1""#, &path);

        let report = StallMonitor::new(&fast_config())
            .watch(&mut child, &path, Duration::MAX)
            .await;

        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.size, 4000);
    }

    #[tokio::test]
    async fn test_terminate_on_exited_process_is_noop() {
        let dir = tempdir().unwrap();
        let mut child = spawn("exit 0", &dir.path().join("x"));
        child.wait().await.unwrap();
        terminate(&mut child, Duration::from_millis(10)).await;
    }
}
