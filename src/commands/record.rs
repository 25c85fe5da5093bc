//! `record` command
//!
//! Looks the show up, records it resiliently into the work directory, then
//! hands the file to each requested destination. The local file is removed
//! only when every delivery succeeded.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cli::CliArgs;
use crate::ffmpeg::{FfmpegTool, MediaTool};
use crate::recorder::{
    BroadcastObserver, FanOutObserver, RecordingEvent, RecordingObserver, RecordingOutcome,
    RecordingSupervisor, TracingObserver,
};
use crate::show::{
    recording_file_name, Destination, FlatDestination, LocalDestination, Settings, ShowSettings,
};
use crate::utils::error::{AppError, AppResult};

/// What the command did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReport {
    pub show: String,
    pub recording: PathBuf,
    pub outcome: RecordingOutcome,
    /// Everything the supervisor reported, in order
    pub events: Vec<RecordingEvent>,
    /// Where copies landed
    pub delivered: Vec<PathBuf>,
    pub delivery_errors: Vec<String>,
    /// Whether the work-dir copy was removed after delivery
    pub local_removed: bool,
}

/// Run the `record` command with ffmpeg
pub async fn record(args: &CliArgs) -> AppResult<RecordReport> {
    let tool: Arc<dyn MediaTool> = Arc::new(FfmpegTool::new(&args.ffmpeg));
    record_with_tool(args, tool).await
}

/// Run the `record` command with an arbitrary capture tool
pub async fn record_with_tool(
    args: &CliArgs,
    tool: Arc<dyn MediaTool>,
) -> AppResult<RecordReport> {
    let settings = Settings::load(&args.settings)?;
    let show = settings.show(&args.name).ok_or_else(|| {
        AppError::Show(format!("no [shows.{}] table in {:?}", args.name, args.settings))
    })?;
    if show.stream.trim().is_empty() {
        return Err(AppError::Show(format!("show {} has an empty stream", args.name)));
    }

    let started_at = Local::now();
    let destinations = plan_destinations(show, args, started_at)?;

    let recording = args.work_dir.join(recording_file_name(&args.name, &started_at));
    tracing::info!("Recording {} from {} for {}s", args.name, show.stream, args.duration);
    let duration = Duration::from_secs(args.duration);
    if let Ok(span) = chrono::Duration::from_std(duration) {
        tracing::info!("Will stop at {}", started_at + span);
    }

    let timeline = Arc::new(BroadcastObserver::default());
    let collector = collect_events(timeline.subscribe());
    let observers: Vec<Arc<dyn RecordingObserver>> = vec![Arc::new(TracingObserver), timeline];
    let supervisor = RecordingSupervisor::new(settings.recorder.clone(), tool)
        .with_observer(Arc::new(FanOutObserver::new(observers)));
    let outcome = supervisor
        .record(&show.stream, duration, &recording)
        .await;
    // Last sender gone, so the collector sees the channel close
    drop(supervisor);

    let events = match collector.await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!("Event collector failed: {}", e);
            Vec::new()
        }
    };

    let mut report = RecordReport {
        show: args.name.clone(),
        recording: recording.clone(),
        outcome,
        events,
        delivered: Vec::new(),
        delivery_errors: Vec::new(),
        local_removed: false,
    };

    if !report.outcome.success {
        if let Some(dir) = &report.outcome.preserved_segments {
            tracing::error!("Recording incomplete; segments preserved in {:?}", dir);
        }
        return Ok(report);
    }

    for destination in &destinations {
        match destination.deliver(&recording).await {
            Ok(path) => report.delivered.push(path),
            Err(e) => {
                tracing::error!("{}", e);
                report.delivery_errors.push(e.to_string());
            }
        }
    }

    if !report.delivery_errors.is_empty() {
        tracing::warn!("Delivery errors; leaving {:?} in place", recording);
    } else if !destinations.is_empty() {
        remove_local(&recording).await?;
        report.local_removed = true;
    }

    Ok(report)
}

/// Gather events until every sender is dropped
fn collect_events(mut rx: broadcast::Receiver<RecordingEvent>) -> JoinHandle<Vec<RecordingEvent>> {
    tokio::spawn(async move {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => events.push(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Event timeline lost {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        events
    })
}

/// Destinations requested on the command line, checked against the show's settings
fn plan_destinations(
    show: &ShowSettings,
    args: &CliArgs,
    started_at: DateTime<Local>,
) -> AppResult<Vec<Box<dyn Destination>>> {
    let mut destinations: Vec<Box<dyn Destination>> = Vec::new();

    if args.to_local {
        let root = show.saveto().ok_or_else(|| {
            AppError::Show(format!("--to-local needs `saveto` under [shows.{}]", args.name))
        })?;
        tracing::info!("Will save to {}", root);
        destinations.push(Box::new(LocalDestination::new(root, args.name.clone(), started_at)));
    }

    if args.to_local_flat {
        let root = show.savetoflat().ok_or_else(|| {
            AppError::Show(format!(
                "--to-local-flat needs `savetoflat` under [shows.{}]",
                args.name
            ))
        })?;
        tracing::info!("Will save flat copy to {}", root);
        destinations.push(Box::new(FlatDestination::new(root)));
    }

    Ok(destinations)
}

async fn remove_local(recording: &Path) -> AppResult<()> {
    tracing::info!("Deleting local file {:?}", recording);
    tokio::fs::remove_file(recording).await?;
    Ok(())
}
