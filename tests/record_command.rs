//! `record` command: settings lookup, recording, delivery

#![cfg(unix)]

mod common;

use clap::Parser;
use common::ScriptTool;
use std::path::{Path, PathBuf};
use stream_recorder::cli::CliArgs;
use stream_recorder::commands::record::record_with_tool;
use stream_recorder::recorder::RecordingEvent;
use stream_recorder::utils::error::AppError;
use tempfile::{tempdir, TempDir};

const HEALTHY: &str = r#"head -c 2000 /dev/zero > "$1"; sleep 1.2"#;

struct Fixture {
    _dir: TempDir,
    settings: PathBuf,
    work: PathBuf,
    archive: PathBuf,
    flat: PathBuf,
}

fn fixture(flat_exists: bool) -> Fixture {
    let dir = tempdir().unwrap();
    let work = dir.path().join("work");
    let archive = dir.path().join("archive");
    let flat = dir.path().join("flat");
    std::fs::create_dir_all(&work).unwrap();
    if flat_exists {
        std::fs::create_dir_all(&flat).unwrap();
    }

    let settings = dir.path().join("settings.toml");
    std::fs::write(
        &settings,
        format!(
            r#"
[recorder]
stall_timeout = 5
check_interval = 0.05
min_segment_size = 100
max_consecutive_failures = 2
duration_buffer = 0
timeout_grace = 5
terminate_grace = 0.2
backoff_base = 0.01
backoff_max = 0.04

[shows.NEWS]
stream = "http://radio.example.com/news"
saveto = "{}/"
savetoflat = "{}"
"#,
            archive.display(),
            flat.display()
        ),
    )
    .unwrap();

    Fixture {
        _dir: dir,
        settings,
        work,
        archive,
        flat,
    }
}

fn args(fx: &Fixture, extra: &[&str]) -> CliArgs {
    let mut argv: Vec<String> = vec![
        "stream-recorder".into(),
        "--name".into(),
        "news".into(),
        "--duration".into(),
        "1".into(),
        "--settings".into(),
        path_arg(&fx.settings),
        "--work-dir".into(),
        path_arg(&fx.work),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).unwrap()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn test_delivers_everywhere_then_removes_local_copy() {
    let fx = fixture(true);
    let report = record_with_tool(
        &args(&fx, &["--to-local", "--to-local-flat"]),
        ScriptTool::always(HEALTHY).shared(),
    )
    .await
    .unwrap();

    assert!(report.outcome.success, "{:?}", report.outcome.error);
    assert!(report.delivery_errors.is_empty());
    assert_eq!(report.delivered.len(), 2);
    assert!(report.local_removed);
    assert!(!report.recording.exists());

    let file_name = report.recording.file_name().unwrap();
    assert!(file_name.to_string_lossy().starts_with("news"));
    assert!(file_name.to_string_lossy().ends_with(".mp3"));

    let archived = &report.delivered[0];
    assert!(archived.starts_with(fx.archive.join("news")));
    assert_eq!(archived.file_name(), Some(file_name));
    assert_eq!(std::fs::metadata(archived).unwrap().len(), 2000);

    assert_eq!(report.delivered[1], fx.flat.join(file_name));
    assert!(report.delivered[1].exists());
}

#[tokio::test]
async fn test_failed_delivery_keeps_local_copy() {
    let fx = fixture(false);
    let report = record_with_tool(
        &args(&fx, &["--to-local-flat"]),
        ScriptTool::always(HEALTHY).shared(),
    )
    .await
    .unwrap();

    assert!(report.outcome.success);
    assert_eq!(report.delivery_errors.len(), 1);
    assert!(report.delivered.is_empty());
    assert!(!report.local_removed);
    assert!(report.recording.exists());
}

#[tokio::test]
async fn test_without_destinations_recording_stays_in_work_dir() {
    let fx = fixture(true);
    let report = record_with_tool(&args(&fx, &[]), ScriptTool::always(HEALTHY).shared())
        .await
        .unwrap();

    assert!(report.outcome.success);
    assert!(!report.local_removed);
    assert!(report.recording.starts_with(&fx.work));
    assert!(report.recording.exists());
}

#[tokio::test]
async fn test_report_carries_the_event_timeline() {
    let fx = fixture(true);
    let report = record_with_tool(&args(&fx, &[]), ScriptTool::always(HEALTHY).shared())
        .await
        .unwrap();

    assert!(report.outcome.success);
    assert!(matches!(
        report.events.first(),
        Some(RecordingEvent::SessionStarted { .. })
    ));
    assert!(matches!(
        report.events.last(),
        Some(RecordingEvent::SessionFinished { .. })
    ));
    let concluded = report
        .events
        .iter()
        .filter(|e| matches!(e, RecordingEvent::AttemptConcluded { .. }))
        .count();
    assert_eq!(concluded, 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["events"][0]["event"], "sessionStarted");
}

#[tokio::test]
async fn test_failed_recording_skips_delivery() {
    let fx = fixture(true);
    let tool = ScriptTool::always("exit 1").shared();
    let report = record_with_tool(&args(&fx, &["--to-local-flat"]), tool.clone())
        .await
        .unwrap();

    assert!(!report.outcome.success);
    assert_eq!(report.outcome.attempts, 2);
    assert!(report.delivered.is_empty());
    assert!(!report.recording.exists());
    assert_eq!(std::fs::read_dir(&fx.flat).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_show_is_rejected_before_recording() {
    let fx = fixture(true);
    let mut cli = args(&fx, &[]);
    cli.name = "sports".to_string();
    let tool = ScriptTool::always(HEALTHY).shared();

    let err = record_with_tool(&cli, tool.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::Show(_)));
    assert_eq!(tool.calls(), 0);
}

#[tokio::test]
async fn test_missing_destination_setting_is_rejected_before_recording() {
    let fx = fixture(true);
    std::fs::write(
        &fx.settings,
        "[shows.news]\nstream = \"http://radio.example.com/news\"\n",
    )
    .unwrap();
    let tool = ScriptTool::always(HEALTHY).shared();

    let err = record_with_tool(&args(&fx, &["--to-local"]), tool.clone())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("saveto"));
    assert_eq!(tool.calls(), 0);
}
