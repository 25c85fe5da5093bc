//! Delivery of finished recordings
//!
//! A [`Destination`] receives a copy of the merged recording. Two local
//! destinations are provided: a dated archive tree and a flat directory.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local};
use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// `<name><yyMMdd>-<Mon|Tue|...>.mp3`
pub fn recording_file_name(name: &str, started_at: &DateTime<Local>) -> String {
    format!("{}{}.mp3", name, started_at.format("%y%m%d-%a"))
}

/// Somewhere a finished recording is copied to
#[async_trait]
pub trait Destination: Send + Sync {
    /// Human-readable name for logging and error messages
    fn name(&self) -> &str;

    /// Copy `recording` here, returning where it landed
    async fn deliver(&self, recording: &Path) -> AppResult<PathBuf>;
}

/// Archive tree: `<root>/<show>/<year>/<month> - <Mon>/<file>`
pub struct LocalDestination {
    root: PathBuf,
    show: String,
    started_at: DateTime<Local>,
}

impl LocalDestination {
    pub fn new(
        root: impl Into<PathBuf>,
        show: impl Into<String>,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            root: root.into(),
            show: show.into(),
            started_at,
        }
    }

    /// Directory the recording is copied into
    pub fn target_dir(&self) -> PathBuf {
        self.root
            .join(&self.show)
            .join(self.started_at.year().to_string())
            .join(format!(
                "{} - {}",
                self.started_at.month(),
                self.started_at.format("%b")
            ))
    }
}

#[async_trait]
impl Destination for LocalDestination {
    fn name(&self) -> &str {
        "local"
    }

    async fn deliver(&self, recording: &Path) -> AppResult<PathBuf> {
        let dir = self.target_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| delivery_error(self, format!("could not create {:?}: {}", dir, e)))?;
        copy_into(self, recording, &dir).await
    }
}

/// Flat directory: `<root>/<file>`
pub struct FlatDestination {
    root: PathBuf,
}

impl FlatDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Destination for FlatDestination {
    fn name(&self) -> &str {
        "local-flat"
    }

    async fn deliver(&self, recording: &Path) -> AppResult<PathBuf> {
        copy_into(self, recording, &self.root).await
    }
}

async fn copy_into(
    destination: &dyn Destination,
    recording: &Path,
    dir: &Path,
) -> AppResult<PathBuf> {
    let file_name = recording
        .file_name()
        .ok_or_else(|| delivery_error(destination, format!("{:?} has no file name", recording)))?;
    let target = dir.join(file_name);

    tracing::info!("Copying {:?} to {:?}", recording, target);
    tokio::fs::copy(recording, &target).await.map_err(|e| {
        delivery_error(destination, format!("could not copy to {:?}: {}", target, e))
    })?;
    Ok(target)
}

fn delivery_error(destination: &dyn Destination, reason: String) -> AppError {
    AppError::Delivery {
        destination: destination.name().to_string(),
        reason,
    }
}
