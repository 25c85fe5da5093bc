//! Segment merger
//!
//! Turns the accepted segments into the final artifact. The working
//! directory is removed only after a confirmed-successful merge.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use super::error::{RecorderError, RecorderResult};
use super::state::{SegmentAttempt, CONCAT_MANIFEST};
use crate::ffmpeg::MediaTool;

/// Concatenates accepted segments into one output file
#[derive(Clone)]
pub struct SegmentMerger {
    tool: Arc<dyn MediaTool>,
    timeout: Duration,
}

impl SegmentMerger {
    pub fn new(tool: Arc<dyn MediaTool>, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    /// Merge `segments` (already in attempt order) into `output_path`
    ///
    /// Returns the size of the final artifact.
    pub async fn merge(
        &self,
        segments: Vec<SegmentAttempt>,
        output_path: &Path,
        segment_dir: &Path,
    ) -> RecorderResult<u64> {
        let paths: Vec<PathBuf> = segments.into_iter().map(|s| s.path).collect();

        match paths.as_slice() {
            [] => Err(RecorderError::NoValidSegments),
            [only] => self.move_single(only, output_path, segment_dir).await,
            _ => self.concat(&paths, output_path, segment_dir).await,
        }
    }

    /// Fast path: the sole segment becomes the output byte-for-byte
    async fn move_single(
        &self,
        segment: &Path,
        output_path: &Path,
        segment_dir: &Path,
    ) -> RecorderResult<u64> {
        tokio::fs::rename(segment, output_path)
            .await
            .map_err(|e| RecorderError::MergeFailed {
                segment_dir: segment_dir.to_path_buf(),
                reason: format!("could not move {:?}: {}", segment, e),
            })?;

        let size = saved_size(output_path).await;
        tracing::info!("Recording saved: {:?} ({:.1} KB)", output_path, size as f64 / 1024.0);
        cleanup(segment_dir).await;
        Ok(size)
    }

    async fn concat(
        &self,
        segments: &[PathBuf],
        output_path: &Path,
        segment_dir: &Path,
    ) -> RecorderResult<u64> {
        let failed = |reason: String| RecorderError::MergeFailed {
            segment_dir: segment_dir.to_path_buf(),
            reason,
        };

        let manifest = segment_dir.join(CONCAT_MANIFEST);
        let contents = build_manifest(segments).await.map_err(|e| failed(e.to_string()))?;
        tokio::fs::write(&manifest, contents)
            .await
            .map_err(|e| failed(format!("could not write manifest: {}", e)))?;

        let mut command = self.tool.concat_command(&manifest, output_path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Concatenating {} segments via {:?}", segments.len(), manifest);

        let child = command
            .spawn()
            .map_err(|e| failed(format!("could not start concat: {}", e)))?;

        let result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() && output_path.exists() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(format!(
                    "concat exited with {}: {}",
                    output.status,
                    stderr.chars().take(200).collect::<String>()
                ))
            }
            Ok(Err(e)) => Err(format!("concat failed: {}", e)),
            Err(_) => Err(format!("concat timed out after {:?}", self.timeout)),
        };

        if let Err(reason) = result {
            tracing::error!("Merge failed: {}", reason);
            tracing::info!("Segments preserved in: {:?}", segment_dir);
            discard_partial(output_path).await;
            return Err(failed(reason));
        }

        let size = saved_size(output_path).await;
        tracing::info!(
            "Merged recording saved: {:?} ({:.1} MB)",
            output_path,
            size as f64 / 1024.0 / 1024.0
        );
        cleanup(segment_dir).await;
        Ok(size)
    }
}

/// One `file '<absolute path>'` line per segment, order preserved
///
/// Paths are written as raw bytes so names that are not UTF-8 survive.
async fn build_manifest(segments: &[PathBuf]) -> std::io::Result<Vec<u8>> {
    let mut manifest = Vec::new();
    for segment in segments {
        let absolute = tokio::fs::canonicalize(segment).await?;
        manifest.extend_from_slice(b"file '");
        manifest.extend(escape_concat_path(&path_bytes(&absolute)));
        manifest.extend_from_slice(b"'\n");
    }
    Ok(manifest)
}

/// Concat demuxer quoting: close the quote, escape, reopen
fn escape_concat_path(path: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(path.len());
    for &byte in path {
        if byte == b'\'' {
            escaped.extend_from_slice(br"'\''");
        } else {
            escaped.push(byte);
        }
    }
    escaped
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Size of a finished artifact; the merge already succeeded, so a failed
/// lookup is logged and reported as zero
async fn saved_size(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            tracing::warn!("Could not read size of {:?}: {}", path, e);
            0
        }
    }
}

async fn discard_partial(output_path: &Path) {
    match tokio::fs::remove_file(output_path).await {
        Ok(()) => tracing::debug!("Removed partial output {:?}", output_path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove partial output {:?}: {}", output_path, e),
    }
}

async fn cleanup(segment_dir: &Path) {
    match tokio::fs::remove_dir_all(segment_dir).await {
        Ok(()) => tracing::debug!("Cleaned up segment directory: {:?}", segment_dir),
        Err(e) => tracing::warn!("Could not clean up segments in {:?}: {}", segment_dir, e),
    }
}
