//! FFmpeg command construction
//!
//! Builds the stream-copy capture invocation and the concat-demuxer merge
//! invocation. Neither command re-encodes audio.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Source of the external commands the recorder supervises
pub trait MediaTool: Send + Sync {
    /// Capture `stream_url` into `output` for at most `duration`
    fn capture_command(&self, stream_url: &str, output: &Path, duration: Duration) -> Command;

    /// Concatenate the files listed in `manifest` into `output`
    fn concat_command(&self, manifest: &Path, output: &Path) -> Command;
}

/// FFmpeg-backed [`MediaTool`]
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    binary: PathBuf,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTool {
    /// Use the ffmpeg executable at `binary` (looked up on PATH if bare)
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for a bounded stream-copy capture
    ///
    /// Paths are passed through untouched, whatever their encoding.
    pub fn capture_args(
        &self,
        stream_url: &str,
        output: &Path,
        duration: Duration,
    ) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-i".into(),
            stream_url.into(),
            "-t".into(),
            whole_seconds(duration).to_string().into(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            output.as_os_str().to_owned(),
        ]
    }

    /// Arguments for a container-level concat of a manifest
    pub fn concat_args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.as_os_str().to_owned(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            output.as_os_str().to_owned(),
        ]
    }

    fn command(&self, args: Vec<OsString>) -> Command {
        tracing::debug!("Running {:?} {:?}", self.binary, args);
        let mut command = Command::new(&self.binary);
        command.args(args);
        command
    }
}

impl MediaTool for FfmpegTool {
    fn capture_command(&self, stream_url: &str, output: &Path, duration: Duration) -> Command {
        self.command(self.capture_args(stream_url, output, duration))
    }

    fn concat_command(&self, manifest: &Path, output: &Path) -> Command {
        self.command(self.concat_args(manifest, output))
    }
}

/// `-t` takes whole seconds here; round up so the tail is never cut short
fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(args: &[OsString]) -> String {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_capture_args_copy_codec() {
        let tool = FfmpegTool::default();
        let args = tool.capture_args(
            "https://radio.example/live.mp3",
            Path::new("/tmp/seg/segment_001.mp3"),
            Duration::from_secs(360),
        );
        let line = joined(&args);
        assert!(line.contains("-i https://radio.example/live.mp3"));
        assert!(line.contains("-t 360"));
        assert!(line.contains("-c copy"));
        assert_eq!(args.last().unwrap(), "/tmp/seg/segment_001.mp3");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_reach_the_tool_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tool = FfmpegTool::default();
        let output = Path::new(OsStr::from_bytes(b"/tmp/\xff.mp3"));
        let manifest = Path::new(OsStr::from_bytes(b"/tmp/\xfe/concat.txt"));

        let capture = tool.capture_args("http://radio", output, Duration::from_secs(1));
        assert_eq!(capture.last().unwrap().as_bytes(), b"/tmp/\xff.mp3");

        let concat = tool.concat_args(manifest, output);
        assert_eq!(concat[8].as_bytes(), b"/tmp/\xfe/concat.txt");
        assert_eq!(concat.last().unwrap().as_bytes(), b"/tmp/\xff.mp3");

        let command = tool.capture_command("http://radio", output, Duration::from_secs(1));
        let last = command.as_std().get_args().last().unwrap();
        assert_eq!(last.as_bytes(), b"/tmp/\xff.mp3");
    }

    #[test]
    fn test_capture_duration_rounds_up() {
        assert_eq!(whole_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(whole_seconds(Duration::from_secs(90)), 90);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }

    #[test]
    fn test_concat_args_use_demuxer() {
        let tool = FfmpegTool::new("/usr/local/bin/ffmpeg");
        let args = tool.concat_args(Path::new("/tmp/seg/concat.txt"), Path::new("/tmp/out.mp3"));
        let line = joined(&args);
        assert!(line.contains("-f concat -safe 0 -i /tmp/seg/concat.txt"));
        assert!(line.contains("-c copy"));

        let command =
            tool.concat_command(Path::new("/tmp/seg/concat.txt"), Path::new("/tmp/o.mp3"));
        assert_eq!(command.as_std().get_program(), "/usr/local/bin/ffmpeg");
    }
}
