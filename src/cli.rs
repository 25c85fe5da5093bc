use clap::Parser;
use std::path::PathBuf;

/// Longest recording accepted on the command line, one year
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "stream-recorder",
    version,
    about = "Record a show from its stream, surviving drops and stalls"
)]
pub struct CliArgs {
    /// Show name, matched case-insensitively against [shows.<NAME>] in the settings file
    #[arg(short, long)]
    pub name: String,

    /// Seconds to record
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_SECS))]
    pub duration: u64,

    /// Copy the recording into the show's dated archive tree (needs `saveto`)
    #[arg(long)]
    pub to_local: bool,

    /// Copy the recording into a flat directory (needs `savetoflat`)
    #[arg(long)]
    pub to_local_flat: bool,

    /// Settings file
    #[arg(short, long, default_value = "settings.toml")]
    pub settings: PathBuf,

    /// Where the recording and its working files are written
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Print the outcome as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging, including capture tool output
    #[arg(short, long)]
    pub verbose: bool,
}
