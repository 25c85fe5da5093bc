//! Stream Recorder - record network audio streams without losing the show.
//!
//! The recording core lives in [`recorder`]: a supervisor that keeps a
//! capture tool running for the requested duration, restarting it on drops
//! and stalls, and stitches the pieces back together at the end. The rest
//! of the crate is the command-line driver around it.

pub mod cli;
pub mod commands;
pub mod ffmpeg;
pub mod recorder;
pub mod show;
pub mod utils;

pub use recorder::{record_resilient, RecorderConfig, RecordingOutcome};
