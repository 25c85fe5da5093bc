//! Capture tool integration
//!
//! The recorder never talks to the network itself. It drives an external
//! tool through the [`MediaTool`] seam: one command to capture a bounded
//! segment, one to concatenate finished segments losslessly.

pub mod tool;

pub use tool::{FfmpegTool, MediaTool};
