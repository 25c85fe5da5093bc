//! Command handlers
//!
//! Wiring between the command line, the settings file, the recording core
//! and delivery.

pub mod record;

pub use record::{record, RecordReport};
