//! Per-show settings and delivery
//!
//! A show names a stream plus where finished recordings should be copied.

pub mod delivery;
pub mod schema;

pub use delivery::{recording_file_name, Destination, FlatDestination, LocalDestination};
pub use schema::{Settings, ShowSettings};
