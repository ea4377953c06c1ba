//! Utilities shared by the CLI.
//!
//! - [`progress`] renders update runs as terminal progress bars

pub mod progress;

pub use progress::{ProgressStyle, TerminalProgress, is_progress_disabled};
