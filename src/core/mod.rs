//! Core types shared by every stage of the update pipeline.
//!
//! - [`UpdateError`] is the failure taxonomy of one orchestration run
//! - [`UpdateStage`] is the run's state machine
//! - [`ErrorContext`] and [`user_friendly_error`] turn failures into CLI output

pub mod error;
mod stage;

pub use error::{ErrorContext, Result, UpdateError, user_friendly_error};
pub use stage::UpdateStage;
