//! State module for pacing and run bookkeeping
//!
//! # Components
//!
//! - `RateState`: Adaptive per-endpoint interval with a bounded outcome history
//! - `TaskType`, `TaskStatus`, `Trigger`: Scheduled run classification
//! - `TaskOutcome`: Append-only record of a finished run

mod rate_state;
mod task_state;

// Re-export main types
pub use rate_state::{CallOutcome, RateSettings, RateSnapshot, RateState};
pub use task_state::{TaskOutcome, TaskStatus, TaskType, Trigger};
