//! External process supervision module

pub mod process;
pub mod progress;
pub mod tools;

// Re-export for convenience
pub use process::{ProcessOutcome, ProcessRunner, RunRequest};
pub use progress::{parse_progress_line, ProgressEvent, RunnerEvent};
pub use tools::ToolLocator;
