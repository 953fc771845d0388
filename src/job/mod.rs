//! Job model and per-job orchestration

pub mod extraction;
pub mod spec;
pub mod state;

// Re-export for convenience
pub use extraction::ExtractionJob;
pub use spec::{JobSpec, TargetResolution};
pub use state::{JobProgress, JobState, JobStatus};
