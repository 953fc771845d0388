//! clipfetch library
//!
//! A download-task orchestration core: concurrent, cancellable,
//! progress-reporting jobs around an external extraction backend and
//! an external transcode/mux tool.

pub mod backend;
pub mod job;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod transcode;
pub mod utils;

// Re-export main types for easier use
pub use backend::{ExtractionBackend, ExtractionOptions, ExtractionResult, YtDlpBackend};
pub use job::{JobProgress, JobSpec, JobState, JobStatus, TargetResolution};
pub use registry::JobRegistry;
pub use resolver::PathResolver;
pub use runner::{ProcessOutcome, ProcessRunner, ProgressEvent, RunnerEvent, ToolLocator};
pub use transcode::TranscodePolicy;
pub use utils::{AppSettings, ClipfetchError, TranscodeSettings};
