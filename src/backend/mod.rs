//! Extraction backend boundary

pub mod models;
pub mod traits;
pub mod ytdlp;

pub use models::{ExtractionOptions, ExtractionResult, RequestedDownload, DEFAULT_USER_AGENT};
pub use traits::ExtractionBackend;
pub use ytdlp::YtDlpBackend;
