//! Result-path resolution module

pub mod artifact;
pub mod locate;

// Re-export for convenience
pub use artifact::{CandidateArtifact, ExtensionClass};
pub use locate::PathResolver;
