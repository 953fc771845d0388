//! Job tracking and fan-out

pub mod manager;

pub use manager::JobRegistry;
