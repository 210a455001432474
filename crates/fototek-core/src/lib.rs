//! Fototek Core Library
//!
//! This crate provides core domain models, error types, configuration, and the
//! consumer-barrier trait that are shared across all Fototek components.

pub mod barrier;
pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use barrier::ConsumerBarrier;
pub use config::Config;
pub use error::PipelineError;
