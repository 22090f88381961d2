//! Core business logic module
//!
//! This module contains the domain models, the external tool adapters and the
//! clip processing pipeline.

pub mod config;
pub mod fetcher;
pub mod format_selector;
pub mod models;
pub mod naming;
pub mod processor;
pub mod progress;
pub mod scratch;
pub mod tools;
pub mod transcoder;


// Re-export commonly used types
pub use config::{AppConfig, Installation};
pub use models::{AppError, AppResult, ClipRequest, ClipResult};
pub use processor::{ClipProcessor, ProcessorOptions};
pub use progress::{JsonLinesWriter, ProgressReporter, ProgressSink};
