//! Video Clip Trimmer - Core Library
//!
//! Downloads a video through yt-dlp, cuts the requested time range with
//! ffmpeg and reports progress and the outcome as JSON lines.

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::{AppConfig, Installation},
    models::{AppError, AppResult, ClipRequest, ClipResult, ErrorKind, OutputFormat, Quality},
    processor::{ClipProcessor, ProcessorOptions},
    progress::{JsonLinesWriter, ProgressSink},
    tools::{check_tools, ToolReport},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging at `log_level` unless `RUST_LOG` says otherwise
pub fn init(log_level: &str) {
    utils::logging::init_tracing(log_level);
    tracing::debug!("📚 {} v{} initialized", NAME, VERSION);
}
