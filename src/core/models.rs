//! Core data models for the clip trimmer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output mode of a clip request

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum OutputFormat {
    Video,

    Audio,
}

impl OutputFormat {
    /// Extension (with leading dot) of the trimmed file
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Video => ".mp4",
            OutputFormat::Audio => ".mp3",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, OutputFormat::Audio)
    }
}

// Anything other than "audio" is treated as video.
impl From<String> for OutputFormat {
    fn from(value: String) -> Self {
        if value == "audio" {
            OutputFormat::Audio
        } else {
            OutputFormat::Video
        }
    }
}

/// Quality preset used to build the video format selector

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String")]
pub enum Quality {
    #[serde(rename = "360p")]
    P360,

    #[serde(rename = "480p")]
    P480,

    #[serde(rename = "720p")]
    P720,

    #[serde(rename = "1080p")]
    P1080,

    #[serde(rename = "highest")]
    Highest,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::P360,
        Quality::P480,
        Quality::P720,
        Quality::P1080,
        Quality::Highest,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Quality::P360 => "360p",
            Quality::P480 => "480p",
            Quality::P720 => "720p",
            Quality::P1080 => "1080p",
            Quality::Highest => "highest",
        }
    }

    /// Maximum frame height, `None` for the unbounded preset
    pub fn max_height(self) -> Option<u32> {
        match self {
            Quality::P360 => Some(360),
            Quality::P480 => Some(480),
            Quality::P720 => Some(720),
            Quality::P1080 => Some(1080),
            Quality::Highest => None,
        }
    }

    /// Look up a label, falling back to `Highest` for anything unknown
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            tracing::debug!("Unrecognized quality '{}', using highest", label);
            Quality::Highest
        })
    }
}

impl FromStr for Quality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .into_iter()
            .find(|q| q.label() == s)
            .ok_or_else(|| AppError::InvalidRequest(format!("unknown quality: {}", s)))
    }
}

impl From<String> for Quality {
    fn from(value: String) -> Self {
        Quality::from_label(&value)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A clip boundary as received from the caller.
///
/// Strings are passed through verbatim; numbers are seconds and are rendered
/// with their JSON text so `10` stays `10` and `12.5` stays `12.5`.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimePoint {
    Text(String),

    Seconds(serde_json::Number),
}

impl TimePoint {
    pub fn as_arg(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePoint::Text(text) => f.write_str(text),
            TimePoint::Seconds(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for TimePoint {
    fn from(value: &str) -> Self {
        TimePoint::Text(value.to_string())
    }
}

/// Clip request as received on the command line

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    pub video_id: String,

    pub start_time: TimePoint,

    pub end_time: TimePoint,

    pub quality: Quality,

    pub output_path: String,

    pub format: OutputFormat,
}

impl ClipRequest {
    /// Parse the JSON argument passed to the binary
    pub fn from_json(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(|e| AppError::InvalidRequest(e.to_string()))
    }
}

/// Terminal record of a run.
///
/// Exactly one of `path` and `error` is set; the fields are private so only
/// the two constructors can build one.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipResult {
    success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl ClipResult {
    pub fn success(path: &Path) -> Self {
        Self {
            success: true,
            path: Some(path.display().to_string()),
            error: None,
            kind: None,
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            path: None,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }
}

impl From<AppResult<PathBuf>> for ClipResult {
    fn from(result: AppResult<PathBuf>) -> Self {
        match result {
            Ok(path) => ClipResult::success(&path),
            Err(error) => ClipResult::failure(&error),
        }
    }
}

/// Byte counters reported by the fetcher

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,

    /// Exact or estimated total, when the fetcher knows one
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Percentage in 0..=100, only when a positive total is known
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// Machine-readable failure category

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,

    Config,

    OutputDirectory,

    ScratchDirectory,

    Fetch,

    Transcode,

    ToolUnavailable,

    Io,
}

/// Application error types

#[derive(Debug, thiserror::Error)]

pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to create output directory {}: {source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare scratch directory {}: {source}", .path.display())]
    ScratchDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {0}")]
    Fetch(String),

    #[error("{}", transcode_message(.code, .stderr))]
    Transcode { code: Option<i32>, stderr: String },

    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AppError::Config(_) => ErrorKind::Config,
            AppError::OutputDirectory { .. } => ErrorKind::OutputDirectory,
            AppError::ScratchDirectory { .. } => ErrorKind::ScratchDirectory,
            AppError::Fetch(_) => ErrorKind::Fetch,
            AppError::Transcode { .. } => ErrorKind::Transcode,
            AppError::ToolUnavailable(_) => ErrorKind::ToolUnavailable,
            AppError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Config(format!("{:#}", error))
    }
}

/// Number of trailing stderr lines quoted in a transcode error
const STDERR_TAIL_LINES: usize = 3;

fn transcode_message(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    };

    let tail: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let tail = &tail[tail.len().saturating_sub(STDERR_TAIL_LINES)..];

    if tail.is_empty() {
        format!("Transcoding failed ({})", status)
    } else {
        format!("Transcoding failed ({}): {}", status, tail.join(" | "))
    }
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;
