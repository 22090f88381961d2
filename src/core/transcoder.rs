//! Trimming through an external ffmpeg binary

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::core::models::{AppError, AppResult, OutputFormat, TimePoint};
use crate::utils::process::tool_command;

/// One trim operation
#[derive(Debug, Clone, PartialEq)]
pub struct TrimJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: TimePoint,
    pub end: TimePoint,
    pub format: OutputFormat,
}

/// Produces the trimmed output file for a [`TrimJob`]
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    async fn trim(&self, job: &TrimJob) -> AppResult<()>;
}

/// Flags placed before the trim template: no banner, never read stdin,
/// never overwrite an existing output.
const GLOBAL_ARGS: [&str; 3] = ["-hide_banner", "-nostdin", "-n"];

/// Argument list for a trim job, without the program name
pub fn trim_args(job: &TrimJob) -> Vec<OsString> {
    let mut args: Vec<OsString> = GLOBAL_ARGS.iter().map(OsString::from).collect();

    args.push("-ss".into());
    args.push(job.start.as_arg().into());
    args.push("-i".into());
    args.push(job.input.clone().into_os_string());
    args.push("-to".into());
    args.push(job.end.as_arg().into());

    let codec_args: &[&str] = match job.format {
        OutputFormat::Audio => &["-c:a", "libmp3lame", "-q:a", "2"],
        OutputFormat::Video => &[
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-crf",
            "20",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ],
    };
    args.extend(codec_args.iter().map(OsString::from));

    args.extend(
        ["-copyts", "-avoid_negative_ts", "make_zero"]
            .iter()
            .map(OsString::from),
    );
    args.push(job.output.clone().into_os_string());
    args
}

/// ffmpeg-backed transcoder
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn trim(&self, job: &TrimJob) -> AppResult<()> {
        info!(
            "✂️ Trimming {} [{} - {}] -> {}",
            job.input.display(),
            job.start,
            job.end,
            job.output.display()
        );

        let args = trim_args(job);
        debug!("Running {} {:?}", self.program.display(), args);

        let output = tool_command(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| AppError::Transcode {
                code: None,
                stderr: format!("failed to start {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!("FFmpeg error: {}", stderr);
            return Err(AppError::Transcode {
                code: output.status.code(),
                stderr,
            });
        }

        info!("✅ Trimmed file written: {}", job.output.display());
        Ok(())
    }
}
