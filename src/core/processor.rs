//! Clip processing pipeline
//!
//! One request runs through a fixed sequence: create the output directory,
//! prepare the scratch directory, pick a format selector, download, name the
//! output, trim, clean up. Every step returns an [`AppResult`]; the first
//! error stops the pipeline and is turned into a failure [`ClipResult`] only
//! at the outer boundary ([`ClipProcessor::process`]).

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::core::config::{AppConfig, Installation, DEFAULT_VIDEO_URL_BASE};
use crate::core::fetcher::{FetchRequest, MediaFetcher, YtDlpFetcher};
use crate::core::format_selector::select_format;
use crate::core::models::{AppError, AppResult, ClipRequest, ClipResult};
use crate::core::naming::{unique_output_path, NamingScheme};
use crate::core::progress::{ProgressReporter, ProgressSink};
use crate::core::scratch::{CleanupPolicy, ScratchDir};
use crate::core::transcoder::{FfmpegTranscoder, MediaTranscoder, TrimJob};
use crate::utils::file_utils::{absolute_path, ensure_dir_exists};
use crate::utils::validation::video_url;

/// Behaviour switches of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOptions {
    pub cleanup: CleanupPolicy,
    pub naming: NamingScheme,
    pub per_run_scratch: bool,
    pub video_url_base: String,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            cleanup: CleanupPolicy::default(),
            naming: NamingScheme::default(),
            per_run_scratch: false,
            video_url_base: DEFAULT_VIDEO_URL_BASE.to_string(),
        }
    }
}

impl From<&AppConfig> for ProcessorOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            cleanup: config.cleanup,
            naming: config.naming,
            per_run_scratch: config.per_run_scratch,
            video_url_base: config.video_url_base.clone(),
        }
    }
}

/// Downloads and trims one clip per call
pub struct ClipProcessor {
    installation: Installation,
    options: ProcessorOptions,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn MediaTranscoder>,
}

impl ClipProcessor {
    pub fn new(
        installation: Installation,
        options: ProcessorOptions,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn MediaTranscoder>,
    ) -> Self {
        Self {
            installation,
            options,
            fetcher,
            transcoder,
        }
    }

    /// Processor backed by the yt-dlp and ffmpeg binaries of the configured installation
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let installation = config.installation()?;
        debug!("Using installation: {:?}", installation);

        let fetcher = YtDlpFetcher::new(installation.fetcher.clone())
            .with_extra_args(config.fetcher_args.clone());
        let transcoder = FfmpegTranscoder::new(installation.transcoder.clone());

        Ok(Self::new(
            installation,
            ProcessorOptions::from(config),
            Arc::new(fetcher),
            Arc::new(transcoder),
        ))
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Parse a JSON request and process it; never fails
    pub async fn process_json(&self, raw: &str, sink: Arc<dyn ProgressSink>) -> ClipResult {
        match ClipRequest::from_json(raw) {
            Ok(request) => self.process(&request, sink).await,
            Err(e) => {
                error!("❌ Rejected request: {}", e);
                ClipResult::failure(&e)
            }
        }
    }

    /// Process a request; every failure becomes a failure result
    pub async fn process(&self, request: &ClipRequest, sink: Arc<dyn ProgressSink>) -> ClipResult {
        let reporter = ProgressReporter::new(sink);
        let result = self.run(request, &reporter).await;

        if let Err(e) = &result {
            error!(kind = ?e.kind(), "❌ Clip failed: {}", e);
        }
        ClipResult::from(result)
    }

    /// Run the pipeline and return the trimmed file's path
    pub async fn run(&self, request: &ClipRequest, progress: &ProgressReporter) -> AppResult<PathBuf> {
        info!(
            "🎬 Processing {} [{} - {}] quality={} format={:?}",
            request.video_id, request.start_time, request.end_time, request.quality, request.format
        );

        let output_dir = self.prepare_output_dir(&request.output_path).await?;
        let scratch =
            ScratchDir::prepare(&self.installation.scratch, self.options.per_run_scratch).await?;

        let result = self.fetch_and_trim(request, &output_dir, &scratch, progress).await;

        if self.options.cleanup.applies(result.is_ok()) {
            scratch.clean().await;
        } else {
            debug!(
                "Keeping scratch files in {} (cleanup policy {:?})",
                scratch.path().display(),
                self.options.cleanup
            );
        }

        result
    }

    async fn prepare_output_dir(&self, output_path: &str) -> AppResult<PathBuf> {
        let requested = Path::new(output_path);
        let output_dir = absolute_path(requested).map_err(|source| AppError::OutputDirectory {
            path: requested.to_path_buf(),
            source,
        })?;

        ensure_dir_exists(&output_dir)
            .await
            .map_err(|source| AppError::OutputDirectory {
                path: output_dir.clone(),
                source,
            })?;

        Ok(output_dir)
    }

    async fn fetch_and_trim(
        &self,
        request: &ClipRequest,
        output_dir: &Path,
        scratch: &ScratchDir,
        progress: &ProgressReporter,
    ) -> AppResult<PathBuf> {
        let format_selector = select_format(request.format, request.quality);
        let fetch = FetchRequest {
            url: video_url(&self.options.video_url_base, &request.video_id)?,
            format_selector,
            audio_only: request.format.is_audio(),
            scratch_dir: scratch.path().to_path_buf(),
            transcoder_location: Some(self.installation.transcoder.clone()),
        };

        let downloaded = self.fetcher.fetch(&fetch, progress).await?;
        progress.finish();

        let output = unique_output_path(
            output_dir,
            &Local::now(),
            request.format.extension(),
            self.options.naming,
        );
        info!("Resolved output path: {}", output.display());

        let job = TrimJob {
            input: downloaded,
            output: output.clone(),
            start: request.start_time.clone(),
            end: request.end_time.clone(),
            format: request.format,
        };
        self.transcoder.trim(&job).await?;

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_resolves_installation() {
        let root = tempfile::tempdir().unwrap();
        let config = AppConfig {
            install_root: Some(root.path().to_path_buf()),
            fetcher_path: Some(PathBuf::from("/usr/local/bin/yt-dlp")),
            cleanup: CleanupPolicy::Never,
            per_run_scratch: true,
            ..AppConfig::default()
        };

        let processor = ClipProcessor::from_config(&config).unwrap();

        let installation = processor.installation();
        assert_eq!(installation.root, root.path());
        assert_eq!(installation.scratch, root.path().join("temp"));
        assert_eq!(installation.fetcher, PathBuf::from("/usr/local/bin/yt-dlp"));
        assert_eq!(processor.options().cleanup, CleanupPolicy::Never);
        assert!(processor.options().per_run_scratch);
        assert_eq!(processor.options().video_url_base, DEFAULT_VIDEO_URL_BASE);
    }

    #[test]
    fn test_default_options() {
        let options = ProcessorOptions::default();
        assert_eq!(options.cleanup, CleanupPolicy::Always);
        assert_eq!(options.naming, NamingScheme::Timestamp);
        assert!(!options.per_run_scratch);
    }
}
