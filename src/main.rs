use clap::Parser;
use serde::Serialize;
use std::io::Stdout;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use video_clip_trimmer::core::scratch::CleanupPolicy;
use video_clip_trimmer::{
    check_tools, AppConfig, AppResult, ClipProcessor, ClipResult, JsonLinesWriter, ProgressSink,
};

/// Download a video, cut a time range out of it and print JSON-lines progress
#[derive(Parser, Debug)]
#[command(name = "clip-trimmer", author, version, about, long_about = None)]
struct Cli {
    /// Clip request as a JSON object
    #[arg(required_unless_present = "check")]
    request: Option<String>,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the bundled tools and the scratch directory
    #[arg(long)]
    install_root: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// yt-dlp executable
    #[arg(long = "yt-dlp")]
    yt_dlp: Option<PathBuf>,

    /// Scratch directory for downloads
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// When to empty the scratch directory: always, on-success, never
    #[arg(long)]
    cleanup: Option<CleanupPolicy>,

    /// Download into a fresh subdirectory of the scratch directory
    #[arg(long)]
    per_run_scratch: bool,

    /// Probe ffmpeg and yt-dlp and print their versions
    #[arg(long)]
    check: bool,
}

impl Cli {
    /// Config file, then environment, then flags
    fn load_config(&self) -> AppResult<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load()?,
        };
        config.apply_env_overrides()?;

        if let Some(root) = &self.install_root {
            config.install_root = Some(root.clone());
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.transcoder_path = Some(ffmpeg.clone());
        }
        if let Some(yt_dlp) = &self.yt_dlp {
            config.fetcher_path = Some(yt_dlp.clone());
        }
        if let Some(scratch) = &self.scratch_dir {
            config.scratch_dir = Some(scratch.clone());
        }
        if let Some(cleanup) = self.cleanup {
            config.cleanup = cleanup;
        }
        if self.per_run_scratch {
            config.per_run_scratch = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn emit<T: Serialize>(out: &JsonLinesWriter<Stdout>, record: &T) {
    if let Err(e) = out.write_record(record) {
        error!("Failed to write result record: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let out = Arc::new(JsonLinesWriter::stdout());

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            video_clip_trimmer::init("info");
            error!("❌ Configuration error: {}", e);
            emit(&out, &ClipResult::failure(&e));
            return;
        }
    };
    video_clip_trimmer::init(&config.log_level);

    if cli.check {
        let report = match config.installation() {
            Ok(installation) => check_tools(&installation).await,
            Err(e) => {
                emit(&out, &ClipResult::failure(&e.into()));
                return;
            }
        };
        info!("🔍 Tool check finished: success={}", report.success);
        emit(&out, &report);
        return;
    }

    let processor = match ClipProcessor::from_config(&config) {
        Ok(processor) => processor,
        Err(e) => {
            error!("❌ Failed to initialize processor: {}", e);
            emit(&out, &ClipResult::failure(&e));
            return;
        }
    };

    // clap guarantees a request whenever --check is absent
    let raw = cli.request.as_deref().unwrap_or_default();
    let sink: Arc<dyn ProgressSink> = out.clone();
    let result = processor.process_json(raw, sink).await;

    if result.is_success() {
        info!("✅ Clip written to {}", result.path().unwrap_or_default());
    }
    emit(&out, &result);
}
