//! Application configuration management
//!
//! Configuration comes from (lowest to highest precedence) built-in defaults,
//! a JSON file, `CLIP_TRIMMER_*` environment variables and command-line
//! flags. The result is resolved once into an [`Installation`], which the
//! processor receives explicitly.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::naming::NamingScheme;
use crate::core::scratch::CleanupPolicy;

/// Default page used to turn a bare video id into a URL
pub const DEFAULT_VIDEO_URL_BASE: &str = "https://www.youtube.com/watch";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the bundled tools; defaults to the executable's directory
    pub install_root: Option<PathBuf>,
    /// ffmpeg binary; defaults to `<root>/ffmpeg`
    pub transcoder_path: Option<PathBuf>,
    /// yt-dlp binary; defaults to `<root>/yt-dlp` when present, else `PATH`
    pub fetcher_path: Option<PathBuf>,
    /// Download directory; defaults to `<root>/temp`
    pub scratch_dir: Option<PathBuf>,
    pub cleanup: CleanupPolicy,
    pub naming: NamingScheme,
    /// Download into a fresh subdirectory of the scratch directory per run
    pub per_run_scratch: bool,
    pub video_url_base: String,
    /// Extra yt-dlp arguments, inserted before the URL
    pub fetcher_args: Vec<String>,
    pub log_level: String, // "error", "warn", "info", "debug", "trace"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            install_root: None,
            transcoder_path: None,
            fetcher_path: None,
            scratch_dir: None,
            cleanup: CleanupPolicy::default(),
            naming: NamingScheme::default(),
            per_run_scratch: false,
            video_url_base: DEFAULT_VIDEO_URL_BASE.to_string(),
            fetcher_args: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

/// Resolved locations used by one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub root: PathBuf,
    pub transcoder: PathBuf,
    pub fetcher: PathBuf,
    pub scratch: PathBuf,
}

impl Installation {
    /// Default layout beneath `root`
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let bundled_fetcher = root.join(executable_name("yt-dlp"));
        let fetcher = if bundled_fetcher.is_file() {
            bundled_fetcher
        } else {
            PathBuf::from(executable_name("yt-dlp"))
        };

        Self {
            transcoder: root.join(executable_name("ffmpeg")),
            fetcher,
            scratch: root.join("temp"),
            root,
        }
    }
}

/// Platform file name of an executable
pub fn executable_name(name: &str) -> String {
    format!("{}{}", name, std::env::consts::EXE_SUFFIX)
}

/// Directory of the running executable
pub fn default_install_root() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("Executable has no parent directory: {:?}", exe))
}

impl AppConfig {
    /// Load from the platform config file, or defaults when there is none
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load from an explicit JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::info!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "videodownloader", "clip-trimmer")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Apply `CLIP_TRIMMER_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(root) = lookup("CLIP_TRIMMER_HOME") {
            self.install_root = Some(PathBuf::from(root));
        }
        if let Some(ffmpeg) = lookup("CLIP_TRIMMER_FFMPEG") {
            self.transcoder_path = Some(PathBuf::from(ffmpeg));
        }
        if let Some(ytdlp) = lookup("CLIP_TRIMMER_YTDLP") {
            self.fetcher_path = Some(PathBuf::from(ytdlp));
        }
        if let Some(scratch) = lookup("CLIP_TRIMMER_SCRATCH") {
            self.scratch_dir = Some(PathBuf::from(scratch));
        }
        if let Some(cleanup) = lookup("CLIP_TRIMMER_CLEANUP") {
            self.cleanup = cleanup
                .parse::<CleanupPolicy>()
                .with_context(|| "Invalid CLIP_TRIMMER_CLEANUP")?;
        }
        if let Some(level) = lookup("CLIP_TRIMMER_LOG") {
            self.log_level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("install_root", &self.install_root),
            ("transcoder_path", &self.transcoder_path),
            ("fetcher_path", &self.fetcher_path),
            ("scratch_dir", &self.scratch_dir),
        ];
        for (name, path) in paths {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                anyhow::bail!("{} must not be empty", name);
            }
        }

        let base = url::Url::parse(&self.video_url_base)
            .with_context(|| format!("Invalid video_url_base: {}", self.video_url_base))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("video_url_base must be an http(s) URL");
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        Ok(())
    }

    /// Resolve tool and scratch locations
    pub fn installation(&self) -> Result<Installation> {
        let root = match &self.install_root {
            Some(root) => root.clone(),
            None => default_install_root()?,
        };

        let mut installation = Installation::under(root);
        if let Some(transcoder) = &self.transcoder_path {
            installation.transcoder = transcoder.clone();
        }
        if let Some(fetcher) = &self.fetcher_path {
            installation.fetcher = fetcher.clone();
        }
        if let Some(scratch) = &self.scratch_dir {
            installation.scratch = scratch.clone();
        }

        Ok(installation)
    }
}
