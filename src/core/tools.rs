//! Availability checks for the external tools

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::config::Installation;
use crate::core::models::{AppError, AppResult};
use crate::utils::process::tool_command;

/// Run `program <version_arg>` and return the first line it prints
pub async fn probe_version(program: &Path, version_arg: &str) -> AppResult<String> {
    let output = tool_command(program)
        .arg(version_arg)
        .output()
        .await
        .map_err(|e| AppError::ToolUnavailable(format!("{}: {}", program.display(), e)))?;

    if !output.status.success() {
        return Err(AppError::ToolUnavailable(format!(
            "{} exited with {}",
            program.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Status of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolStatus {
    async fn probe(program: &Path, version_arg: &str) -> Self {
        match probe_version(program, version_arg).await {
            Ok(version) => {
                info!("🔧 {} -> {}", program.display(), version);
                Self {
                    path: program.to_path_buf(),
                    version: Some(version),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Tool check failed: {}", e);
                Self {
                    path: program.to_path_buf(),
                    version: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

/// Record printed by `--check`
#[derive(Debug, Clone, Serialize)]
pub struct ToolReport {
    pub success: bool,
    pub transcoder: ToolStatus,
    pub fetcher: ToolStatus,
}

/// Probe the transcoder and the fetcher of an installation
pub async fn check_tools(installation: &Installation) -> ToolReport {
    let transcoder = ToolStatus::probe(&installation.transcoder, "-version").await;
    let fetcher = ToolStatus::probe(&installation.fetcher, "--version").await;

    ToolReport {
        success: transcoder.is_available() && fetcher.is_available(),
        transcoder,
        fetcher,
    }
}
