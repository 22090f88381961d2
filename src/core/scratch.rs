//! Scratch directory handling
//!
//! Downloads land in a scratch directory under the installation root and are
//! deleted once the run ends. Deletion is best-effort: failures are logged
//! and counted, never returned.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::models::{AppError, AppResult};

/// When scratch files are removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// After every run, successful or not
    #[default]
    Always,
    /// Only after a successful run; failed downloads stay for inspection
    OnSuccess,
    /// Never; the caller manages the directory
    Never,
}

impl CleanupPolicy {
    pub fn applies(self, succeeded: bool) -> bool {
        match self {
            CleanupPolicy::Always => true,
            CleanupPolicy::OnSuccess => succeeded,
            CleanupPolicy::Never => false,
        }
    }
}

impl std::str::FromStr for CleanupPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(CleanupPolicy::Always),
            "on-success" => Ok(CleanupPolicy::OnSuccess),
            "never" => Ok(CleanupPolicy::Never),
            other => Err(AppError::Config(format!(
                "Invalid cleanup policy '{}': must be 'always', 'on-success' or 'never'",
                other
            ))),
        }
    }
}

/// Scratch directory used by one run
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
    per_run: bool,
}

impl ScratchDir {
    /// Create `root` (or a fresh `root/<uuid>` when `per_run`)
    pub async fn prepare(root: &Path, per_run: bool) -> AppResult<Self> {
        let path = if per_run {
            root.join(Uuid::new_v4().simple().to_string())
        } else {
            root.to_path_buf()
        };

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| AppError::ScratchDirectory {
                path: path.clone(),
                source,
            })?;

        debug!("Scratch directory ready: {}", path.display());
        Ok(Self { path, per_run })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove scratch files; a per-run directory is removed as well
    pub async fn clean(&self) -> CleanupReport {
        let report = clean_scratch_dir(&self.path).await;

        if self.per_run && report.failed == 0 {
            if let Err(e) = tokio::fs::remove_dir(&self.path).await {
                warn!(
                    "Failed to remove scratch directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }

        report
    }
}

/// Outcome of a cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Delete every regular file directly inside `dir`.
///
/// A missing directory counts as clean.
pub async fn clean_scratch_dir(dir: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            warn!("Error during cleanup of {}: {}", dir.display(), e);
            report.failed += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error during cleanup of {}: {}", dir.display(), e);
                report.failed += 1;
                break;
            }
        };

        let path = entry.path();
        let is_file = match entry.file_type().await {
            Ok(file_type) => !file_type.is_dir(),
            Err(e) => {
                warn!("Cannot inspect {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };
        if !is_file {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    info!(
        "🧹 Temporary files cleaned up: {} removed, {} failed",
        report.removed, report.failed
    );
    report
}
