//! File system utilities

use std::io;
use std::path::{Path, PathBuf};

/// Resolve `path` against the current directory without touching the disk
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Ensure directory exists, creating parents as needed
pub async fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(path).await
}
