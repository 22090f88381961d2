//! URL and input validation utilities

use url::Url;

use crate::core::models::{AppError, AppResult};

/// Check if a string is an absolute http(s) URL
pub fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Build the watch URL for a video id.
///
/// Full http(s) URLs are returned unchanged; anything else is treated as an
/// id and added as the `v` query parameter of `base`.
pub fn video_url(base: &str, video_id: &str) -> AppResult<String> {
    let video_id = video_id.trim();
    if video_id.is_empty() {
        return Err(AppError::InvalidRequest("videoId must not be empty".to_string()));
    }

    if is_http_url(video_id) {
        return Ok(video_id.to_string());
    }

    let url = Url::parse_with_params(base, &[("v", video_id)])
        .map_err(|e| AppError::Config(format!("Invalid video URL base '{}': {}", base, e)))?;
    Ok(url.into())
}
