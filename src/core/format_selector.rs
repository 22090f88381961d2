//! Format selection strings handed to the fetcher

use crate::core::models::{OutputFormat, Quality};

/// Selector used for every audio-only request
pub const AUDIO_SELECTOR: &str = "bestaudio/best";

/// Build the video selector for a quality preset.
///
/// Prefers separate mp4 video + m4a audio streams capped at the preset
/// height, falling back to a single muxed mp4.
pub fn video_selector(quality: Quality) -> String {
    match quality.max_height() {
        Some(height) => format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]",
            h = height
        ),
        None => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]".to_string(),
    }
}

/// Selector for a request's mode and quality
pub fn select_format(format: OutputFormat, quality: Quality) -> String {
    match format {
        OutputFormat::Audio => AUDIO_SELECTOR.to_string(),
        OutputFormat::Video => video_selector(quality),
    }
}
