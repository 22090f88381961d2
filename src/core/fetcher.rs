//! Media retrieval through an external yt-dlp binary
//!
//! yt-dlp resolves the platform URL, picks streams according to the format
//! selector, downloads them into the scratch directory and (for audio
//! requests) extracts an mp3. We only drive the process: its output is read
//! line by line to follow progress and to learn where the final file went.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::models::{AppError, AppResult, DownloadProgress};
use crate::core::progress::ProgressReporter;
use crate::utils::process::{last_line, tool_command};

/// What to download and where
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub format_selector: String,
    pub audio_only: bool,
    pub scratch_dir: PathBuf,
    /// ffmpeg used by the fetcher for merging streams and extracting audio
    pub transcoder_location: Option<PathBuf>,
}

/// Downloads a media object to a local file and returns its path
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest, progress: &ProgressReporter)
        -> AppResult<PathBuf>;
}

const PROGRESS_PREFIX: &str = "[progress]";
const PROGRESS_TEMPLATE: &str = "download:[progress]%(progress.downloaded_bytes)s/%(progress.total_bytes)s/%(progress.total_bytes_estimate)s";
const FILEPATH_PREFIX: &str = "[filepath]";
const FILEPATH_TEMPLATE: &str = "after_move:[filepath]%(filepath)s";

/// Extensions of files that are still being written
const PARTIAL_EXTENSIONS: [&str; 4] = ["part", "ytdl", "tmp", "temp"];

/// Number of stderr lines kept for error reporting
const STDERR_TAIL: usize = 20;

/// A classified line of yt-dlp output
#[derive(Debug, Clone, PartialEq)]
pub enum FetcherLine {
    Progress(DownloadProgress),
    /// Path printed after all post-processing
    FinalPath(PathBuf),
    /// Intermediate destination announced while downloading or converting
    Destination(PathBuf),
    Error(String),
    Other,
}

/// Classify one line of yt-dlp output
pub fn parse_line(line: &str) -> FetcherLine {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        return parse_progress(rest).map_or(FetcherLine::Other, FetcherLine::Progress);
    }

    if let Some(path) = line.strip_prefix(FILEPATH_PREFIX) {
        return non_empty_path(path).map_or(FetcherLine::Other, FetcherLine::FinalPath);
    }

    if let Some(message) = line.strip_prefix("ERROR:") {
        return FetcherLine::Error(message.trim().to_string());
    }

    for prefix in ["[download] Destination:", "[ExtractAudio] Destination:"] {
        if let Some(path) = line.strip_prefix(prefix) {
            return non_empty_path(path).map_or(FetcherLine::Other, FetcherLine::Destination);
        }
    }

    if let Some(rest) = line.strip_prefix("[Merger] Merging formats into \"") {
        return non_empty_path(rest.trim_end_matches('"'))
            .map_or(FetcherLine::Other, FetcherLine::Destination);
    }

    if let Some(rest) = line.strip_prefix("[download] ") {
        if let Some(path) = rest.strip_suffix(" has already been downloaded") {
            return non_empty_path(path).map_or(FetcherLine::Other, FetcherLine::Destination);
        }
    }

    FetcherLine::Other
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

/// `downloaded/total/estimate`, where unknown fields print as `NA`
fn parse_progress(rest: &str) -> Option<DownloadProgress> {
    let mut fields = rest.trim().split('/');
    let downloaded = parse_bytes(fields.next()?)?;
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);

    Some(DownloadProgress {
        downloaded_bytes: downloaded,
        total_bytes: total.or(estimate),
    })
}

fn parse_bytes(field: &str) -> Option<u64> {
    let value: f64 = field.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

/// Command line for a fetch, without the program name
pub fn fetch_args(request: &FetchRequest, extra_args: &[String]) -> Vec<OsString> {
    let template = request.scratch_dir.join("%(title)s.%(ext)s");

    let mut args: Vec<OsString> = vec![
        "-f".into(),
        request.format_selector.clone().into(),
        "--no-playlist".into(),
        "--newline".into(),
        "--encoding".into(),
        "utf-8".into(),
        "--progress".into(),
        "--progress-template".into(),
        PROGRESS_TEMPLATE.into(),
        "--print".into(),
        FILEPATH_TEMPLATE.into(),
        "-o".into(),
        template.into_os_string(),
    ];

    if let Some(location) = &request.transcoder_location {
        args.push("--ffmpeg-location".into());
        args.push(location.clone().into_os_string());
    }

    if request.audio_only {
        args.extend(
            ["-x", "--audio-format", "mp3", "--audio-quality", "192K"]
                .iter()
                .map(OsString::from),
        );
    }

    args.extend(extra_args.iter().map(OsString::from));
    args.push(request.url.clone().into());
    args
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read yt-dlp output: {}", e);
                    break;
                }
            }

            // Titles may arrive in the console code page; keep draining regardless.
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(&['\n', '\r'][..]).to_string();
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    });
}

/// yt-dlp-backed fetcher
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments inserted before the URL
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> AppResult<PathBuf> {
        info!(
            "⬇️ Starting download: {} (format: {})",
            request.url, request.format_selector
        );

        let args = fetch_args(request, &self.extra_args);
        debug!("Running {} {:?}", self.program.display(), args);

        let started = SystemTime::now();
        let mut child = tool_command(&self.program)
            .args(&args)
            .spawn()
            .map_err(|e| {
                AppError::Fetch(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let mut final_path: Option<PathBuf> = None;
        let mut destination: Option<PathBuf> = None;
        let mut last_error: Option<String> = None;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

        while let Some((stream, line)) = rx.recv().await {
            match parse_line(&line) {
                FetcherLine::Progress(bytes) => progress.update(bytes),
                FetcherLine::FinalPath(path) => final_path = Some(path),
                FetcherLine::Destination(path) => {
                    debug!("yt-dlp destination: {}", path.display());
                    destination = Some(path);
                }
                FetcherLine::Error(message) => last_error = Some(message),
                FetcherLine::Other => debug!("yt-dlp: {}", line),
            }

            if matches!(stream, Stream::Stderr) {
                if stderr_tail.len() == STDERR_TAIL {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::Fetch(format!("yt-dlp process failed: {}", e)))?;

        if !status.success() {
            let stderr = stderr_tail.iter().cloned().collect::<Vec<_>>().join("\n");
            let message = last_error
                .or_else(|| last_line(&stderr).map(str::to_string))
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            warn!("yt-dlp failed: {}", message);
            return Err(AppError::Fetch(message));
        }

        let path = match [final_path, destination]
            .into_iter()
            .flatten()
            .find(|p| p.is_file())
        {
            Some(path) => path,
            None => newest_media_file(&request.scratch_dir, started).await?,
        };

        info!("✅ Download completed: {}", path.display());
        Ok(path)
    }
}

/// Most recently modified finished file in `dir` written no earlier than `since`.
///
/// `since` is truncated to whole seconds to tolerate coarse file system
/// timestamps.
pub async fn newest_media_file(dir: &Path, since: SystemTime) -> AppResult<PathBuf> {
    let since = since
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| SystemTime::UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let partial = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PARTIAL_EXTENSIONS.contains(&ext));
        if partial {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < since {
            debug!("Ignoring stale scratch file {}", path.display());
            continue;
        }
        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(|| {
        AppError::Fetch(format!(
            "no downloaded file found in {}",
            dir.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ErrorKind;
    use crate::core::progress::{NullSink, ProgressReporter, RecordingSink};
    use std::sync::Arc;

    fn request(audio_only: bool) -> FetchRequest {
        FetchRequest {
            url: "https://www.youtube.com/watch?v=abc123".to_string(),
            format_selector: "bestaudio/best".to_string(),
            audio_only,
            scratch_dir: PathBuf::from("/install/temp"),
            transcoder_location: Some(PathBuf::from("/install/ffmpeg")),
        }
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(
            parse_line("[progress]1024/4096/NA"),
            FetcherLine::Progress(DownloadProgress {
                downloaded_bytes: 1024,
                total_bytes: Some(4096),
            })
        );
        assert_eq!(
            parse_line("[progress]1024/NA/8192.5"),
            FetcherLine::Progress(DownloadProgress {
                downloaded_bytes: 1024,
                total_bytes: Some(8192),
            })
        );
        assert_eq!(
            parse_line("[progress]1024/NA/NA"),
            FetcherLine::Progress(DownloadProgress {
                downloaded_bytes: 1024,
                total_bytes: None,
            })
        );
        assert_eq!(parse_line("[progress]NA/NA/NA"), FetcherLine::Other);
    }

    #[test]
    fn test_parse_path_lines() {
        assert_eq!(
            parse_line("[filepath]/install/temp/My Video.mp4"),
            FetcherLine::FinalPath(PathBuf::from("/install/temp/My Video.mp4"))
        );
        assert_eq!(
            parse_line("[download] Destination: /install/temp/a.f137.mp4"),
            FetcherLine::Destination(PathBuf::from("/install/temp/a.f137.mp4"))
        );
        assert_eq!(
            parse_line("[Merger] Merging formats into \"/install/temp/a.mp4\""),
            FetcherLine::Destination(PathBuf::from("/install/temp/a.mp4"))
        );
        assert_eq!(
            parse_line("[ExtractAudio] Destination: /install/temp/a.mp3"),
            FetcherLine::Destination(PathBuf::from("/install/temp/a.mp3"))
        );
        assert_eq!(
            parse_line("[download] /install/temp/a.mp4 has already been downloaded"),
            FetcherLine::Destination(PathBuf::from("/install/temp/a.mp4"))
        );
        assert_eq!(parse_line("[filepath]   "), FetcherLine::Other);
    }

    #[test]
    fn test_parse_error_and_noise() {
        assert_eq!(
            parse_line("ERROR: [youtube] abc123: Video unavailable"),
            FetcherLine::Error("[youtube] abc123: Video unavailable".to_string())
        );
        assert_eq!(parse_line("[youtube] abc123: Downloading webpage"), FetcherLine::Other);
        assert_eq!(parse_line(""), FetcherLine::Other);
    }

    #[test]
    fn test_video_args() {
        let mut req = request(false);
        req.format_selector = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]".to_string();
        let args = as_strings(fetch_args(&req, &[]));

        assert_eq!(args[0], "-f");
        assert_eq!(args[1], req.format_selector);
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--newline".to_string()));
        let output = args.iter().position(|a| a == "-o").unwrap();
        assert!(args[output + 1].ends_with("%(title)s.%(ext)s"));
        let location = args.iter().position(|a| a == "--ffmpeg-location").unwrap();
        assert_eq!(args[location + 1], "/install/ffmpeg");
        let encoding = args.iter().position(|a| a == "--encoding").unwrap();
        assert_eq!(args[encoding + 1], "utf-8");
        assert!(!args.contains(&"-x".to_string()));
        assert_eq!(args.last().unwrap(), &req.url);
    }

    #[test]
    fn test_audio_args_extract_mp3() {
        let args = as_strings(fetch_args(&request(true), &["--cookies".to_string(), "c.txt".to_string()]));
        let extract = args.iter().position(|a| a == "-x").unwrap();
        assert_eq!(
            &args[extract..extract + 5],
            ["-x", "--audio-format", "mp3", "--audio-quality", "192K"]
        );
        let url = args.len() - 1;
        assert_eq!(&args[url - 2..url], ["--cookies", "c.txt"]);
    }

    #[tokio::test]
    async fn test_newest_media_file_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4.part"), b"x").unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();

        let found = newest_media_file(dir.path(), SystemTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(found, dir.path().join("clip.mp4"));
    }

    #[tokio::test]
    async fn test_newest_media_file_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = newest_media_file(dir.path(), SystemTime::UNIX_EPOCH).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[tokio::test]
    async fn test_newest_media_file_ignores_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("previous.mp4");
        std::fs::write(&stale, b"x").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let since = SystemTime::now() - Duration::from_secs(60);
        let err = newest_media_file(dir.path(), since).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);

        std::fs::write(dir.path().join("current.mp4"), b"x").unwrap();
        let found = newest_media_file(dir.path(), since).await.unwrap();
        assert_eq!(found, dir.path().join("current.mp4"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_fetch_error() {
        let fetcher = YtDlpFetcher::new("/nonexistent/yt-dlp-binary");
        let reporter = ProgressReporter::new(Arc::new(NullSink));
        let err = fetcher.fetch(&request(false), &reporter).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_fetch_error() {
        let fetcher = YtDlpFetcher::new("false");
        let reporter = ProgressReporter::new(Arc::new(NullSink));
        let err = fetcher.fetch(&request(false), &reporter).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains("yt-dlp exited with"));
    }

    /// Shell script standing in for yt-dlp; it ignores its arguments
    #[cfg(unix)]
    fn scripted_fetcher(tools: &Path, body: &str) -> YtDlpFetcher {
        use std::os::unix::fs::PermissionsExt;

        let script = tools.join("yt-dlp");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlpFetcher::new(script)
    }

    #[cfg(unix)]
    fn scratch_request(scratch: &Path) -> FetchRequest {
        FetchRequest {
            scratch_dir: scratch.to_path_buf(),
            transcoder_location: None,
            ..request(false)
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_survives_non_utf8_output() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let clip = scratch.path().join("clip.mp4");
        let body = format!(
            r#"printf '[youtube] abc: Caf\351\n'
printf 'WARNING: Caf\351\n' >&2
i=0
while [ $i -lt 20000 ]; do
  i=$((i+1))
  echo "[progress]$i/20000/NA"
done
echo media > '{clip}'
echo '[filepath]{clip}'
exit 0"#,
            clip = clip.display()
        );
        let fetcher = scripted_fetcher(tools.path(), &body);
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone());

        let path = fetcher
            .fetch(&scratch_request(scratch.path()), &reporter)
            .await
            .unwrap();

        assert_eq!(path, clip);
        let values = sink.values();
        assert!(!values.is_empty());
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(values.iter().all(|v| *v < 100.0));
        assert!(reporter.last_emitted().unwrap() > 99.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_filepath_marker_wins_over_destination() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let stream = scratch.path().join("clip.f137.mp4");
        let merged = scratch.path().join("clip.mp4");
        let body = format!(
            r#"echo '[download] Destination: {stream}'
echo video > '{stream}'
echo '[progress]512/1024/NA'
echo '[progress]1024/1024/NA'
echo merged > '{merged}'
echo '[filepath]{merged}'"#,
            stream = stream.display(),
            merged = merged.display()
        );
        let fetcher = scripted_fetcher(tools.path(), &body);
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone());

        let path = fetcher
            .fetch(&scratch_request(scratch.path()), &reporter)
            .await
            .unwrap();

        assert_eq!(path, merged);
        assert_eq!(sink.values(), vec![50.0]);
        reporter.finish();
        assert_eq!(sink.values(), vec![50.0, 100.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_destination_used_without_filepath_marker() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let audio = scratch.path().join("clip.mp3");
        let body = format!(
            r#"echo '[ExtractAudio] Destination: {audio}'
echo audio > '{audio}'"#,
            audio = audio.display()
        );
        let fetcher = scripted_fetcher(tools.path(), &body);
        let reporter = ProgressReporter::new(Arc::new(NullSink));

        let path = fetcher
            .fetch(&scratch_request(scratch.path()), &reporter)
            .await
            .unwrap();

        assert_eq!(path, audio);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_newest_file_fallback_skips_earlier_downloads() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let stale = scratch.path().join("earlier.mp4");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let fresh = scratch.path().join("fresh.webm");
        let body = format!(
            r#"echo partial > '{dir}/fresh.webm.part'
echo media > '{fresh}'"#,
            dir = scratch.path().display(),
            fresh = fresh.display()
        );
        let fetcher = scripted_fetcher(tools.path(), &body);
        let reporter = ProgressReporter::new(Arc::new(NullSink));

        let path = fetcher
            .fetch(&scratch_request(scratch.path()), &reporter)
            .await
            .unwrap();

        assert_eq!(path, fresh);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_error_line_becomes_fetch_message() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let fetcher = scripted_fetcher(
            tools.path(),
            "echo 'ERROR: [youtube] abc123: Video unavailable' >&2\nexit 1",
        );
        let reporter = ProgressReporter::new(Arc::new(NullSink));

        let err = fetcher
            .fetch(&scratch_request(scratch.path()), &reporter)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains("Video unavailable"));
    }
}
