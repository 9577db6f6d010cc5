use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

pub const ALLOWED_MIME_TYPES: [&str; 4] =
    ["video/mp4", "video/quicktime", "video/webm", "video/x-msvideo"];
pub const ALLOWED_FORMATS_LABEL: &str = "MP4, MOV, WebM, AVI";
pub const MAX_SIZE_MB: u64 = 50;
pub const MAX_SIZE_BYTES: u64 = MAX_SIZE_MB * 1024 * 1024;
pub const MAX_DURATION_SECONDS: f64 = 30.0;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadRejection {
    #[error("Unsupported video format: {mime}. Use {}.", ALLOWED_FORMATS_LABEL)]
    UnsupportedFormat { mime: String },

    #[error("Video too large: {size_mb:.1}MB. Maximum is {}MB.", MAX_SIZE_MB)]
    TooLarge { size_mb: f64 },

    #[error("Video too long: {}s. Maximum is {}s.", .seconds.round(), MAX_DURATION_SECONDS)]
    TooLong { seconds: f64 },

    #[error("Could not open {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Could not read video metadata: {0}")]
    ProbeFailed(String),
}

/// A video that passed every client-side check and may be sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedVideo {
    pub path: PathBuf,
    pub file_name: String,
    pub mime: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub preview_url: Url,
}

#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64>;
}

#[derive(Debug, Clone, Default)]
pub struct FfprobeDurationProbe {
    binary: Option<PathBuf>,
}

impl FfprobeDurationProbe {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    fn resolve_binary(&self) -> Result<PathBuf> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => which::which("ffprobe").context("ffprobe not found on PATH"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        let binary = self.resolve_binary()?;
        let output = Command::new(&binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to run {}", binary.display()))?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let probe: FfprobeOutput =
            serde_json::from_slice(&output.stdout).context("failed to parse ffprobe output")?;
        probe
            .format
            .duration
            .as_deref()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .ok_or_else(|| anyhow!("ffprobe reported no duration for {}", path.display()))
    }
}

pub fn detect_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

pub fn check_format_and_size(mime: &str, size_bytes: u64) -> Result<(), UploadRejection> {
    if !ALLOWED_MIME_TYPES.contains(&mime) {
        return Err(UploadRejection::UnsupportedFormat { mime: mime.to_string() });
    }
    if size_bytes > MAX_SIZE_BYTES {
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        return Err(UploadRejection::TooLarge { size_mb });
    }
    Ok(())
}

pub fn check_duration(seconds: f64) -> Result<(), UploadRejection> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(UploadRejection::ProbeFailed(format!("invalid duration {seconds}")));
    }
    if seconds > MAX_DURATION_SECONDS {
        return Err(UploadRejection::TooLong { seconds });
    }
    Ok(())
}

/// Runs the checks in order (type, size, probed duration) and stops at the
/// first failure, so the probe only runs for files that passed the cheap checks.
pub async fn validate_upload(
    path: &Path,
    probe: &dyn DurationProbe,
) -> Result<SelectedVideo, UploadRejection> {
    let unreadable =
        |reason: String| UploadRejection::Unreadable { path: path.to_path_buf(), reason };

    let metadata = tokio::fs::metadata(path).await.map_err(|err| unreadable(err.to_string()))?;
    if !metadata.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }

    let mime = detect_mime(path);
    check_format_and_size(&mime, metadata.len())?;

    let duration_seconds = probe
        .duration_seconds(path)
        .await
        .map_err(|err| UploadRejection::ProbeFailed(format!("{err:#}")))?;
    check_duration(duration_seconds)?;

    let canonical =
        tokio::fs::canonicalize(path).await.map_err(|err| unreadable(err.to_string()))?;
    let preview_url = Url::from_file_path(&canonical)
        .map_err(|_| unreadable("path cannot be expressed as a file URL".to_string()))?;
    let file_name = canonical
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "video.mp4".to_string());

    debug!(%mime, size = metadata.len(), duration_seconds, "upload passed validation");

    Ok(SelectedVideo {
        path: canonical,
        file_name,
        mime,
        size_bytes: metadata.len(),
        duration_seconds,
        preview_url,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{Builder, NamedTempFile};

    pub(crate) struct FixedProbe {
        pub seconds: f64,
        pub calls: AtomicUsize,
    }

    impl FixedProbe {
        pub(crate) fn new(seconds: f64) -> Self {
            Self { seconds, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration_seconds(&self, _path: &Path) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.seconds)
        }
    }

    struct BrokenProbe;

    #[async_trait]
    impl DurationProbe for BrokenProbe {
        async fn duration_seconds(&self, _path: &Path) -> Result<f64> {
            Err(anyhow!("moov atom not found"))
        }
    }

    pub(crate) fn video_fixture(suffix: &str, size_bytes: u64) -> NamedTempFile {
        let file = Builder::new().prefix("clip").suffix(suffix).tempfile().unwrap();
        file.as_file().set_len(size_bytes).unwrap();
        file
    }

    #[test]
    fn detects_mime_from_extension() {
        assert_eq!(detect_mime(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(detect_mime(Path::new("clip.MOV")), "video/quicktime");
        assert_eq!(detect_mime(Path::new("clip.webm")), "video/webm");
        assert_eq!(detect_mime(Path::new("clip.avi")), "video/x-msvideo");
        assert_eq!(detect_mime(Path::new("clip")), FALLBACK_MIME);
    }

    #[test]
    fn unsupported_format_names_allowed_set() {
        let err = check_format_and_size("image/gif", 1024).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("image/gif"));
        assert!(message.contains(ALLOWED_FORMATS_LABEL));
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        assert!(check_format_and_size("video/mp4", MAX_SIZE_BYTES).is_ok());
        let err = check_format_and_size("video/mp4", MAX_SIZE_BYTES + 1).unwrap_err();
        assert!(err.to_string().contains("Maximum is 50MB"));
    }

    #[test]
    fn duration_message_rounds_measured_seconds() {
        assert!(check_duration(30.0).is_ok());
        let err = check_duration(30.6).unwrap_err();
        assert_eq!(err.to_string(), "Video too long: 31s. Maximum is 30s.");
    }

    #[test]
    fn unmeasurable_duration_is_rejected() {
        for seconds in [f64::NAN, f64::INFINITY, -1.0] {
            let err = check_duration(seconds).unwrap_err();
            assert!(matches!(err, UploadRejection::ProbeFailed(_)), "{seconds} passed");
        }
    }

    #[tokio::test]
    async fn nan_probe_result_does_not_pass_validation() {
        let fixture = video_fixture(".mp4", 4096);
        let probe = FixedProbe::new(f64::NAN);

        let err = validate_upload(fixture.path(), &probe).await.unwrap_err();
        assert!(err.to_string().starts_with("Could not read video metadata"));
    }

    #[tokio::test]
    async fn accepts_short_small_mp4() {
        let fixture = video_fixture(".mp4", 10 * 1024 * 1024);
        let probe = FixedProbe::new(12.0);

        let video = validate_upload(fixture.path(), &probe).await.unwrap();
        assert_eq!(video.mime, "video/mp4");
        assert_eq!(video.size_bytes, 10 * 1024 * 1024);
        assert_eq!(video.duration_seconds, 12.0);
        assert_eq!(video.preview_url.scheme(), "file");
        assert!(video.file_name.ends_with(".mp4"));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_format_before_probing() {
        let fixture = video_fixture(".gif", 1024);
        let probe = FixedProbe::new(5.0);

        let err = validate_upload(fixture.path(), &probe).await.unwrap_err();
        assert!(matches!(err, UploadRejection::UnsupportedFormat { .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_oversized_before_probing() {
        let fixture = video_fixture(".webm", MAX_SIZE_BYTES + 1);
        let probe = FixedProbe::new(5.0);

        let err = validate_upload(fixture.path(), &probe).await.unwrap_err();
        assert!(matches!(err, UploadRejection::TooLarge { .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_long_video_even_when_type_and_size_pass() {
        let fixture = video_fixture(".mov", 2048);
        let probe = FixedProbe::new(45.2);

        let err = validate_upload(fixture.path(), &probe).await.unwrap_err();
        assert_eq!(err, UploadRejection::TooLong { seconds: 45.2 });
        assert!(err.to_string().contains("45s"));
    }

    #[tokio::test]
    async fn probe_failure_is_a_rejection() {
        let fixture = video_fixture(".mp4", 2048);
        let err = validate_upload(fixture.path(), &BrokenProbe).await.unwrap_err();
        assert!(err.to_string().contains("moov atom not found"));
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let probe = FixedProbe::new(5.0);
        let err = validate_upload(Path::new("/definitely/not/here.mp4"), &probe).await.unwrap_err();
        assert!(matches!(err, UploadRejection::Unreadable { .. }));
    }
}
