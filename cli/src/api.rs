use crate::{
    identity::Identity,
    types::{
        AudioFormat, CreditBalance, GenerateVariationsRequest, GenerateVariationsResponse,
        MergedExport, MixMode, MusicVariation, VideoAnalysis, VideoSegment,
    },
    upload::SelectedVideo,
};
use anyhow::Context;
use reqwest::{multipart, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Analyze,
    Generate,
    Merge,
    Download,
}

impl Operation {
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Self::Analyze => "Analysis failed",
            Self::Generate => "Generation failed",
            Self::Merge => "Merge failed",
            Self::Download => "Download failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", .detail.as_deref().unwrap_or(.operation.fallback_message()))]
    Rejected { operation: Operation, status: u16, detail: Option<String> },

    #[error("{}: {source}", .operation.fallback_message())]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("{}: unexpected response ({source})", .operation.fallback_message())]
    Decode {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("{}: invalid endpoint {path} ({reason})", .operation.fallback_message())]
    InvalidEndpoint { operation: Operation, path: String, reason: String },

    #[error("{}: {} ({source})", .operation.fallback_message(), .path.display())]
    Io {
        operation: Operation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Rejected { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. }
            | Self::InvalidEndpoint { operation, .. }
            | Self::Io { operation, .. } => *operation,
        }
    }
}

/// FastAPI reports either `{"detail": "..."}` or a list of validation errors.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Value,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        match self.detail {
            Value::String(message) if !message.trim().is_empty() => Some(message),
            Value::Array(items) => {
                let messages = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect::<Vec<_>>();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => None,
        }
    }
}

/// Direct download locations for one generated track, built from its file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLinks {
    pub file_id: String,
    pub mp3: Url,
    pub wav: Url,
}

impl TrackLinks {
    pub fn url(&self, format: AudioFormat) -> &Url {
        match format {
            AudioFormat::Mp3 => &self.mp3,
            AudioFormat::Wav => &self.wav,
        }
    }
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

impl Client {
    pub fn new(base_url: Option<&str>) -> anyhow::Result<Self> {
        let url = base_url
            .map(Url::parse)
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL))
            .context("invalid backend base URL")?;
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url: url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base_url.join(path).with_context(|| format!("failed to build URL for {path}"))
    }

    pub async fn health(&self) -> anyhow::Result<Value> {
        let url = self.endpoint("health")?;
        let response = self.http.get(url).send().await.context("backend health request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("backend responded with status {}", response.status());
        }
        response.json().await.context("failed to decode health payload")
    }

    pub async fn analyze_video(
        &self,
        video: &SelectedVideo,
        identity: &Identity,
    ) -> Result<VideoAnalysis, ApiError> {
        let operation = Operation::Analyze;
        let part = video_part(video, operation).await?;
        let form = multipart::Form::new().part("file", part);
        let request = self
            .post(operation, "api/video/analyze")?
            .header(USER_ID_HEADER, identity.as_str())
            .multipart(form);
        send_json(request, operation).await
    }

    pub async fn generate_variations(
        &self,
        request: &GenerateVariationsRequest,
        identity: &Identity,
    ) -> Result<Vec<MusicVariation>, ApiError> {
        let operation = Operation::Generate;
        let builder = self
            .post(operation, "api/music/generate-variations")?
            .header(USER_ID_HEADER, identity.as_str())
            .json(request);
        let body: GenerateVariationsResponse = send_json(builder, operation).await?;
        Ok(body.variations)
    }

    pub async fn merge_video_audio(
        &self,
        video: &SelectedVideo,
        file_id: &str,
        mix_mode: MixMode,
        segments: &[VideoSegment],
        identity: &Identity,
    ) -> Result<MergedExport, ApiError> {
        let operation = Operation::Merge;
        let segments_json =
            serde_json::to_string(segments).unwrap_or_else(|_| "[]".to_string());
        let form = multipart::Form::new()
            .part("video", video_part(video, operation).await?)
            .text("file_id", file_id.to_string())
            .text("mix_mode", mix_mode.as_str())
            .text("segments_json", segments_json);
        let request = self
            .post(operation, "api/music/merge")?
            .header(USER_ID_HEADER, identity.as_str())
            .multipart(form);
        send_json(request, operation).await
    }

    /// Never fails: the balance is informational, so any error reads as zero.
    pub async fn get_credits(&self, identity: &Identity) -> i64 {
        let request = match self.endpoint("api/credits/balance") {
            Ok(url) => self.http.get(url).header(USER_ID_HEADER, identity.as_str()),
            Err(err) => {
                warn!("credits balance unavailable: {err:#}");
                return 0;
            }
        };
        read_credits(request, "balance").await
    }

    pub async fn initialize_credits(&self, identity: &Identity) -> i64 {
        let request = match self.endpoint("api/credits/initialize") {
            Ok(url) => self.http.post(url).header(USER_ID_HEADER, identity.as_str()),
            Err(err) => {
                warn!("credits initialization unavailable: {err:#}");
                return 0;
            }
        };
        read_credits(request, "initialize").await
    }

    pub fn track_links(&self, file_id: &str) -> anyhow::Result<TrackLinks> {
        let mp3 = self.endpoint(&format!("api/music/download/{file_id}/mp3"))?;
        let wav = self.endpoint(&format!("api/music/download/{file_id}/wav"))?;
        Ok(TrackLinks { file_id: file_id.to_string(), mp3, wav })
    }

    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64, ApiError> {
        let operation = Operation::Download;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;
        let response = ensure_success(response, operation).await?;
        let bytes =
            response.bytes().await.map_err(|source| ApiError::Transport { operation, source })?;

        let io_error =
            |source| ApiError::Io { operation, path: destination.to_path_buf(), source };
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(destination, &bytes).await.map_err(io_error)?;
        debug!(url, path = %destination.display(), bytes = bytes.len(), "download complete");
        Ok(bytes.len() as u64)
    }

    fn post(&self, operation: Operation, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.base_url.join(path).map_err(|err| ApiError::InvalidEndpoint {
            operation,
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        Ok(self.http.post(url))
    }
}

async fn video_part(
    video: &SelectedVideo,
    operation: Operation,
) -> Result<multipart::Part, ApiError> {
    let bytes = tokio::fs::read(&video.path)
        .await
        .map_err(|source| ApiError::Io { operation, path: video.path.clone(), source })?;
    multipart::Part::bytes(bytes)
        .file_name(video.file_name.clone())
        .mime_str(&video.mime)
        .map_err(|source| ApiError::Transport { operation, source })
}

async fn ensure_success(response: Response, operation: Operation) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.json::<ErrorBody>().await.ok().and_then(ErrorBody::into_message);
    Err(ApiError::Rejected { operation, status: status.as_u16(), detail })
}

async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    operation: Operation,
) -> Result<T, ApiError> {
    let response =
        request.send().await.map_err(|source| ApiError::Transport { operation, source })?;
    let response = ensure_success(response, operation).await?;
    response.json::<T>().await.map_err(|source| ApiError::Decode { operation, source })
}

async fn read_credits(request: RequestBuilder, label: &str) -> i64 {
    let response = match request.send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!("credits {label} responded with status {}", response.status());
            return 0;
        }
        Err(err) => {
            warn!("credits {label} request failed: {err}");
            return 0;
        }
    };
    match response.json::<CreditBalance>().await {
        Ok(balance) => balance.credits,
        Err(err) => {
            warn!("credits {label} payload unreadable: {err}");
            0
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upload::tests::video_fixture;
    use serde_json::json;
    use tempfile::NamedTempFile;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    pub(crate) fn analysis_body() -> Value {
        json!({
            "bpm": 128,
            "key": "C minor",
            "overall_mood": "euphoric",
            "energy_arc": "slow build → peak at 0:08 → fade",
            "audio_profile": {
                "has_speech": false,
                "has_ambient_sound": true,
                "is_silent": false,
                "recommended_mix": "balanced",
                "mix_reasoning": "crowd noise"
            },
            "segments": [
                {
                    "start_seconds": 0.0,
                    "end_seconds": 6.0,
                    "energy": "building",
                    "mood": "anticipation",
                    "visual_description": "crowd gathers",
                    "musical_suggestion": "rising synth arps"
                },
                {
                    "start_seconds": 6.0,
                    "end_seconds": 12.0,
                    "energy": "peak",
                    "mood": "release",
                    "visual_description": "confetti drop",
                    "musical_suggestion": "full drums"
                }
            ],
            "style_suggestions": [
                { "label": "Jazz Lounge", "modifier": "smoky brushed drums" },
                { "label": "Ambient Drift", "modifier": "washed pads" }
            ],
            "primary_prompt": "euphoric festival house building to a drop",
            "negative_prompt": "vocals",
            "reasoning": "fast cuts and a clear climax"
        })
    }

    pub(crate) fn variations_body() -> Value {
        json!({
            "variations": [
                { "file_id": "a1", "audio_url": "http://x/api/music/download/a1/mp3", "style_label": "Original", "duration_seconds": 30.0 },
                { "file_id": "b2", "audio_url": "http://x/api/music/download/b2/mp3", "style_label": "Jazz Lounge", "duration_seconds": 30.0 },
                { "file_id": "c3", "audio_url": "http://x/api/music/download/c3/mp3", "style_label": "Ambient Drift", "duration_seconds": 30.0 }
            ]
        })
    }

    pub(crate) async fn selected_fixture() -> (NamedTempFile, SelectedVideo) {
        let fixture = video_fixture(".mp4", 4096);
        let probe = crate::upload::tests::FixedProbe::new(12.0);
        let video = crate::upload::validate_upload(fixture.path(), &probe).await.unwrap();
        (fixture, video)
    }

    fn identity() -> Identity {
        Identity::resolve(Some("user-1"))
    }

    #[tokio::test]
    async fn analyze_sends_identity_and_decodes_analysis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/video/analyze"))
            .and(header(USER_ID_HEADER, "user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let (_fixture, video) = selected_fixture().await;
        let analysis = client.analyze_video(&video, &identity()).await.unwrap();

        assert_eq!(analysis.bpm, 128);
        assert_eq!(analysis.segments.len(), 2);
        assert_eq!(analysis.style_suggestions[0].label, "Jazz Lounge");
    }

    #[tokio::test]
    async fn rejected_call_surfaces_server_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/music/generate-variations"))
            .respond_with(ResponseTemplate::new(402).set_body_json(
                json!({ "detail": "No credits remaining. Purchase more to continue." }),
            ))
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let request = GenerateVariationsRequest {
            prompt: "warm synthwave".into(),
            negative_prompt: String::new(),
            mood: "nostalgic".into(),
            bpm: 100,
            style_suggestions: Vec::new(),
        };
        let err = client.generate_variations(&request, &identity()).await.unwrap_err();

        assert!(matches!(err, ApiError::Rejected { status: 402, .. }));
        assert_eq!(err.to_string(), "No credits remaining. Purchase more to continue.");
    }

    #[tokio::test]
    async fn unparsable_error_body_falls_back_to_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/video/analyze"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let (_fixture, video) = selected_fixture().await;
        let err = client.analyze_video(&video, &identity()).await.unwrap_err();

        assert_eq!(err.operation(), Operation::Analyze);
        assert_eq!(err.to_string(), "Analysis failed");
    }

    #[tokio::test]
    async fn validation_error_lists_are_joined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/music/generate-variations"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [
                    { "loc": ["body", "prompt"], "msg": "String should have at least 5 characters" },
                    { "loc": ["body", "bpm"], "msg": "Input should be less than or equal to 220" }
                ]
            })))
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let request = GenerateVariationsRequest {
            prompt: "hi".into(),
            negative_prompt: String::new(),
            mood: String::new(),
            bpm: 300,
            style_suggestions: Vec::new(),
        };
        let err = client.generate_variations(&request, &identity()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "String should have at least 5 characters; Input should be less than or equal to 220"
        );
    }

    #[tokio::test]
    async fn generate_posts_composition_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/music/generate-variations"))
            .and(header(USER_ID_HEADER, "user-1"))
            .and(body_partial_json(json!({
                "prompt": "warm synthwave",
                "bpm": 140,
                "mood": "nostalgic",
                "style_suggestions": [{ "label": "Jazz Lounge", "modifier": "brushes" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(variations_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let request = GenerateVariationsRequest {
            prompt: "warm synthwave".into(),
            negative_prompt: "vocals".into(),
            mood: "nostalgic".into(),
            bpm: 140,
            style_suggestions: vec![crate::types::StyleSuggestion {
                label: "Jazz Lounge".into(),
                modifier: "brushes".into(),
            }],
        };
        let variations = client.generate_variations(&request, &identity()).await.unwrap();
        assert_eq!(variations.len(), 3);
        assert_eq!(variations[1].file_id, "b2");
    }

    #[tokio::test]
    async fn merge_uploads_video_and_returns_export() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/music/merge"))
            .and(header(USER_ID_HEADER, "user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "video_url": "http://x/api/music/download-merged/m9",
                "duration_seconds": 12.0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let (_fixture, video) = selected_fixture().await;
        let export = client
            .merge_video_audio(&video, "b2", MixMode::Social, &[], &identity())
            .await
            .unwrap();
        assert_eq!(export.video_url, "http://x/api/music/download-merged/m9");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(body.contains("name=\"file_id\""));
        assert!(body.contains("b2"));
        assert!(body.contains("name=\"mix_mode\""));
        assert!(body.contains("social"));
        assert!(body.contains("name=\"segments_json\""));
    }

    #[tokio::test]
    async fn credits_degrade_to_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/credits/balance"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "nope" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/credits/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        assert_eq!(client.get_credits(&identity()).await, 0);
        assert_eq!(client.initialize_credits(&identity()).await, 0);
    }

    #[tokio::test]
    async fn credits_balance_reads_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/credits/balance"))
            .and(header(USER_ID_HEADER, "user-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "credits": 3, "user_id": "user-1" })),
            )
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        assert_eq!(client.get_credits(&identity()).await, 3);
    }

    #[test]
    fn track_links_are_built_from_file_id() {
        let client = Client::new(Some("http://api.example.com/")).unwrap();
        let links = client.track_links("abc123").unwrap();
        assert_eq!(
            links.url(AudioFormat::Mp3).as_str(),
            "http://api.example.com/api/music/download/abc123/mp3"
        );
        assert_eq!(
            links.url(AudioFormat::Wav).as_str(),
            "http://api.example.com/api/music/download/abc123/wav"
        );
    }

    #[tokio::test]
    async fn unjoinable_base_url_is_a_local_error() {
        let client = Client::new(Some("mailto:ops@vibesync.example")).unwrap();
        let request = GenerateVariationsRequest {
            prompt: "warm synthwave".into(),
            negative_prompt: String::new(),
            mood: "nostalgic".into(),
            bpm: 100,
            style_suggestions: Vec::new(),
        };
        let err = client.generate_variations(&request, &identity()).await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidEndpoint { operation: Operation::Generate, .. }));
        assert!(err.to_string().starts_with("Generation failed: invalid endpoint"));
    }

    #[tokio::test]
    async fn download_writes_body_to_destination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/music/download/a1/mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
            .mount(&server)
            .await;

        let client = Client::new(Some(server.uri().as_str())).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested").join("a1.mp3");
        let url = client.track_links("a1").unwrap().mp3;

        let written = client.download(url.as_str(), &destination).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&destination).unwrap(), vec![1u8, 2, 3, 4]);
    }
}
