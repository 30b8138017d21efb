//! HTTP handlers for the tablet.

use crate::app::AppState;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use pangool_core::DivinationRequest;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TranscriptReply {
    pub status: &'static str,
    pub text: Option<String>,
}

impl TranscriptReply {
    fn from_text(text: Option<String>) -> Self {
        Self {
            status: if text.is_some() { "ok" } else { "error" },
            text,
        }
    }
}

/// Watchdog probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "pangool" }))
}

/// Stream a divination as SSE: `token`* then one `done` or `error`.
///
/// When the tablet goes away axum drops this stream, which tells the producer to stop.
pub async fn divine(
    State(state): State<AppState>,
    Json(request): Json<DivinationRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.divination.stream(request).map(|event| {
        Ok(Event::default()
            .event(event.name())
            .json_data(event.payload())
            .unwrap_or_else(|_| Event::default().event("error").data("{}")))
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// Synthesize and start playback on the room speaker. Returns once playback has started.
pub async fn speak(State(state): State<AppState>, Json(body): Json<SpeakRequest>) -> Json<StatusReply> {
    let artifact = match state.synthesis.synthesize(&body.text).await {
        Ok(artifact) => artifact,
        Err(e) => {
            warn!(target: "pangool::gateway", "Speak failed: {}", e);
            return Json(StatusReply {
                status: "error",
                message: "TTS synthesis failed",
            });
        }
    };

    match state.playback.play(artifact) {
        // Handle dropped: playback finishes and cleans up on its own
        Ok(_) => Json(StatusReply {
            status: "ok",
            message: "Audio playback started",
        }),
        Err(e) => {
            warn!(target: "pangool::gateway", "Playback failed to start: {}", e);
            Json(StatusReply {
                status: "error",
                message: "Audio playback failed",
            })
        }
    }
}

/// Transcribe the multipart `audio` field.
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<TranscriptReply>) {
    let mut audio = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("audio") => {
                match field.bytes().await {
                    Ok(bytes) => audio = Some(bytes),
                    Err(e) => warn!(target: "pangool::gateway", "Reading audio upload failed: {}", e),
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!(target: "pangool::gateway", "Malformed multipart upload: {}", e);
                break;
            }
        }
    }

    let Some(audio) = audio else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(TranscriptReply::from_text(None)),
        );
    };

    info!(target: "pangool::gateway", bytes = audio.len(), "Transcription requested");
    let text = state.transcription.transcribe(&audio).await;
    (StatusCode::OK, Json(TranscriptReply::from_text(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use pangool_core::{
        ChatChunk, ChatRequest, ChunkStream, CoreError, CoreResult, DivinationService,
        InferenceBackend, InferenceConfig, PlaybackConfig,
    };
    use pangool_voice::{
        PlaybackManager, SpeechEngine, SynthesisChain, SynthesisStrategy, TranscriptionGateway,
        VoiceError, VoiceResult,
    };
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct CannedBackend {
        chunks: Vec<&'static str>,
        refuse: bool,
    }

    #[async_trait::async_trait]
    impl InferenceBackend for CannedBackend {
        async fn open_stream(&self, _request: &ChatRequest) -> CoreResult<ChunkStream> {
            if self.refuse {
                return Err(CoreError::Connection("connection refused".to_string()));
            }
            let chunks = self.chunks.clone();
            Ok(Box::pin(async_stream::stream! {
                for c in chunks {
                    yield Ok(ChatChunk { content: c.to_string(), done: false });
                }
                yield Ok(ChatChunk { content: String::new(), done: true });
            }))
        }
    }

    /// Writes the text straight into the target file.
    struct EchoSynth;

    #[async_trait::async_trait]
    impl SynthesisStrategy for EchoSynth {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn render(&self, text: &str, target: &Path) -> VoiceResult<()> {
            std::fs::write(target, text)?;
            Ok(())
        }
    }

    struct FixedEngine(&'static str);

    impl SpeechEngine for FixedEngine {
        fn transcribe(&self, _samples: &[f32]) -> VoiceResult<Vec<String>> {
            Ok(vec![self.0.to_string()])
        }
    }

    struct Fixture {
        backend: CannedBackend,
        strategies: Vec<Box<dyn SynthesisStrategy>>,
        artifact_dir: PathBuf,
        player: String,
        engine: Option<&'static str>,
        frontend: PathBuf,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                backend: CannedBackend {
                    chunks: vec!["The ", "stars ", "<end_of_turn>"],
                    refuse: false,
                },
                strategies: Vec::new(),
                artifact_dir: std::env::temp_dir(),
                player: "true".to_string(),
                engine: None,
                frontend: PathBuf::from("/nonexistent/pangool-frontend"),
            }
        }
    }

    impl Fixture {
        fn app(self) -> Router {
            let transcription = match self.engine {
                Some(reply) => TranscriptionGateway::with_loader(
                    pangool_core::TranscriptionConfig {
                        vad_filter: false,
                        ..Default::default()
                    },
                    move || Ok(Arc::new(FixedEngine(reply)) as Arc<dyn SpeechEngine>),
                ),
                None => TranscriptionGateway::with_loader(Default::default(), || {
                    Err(VoiceError::Config("no model".to_string()))
                }),
            };
            let state = AppState {
                divination: DivinationService::new(Arc::new(self.backend), InferenceConfig::default()),
                synthesis: Arc::new(SynthesisChain::new(self.artifact_dir, self.strategies)),
                playback: PlaybackManager::new(&PlaybackConfig {
                    player_bin: self.player,
                }),
                transcription: Arc::new(transcription),
            };
            build_app(state, &self.frontend)
        }
    }

    async fn body_string(res: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_post(field: &str, payload: &[u8]) -> Request<Body> {
        let boundary = "pangoolboundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"rec.wav\"\r\nContent-Type: audio/wav\r\n\r\n",
                b = boundary,
                f = field
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/transcribe")
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    fn short_wav() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..1600 {
                writer.write_sample(((i % 40) * 200) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn health_reports_service() {
        let res = Fixture::default()
            .app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok", "service": "pangool" }));
    }

    #[tokio::test]
    async fn divine_streams_tokens_then_done() {
        let res = Fixture::default()
            .app()
            .oneshot(json_post("/api/divine", serde_json::json!({ "theme": "love" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let body = body_string(res).await;
        assert!(body.contains("event: token\ndata: {\"token\":\"The \"}"), "{}", body);
        assert!(body.contains("event: done\ndata: {\"full_text\":\"The stars \"}"), "{}", body);
        assert!(!body.contains("end_of_turn"));
        assert!(!body.contains("event: error"));
    }

    #[tokio::test]
    async fn divine_reports_backend_failure_as_error_event() {
        let fixture = Fixture {
            backend: CannedBackend {
                chunks: Vec::new(),
                refuse: true,
            },
            ..Default::default()
        };
        let res = fixture
            .app()
            .oneshot(json_post(
                "/api/divine",
                serde_json::json!({ "theme": "work", "question": "Should I stay?" }),
            ))
            .await
            .unwrap();
        let body = body_string(res).await;
        assert!(body.contains("event: error"), "{}", body);
        assert!(body.contains("connection refused"));
        assert!(!body.contains("event: done"));
    }

    #[tokio::test]
    async fn divine_without_theme_is_rejected() {
        let res = Fixture::default()
            .app()
            .oneshot(json_post("/api/divine", serde_json::json!({ "question": "hm" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn speak_reports_synthesis_failure() {
        let res = Fixture::default()
            .app()
            .oneshot(json_post("/api/speak", serde_json::json!({ "text": "hello" })))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "TTS synthesis failed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn speak_starts_playback_and_cleans_up() {
        let out = tempfile::tempdir().unwrap();
        let fixture = Fixture {
            strategies: vec![Box::new(EchoSynth)],
            artifact_dir: out.path().to_path_buf(),
            ..Default::default()
        };
        let res = fixture
            .app()
            .oneshot(json_post("/api/speak", serde_json::json!({ "text": "Go gently." })))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["message"], "Audio playback started");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::fs::read_dir(out.path()).unwrap().next().is_some()
            && std::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn speak_reports_missing_player() {
        let out = tempfile::tempdir().unwrap();
        let fixture = Fixture {
            strategies: vec![Box::new(EchoSynth)],
            artifact_dir: out.path().to_path_buf(),
            player: "/nonexistent/afplay".to_string(),
            ..Default::default()
        };
        let res = fixture
            .app()
            .oneshot(json_post("/api/speak", serde_json::json!({ "text": "Go gently." })))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json["status"], "error");
        assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn transcribe_without_engine_is_error() {
        let res = Fixture::default()
            .app()
            .oneshot(multipart_post("audio", &short_wav()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "error", "text": null }));
    }

    #[tokio::test]
    async fn transcribe_returns_recognized_text() {
        let fixture = Fixture {
            engine: Some(" Will the rain stop? "),
            ..Default::default()
        };
        let res = fixture
            .app()
            .oneshot(multipart_post("audio", &short_wav()))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok", "text": "Will the rain stop?" }));
    }

    #[tokio::test]
    async fn transcribe_without_audio_field_is_rejected() {
        let res = Fixture::default()
            .app()
            .oneshot(multipart_post("recording", &short_wav()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn frontend_is_served_when_built() {
        let dist = tempfile::tempdir().unwrap();
        std::fs::write(dist.path().join("index.html"), "<html>oracle</html>").unwrap();
        std::fs::create_dir(dist.path().join("assets")).unwrap();
        std::fs::write(dist.path().join("assets").join("app.js"), "console.log('pangool')").unwrap();

        let fixture = Fixture {
            frontend: dist.path().to_path_buf(),
            ..Default::default()
        };
        let app = fixture.app();

        let res = app
            .clone()
            .oneshot(Request::get("/assets/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(res).await, "console.log('pangool')");

        let res = app
            .clone()
            .oneshot(Request::get("/oracle/love").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "<html>oracle</html>");

        let res = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_string(res).await.contains("pangool"));
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/divine")
            .header("origin", "http://tablet.local:5173")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let res = Fixture::default().app().oneshot(req).await.unwrap();
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
    }
}
