use crate::routes;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use pangool_core::{CoreResult, DivinationService, OllamaBackend, PangoolConfig};
use pangool_voice::{PlaybackManager, SynthesisChain, TranscriptionGateway};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Tablet recordings are short, but well beyond axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub divination: DivinationService,
    pub synthesis: Arc<SynthesisChain>,
    pub playback: PlaybackManager,
    pub transcription: Arc<TranscriptionGateway>,
}

impl AppState {
    pub fn from_config(config: &PangoolConfig) -> CoreResult<Self> {
        let backend = OllamaBackend::new(&config.inference)?;
        Ok(Self {
            divination: DivinationService::new(Arc::new(backend), config.inference.clone()),
            synthesis: Arc::new(SynthesisChain::from_config(&config.synthesis)),
            playback: PlaybackManager::new(&config.playback),
            transcription: Arc::new(TranscriptionGateway::new(config.transcription.clone())),
        })
    }
}

pub fn build_app(state: AppState, frontend_dist: &Path) -> Router {
    // Tablet dev server runs on its own origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/divine", post(routes::divine))
        .route("/api/speak", post(routes::speak))
        .route(
            "/api/transcribe",
            post(routes::transcribe).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state);

    if frontend_dist.is_dir() {
        let assets_dir = frontend_dist.join("assets");
        if assets_dir.is_dir() {
            app = app.nest_service("/assets", ServeDir::new(assets_dir));
        }
        // Single-page app: every other GET gets index.html
        app = app.fallback_service(ServeFile::new(frontend_dist.join("index.html")));
        tracing::info!(
            target: "pangool::gateway",
            dir = %frontend_dist.display(),
            "Serving tablet frontend"
        );
    }

    app.layer(cors)
}
