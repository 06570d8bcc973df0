use crate::{Annotator, FailureKind, Layers, LookupResult, Match, Strategy};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;
const MAX_SENTENCE_BYTES: usize = 16 * 1024;
const MAX_CACHE_KEY_BYTES: usize = 128;

pub struct AppState {
    annotator: Annotator,
    lookups: Option<Mutex<LruCache<String, LookupResult>>>,
}

impl AppState {
    pub fn new(annotator: Annotator, cache_size: usize) -> Self {
        Self {
            annotator,
            lookups: NonZeroUsize::new(cache_size).map(|size| Mutex::new(LruCache::new(size))),
        }
    }

    fn lookup(&self, word: &str) -> LookupResult {
        let Some(cache) = &self.lookups else {
            return self.annotator.lookup(word);
        };
        let key = word.trim();
        if key.is_empty() || key.len() > MAX_CACHE_KEY_BYTES {
            return self.annotator.lookup(word);
        }
        if let Some(hit) = cache.lock().get(key) {
            return hit.clone();
        }
        let result = self.annotator.lookup(key);
        // Unavailable results are never cached.
        let cacheable = result
            .failure()
            .is_none_or(|failure| failure.kind != FailureKind::DataSourceUnavailable);
        if cacheable {
            cache.lock().put(key.to_string(), result.clone());
        }
        result
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    /// Origins allowed by CORS; empty means any origin.
    pub allowed_origins: Vec<String>,
    pub cache_size: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            allowed_origins: Vec::new(),
            cache_size: 1024,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig, annotator: Annotator) -> Result<(), WebError> {
    let state = Arc::new(AppState::new(annotator, config.cache_size));
    let router = build_router(state, &config.allowed_origins);
    info!(
        %config.addr,
        origins = ?config.allowed_origins,
        cache = config.cache_size,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn payload_too_large(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/lookup", post(lookup))
        .route("/detect", post(detect))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "cdsf-gloss-web",
        "min_fuzzy_len": state.annotator.config().min_fuzzy_len,
        "max_edit_distance": state.annotator.config().max_edit_distance,
    }))
}

async fn lookup(
    State(state): State<SharedState>,
    Json(request): Json<LookupRequest>,
) -> Json<LookupPayload> {
    Json(LookupPayload::from_result(&state.lookup(&request.word)))
}

async fn detect(
    State(state): State<SharedState>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<DetectPayload>, ApiError> {
    if request.sentence.len() > MAX_SENTENCE_BYTES {
        return Err(ApiError::payload_too_large(format!(
            "Sentence exceeds {MAX_SENTENCE_BYTES} bytes"
        )));
    }
    let detection = state.annotator.detect(&request.sentence);
    Ok(Json(DetectPayload {
        sentence: request.sentence,
        matches: detection.matches().iter().map(MatchPayload::from_match).collect(),
    }))
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    #[serde(default)]
    word: String,
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    #[serde(default)]
    sentence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LookupPayload {
    found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matched_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    similarity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Layers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl LookupPayload {
    fn from_result(result: &LookupResult) -> Self {
        match result {
            LookupResult::Found(resolution) => Self {
                found: true,
                matched_word: Some(resolution.matched_word().to_string()),
                strategy: Some(resolution.strategy()),
                similarity: Some(resolution.similarity()),
                data: Some(resolution.data().clone()),
                reason: None,
                message: None,
            },
            LookupResult::Missing(failure) => Self {
                found: false,
                matched_word: None,
                strategy: None,
                similarity: None,
                data: None,
                reason: Some(failure.kind),
                message: Some(failure.message.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatchPayload {
    /// Surface form from the sentence; the field name the browser client reads.
    word: String,
    matched_word: String,
    strategy: Strategy,
    similarity: u8,
    data: Layers,
}

impl MatchPayload {
    fn from_match(found: &Match) -> Self {
        Self {
            word: found.surface_token().to_string(),
            matched_word: found.matched_word().to_string(),
            strategy: found.strategy(),
            similarity: found.similarity(),
            data: found.data().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DetectPayload {
    sentence: String,
    matches: Vec<MatchPayload>,
}
