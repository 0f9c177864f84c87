use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::Embed;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::camera::{CameraSummary, Registry};

use super::mjpeg;

#[derive(Embed)]
#[folder = "src/assets/"]
struct Assets;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub poll_interval: Duration,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }
}

#[derive(Serialize)]
struct CamerasResponse {
    count: usize,
    cameras: Vec<CameraSummary>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/assets/{*path}", get(static_handler))
        .route("/api/cameras", get(cameras_handler))
        .route("/video_feed/{id}", get(video_feed_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    match Assets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn cameras_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cameras = state.registry.summaries();
    axum::Json(CamerasResponse {
        count: cameras.len(),
        cameras,
    })
}

async fn video_feed_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(buffer) = state.registry.buffer(&id) else {
        tracing::debug!(camera = %id, "stream requested for unknown camera");
        return (StatusCode::NOT_FOUND, "camera not found").into_response();
    };

    tracing::debug!(camera = %id, "viewer connected");
    let body = Body::from_stream(mjpeg::frame_stream(buffer, state.poll_interval));

    (
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        body,
    )
        .into_response()
}
