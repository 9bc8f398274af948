use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod service;
pub mod stream_handler;

/// Multipart field carrying the uploaded video.
pub const UPLOAD_FIELD: &str = "video_file";

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    let upload_routes = Router::new()
        .route("/videos", post(handler::upload_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes));

    Router::new()
        .route("/ping", get(handler::ping))
        .route("/videos/{name}", get(stream_handler::stream_video))
        .route("/videos/{id}/process", post(handler::resubmit_video))
        .merge(upload_routes)
}
