use std::any::Any;

use axum::response::{IntoResponse, Response};
use axum::Router;
use crate::common::response::ApiError;
use crate::state::AppState;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub fn create_app(state: AppState) -> Router {
    with_layers(crate::routes::configure_routes(&state).with_state(state))
}

fn with_layers(router: Router) -> Router {
    router
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    ApiError::internal("Internal server error").into_response()
}
