use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            data: None,
        }
    }
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> ApiSuccess<ApiResponse<T>>
where
    T: Serialize,
{
    pub fn ok(data: T, message: &str) -> Self {
        Self(ApiResponse::success(data, message), StatusCode::OK)
    }

    pub fn accepted(data: T, message: &str) -> Self {
        Self(ApiResponse::success(data, message), StatusCode::ACCEPTED)
    }
}

impl<T> IntoResponse for ApiSuccess<ApiResponse<T>>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (response, status) = (self.0, self.1);
        (status, Json(response)).into_response()
    }
}

#[derive(Debug)]
pub struct ApiError(pub String, pub StatusCode);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(message.into(), StatusCode::BAD_REQUEST)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(message.into(), StatusCode::NOT_FOUND)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self(message.into(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (message, status) = (self.0, self.1);
        let response = ApiResponse::<()>::error(&message);
        (status, Json(response)).into_response()
    }
}
