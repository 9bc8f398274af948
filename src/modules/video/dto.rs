use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub video_id: String,
    pub location: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemInfo {
    pub server_timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PingResponse {
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResubmitResponse {
    pub video_id: String,
}
