use utoipa::OpenApi;

use crate::modules::video::dto::{PingResponse, ResubmitResponse, SystemInfo, UploadResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::ping,
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::resubmit_video,
        crate::modules::video::stream_handler::stream_video,
    ),
    components(
        schemas(UploadResponse, PingResponse, SystemInfo, ResubmitResponse)
    ),
    tags(
        (name = "Videos", description = "Video upload, HLS retrieval and processing")
    )
)]
pub struct ApiDoc;
