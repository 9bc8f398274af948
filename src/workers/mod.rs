pub mod dispatcher;
pub mod pipeline;
pub mod transcoder;
pub mod workspace;
