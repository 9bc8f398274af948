use super::model::{JobId, JobIdError};

// Wire payload is the bare job id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub job_id: JobId,
}

impl TranscodeJob {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }

    pub fn to_payload(&self) -> Vec<u8> {
        self.job_id.as_str().as_bytes().to_vec()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, JobIdError> {
        // Publishers sometimes append a trailing newline.
        let trimmed = payload.trim_ascii();
        JobId::from_bytes(trimmed).map(Self::new)
    }
}
