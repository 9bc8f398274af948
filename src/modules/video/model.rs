use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const JOB_ID_LEN: usize = 10;
const MAX_JOB_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobIdError {
    #[error("job id is empty")]
    Empty,
    #[error("job id is longer than {MAX_JOB_ID_LEN} characters")]
    TooLong,
    #[error("job id contains invalid character {0:?}")]
    InvalidChar(char),
    #[error("job id is not valid UTF-8")]
    NotUtf8,
}

// [A-Za-z0-9_-] only: used as a directory name and a blob key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(JOB_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn parse(raw: &str) -> Result<Self, JobIdError> {
        if raw.is_empty() {
            return Err(JobIdError::Empty);
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(JobIdError::TooLong);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(JobIdError::InvalidChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, JobIdError> {
        let s = std::str::from_utf8(raw).map_err(|_| JobIdError::NotUtf8)?;
        Self::parse(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = JobIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_ten_alphanumerics() {
        for _ in 0..50 {
            let id = JobId::generate();
            assert_eq!(id.as_str().len(), JOB_ID_LEN);
            assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
            // A generated id must always pass its own validation.
            assert_eq!(JobId::parse(id.as_str()), Ok(id));
        }
    }

    #[test]
    fn rejects_path_like_ids() {
        assert_eq!(JobId::parse(""), Err(JobIdError::Empty));
        assert_eq!(JobId::parse("../etc"), Err(JobIdError::InvalidChar('.')));
        assert_eq!(JobId::parse("a/b"), Err(JobIdError::InvalidChar('/')));
        assert_eq!(JobId::parse("abc 123"), Err(JobIdError::InvalidChar(' ')));
        assert_eq!(JobId::parse(&"x".repeat(129)), Err(JobIdError::TooLong));
    }

    #[test]
    fn accepts_dashes_and_underscores() {
        assert!(JobId::parse("abc1234567").is_ok());
        assert!(JobId::parse("job_2024-01").is_ok());
    }

    #[test]
    fn from_bytes_rejects_invalid_utf8() {
        assert_eq!(JobId::from_bytes(&[0xff, 0xfe]), Err(JobIdError::NotUtf8));
        assert_eq!(
            JobId::from_bytes(b"abc1234567").map(String::from),
            Ok("abc1234567".to_string())
        );
    }
}
