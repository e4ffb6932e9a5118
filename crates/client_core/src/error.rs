use std::time::Duration;

use shared::error::{ErrorCode, UserFacingError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed bot reply: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("payload does not have the user/horses shape")]
    UnrecognizedShape,
    #[error("payload lists horse {0} more than once")]
    DuplicateHorseId(i64),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to decode inbound payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("host platform is unavailable: {0}")]
    HostUnavailable(String),
    #[error("no snapshot received within {0:?}")]
    Timeout(Duration),
    #[error("host channel send failed: {0}")]
    Send(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("snapshot cache failure: {0}")]
    Cache(String),
    #[error("session controller has been torn down")]
    Closed,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Decode(_) => ErrorCode::Decode,
            SessionError::HostUnavailable(_) => ErrorCode::HostUnavailable,
            SessionError::Timeout(_) => ErrorCode::Timeout,
            SessionError::Send(_) => ErrorCode::Send,
            SessionError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            SessionError::Cache(_) => ErrorCode::Cache,
            SessionError::Closed => ErrorCode::Closed,
        }
    }

    pub fn to_user_facing(&self) -> UserFacingError {
        UserFacingError::new(self.code(), self.to_string())
    }
}
