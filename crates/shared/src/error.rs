use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Decode,
    HostUnavailable,
    Timeout,
    Send,
    InvalidRequest,
    Cache,
    Closed,
}

impl ErrorCode {
    /// Short text the front-end shows in its error popup.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCode::Decode => "Could not read the data sent by the bot",
            ErrorCode::HostUnavailable => "Open this app from the bot chat",
            ErrorCode::Timeout => "The bot did not answer in time",
            ErrorCode::Send => "Could not reach the bot",
            ErrorCode::InvalidRequest => "Nothing to update",
            ErrorCode::Cache => "Could not access saved data",
            ErrorCode::Closed => "The app is closing",
        }
    }
}

/// Error state surfaced to the view. `detail` carries the diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} ({detail})")]
pub struct UserFacingError {
    pub code: ErrorCode,
    pub message: String,
    pub detail: String,
}

impl UserFacingError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            message: code.user_message().to_string(),
            detail: detail.into(),
        }
    }
}
