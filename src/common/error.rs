use thiserror::Error;

use super::types::ChatId;

/// Why the session ignored a front-end intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("a reply is still pending")]
    Pending,
    #[error("connection is not ready")]
    NotConnected,
    #[error("message is empty")]
    EmptyContent,
    #[error("no active session")]
    NoSession,
}

/// Failures surfaced to the front-end. Only `CredentialExpired` ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("not connected")]
    NotConnected,
    #[error("send rejected: {0}")]
    SendRejected(Rejection),
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("no reply within {0} seconds")]
    ReplyTimeout(u64),
    #[error("failed to load history: {0}")]
    HistoryFetchFailure(String),
    #[error("conversation {0} not found")]
    NotFound(ChatId),
    #[error("failed to delete conversation: {0}")]
    DeleteFailure(String),
    #[error("failed to update profile: {0}")]
    ProfileUpdateFailure(String),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("credential expired, please sign in again")]
    CredentialExpired,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}
