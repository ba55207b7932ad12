use super::error::ChatError;
use super::types::{ChatSummary, SessionState, User};

/// Notifications from the session client to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(User),
    /// `expired` is set when the server rejected the stored credential.
    LoggedOut { expired: bool },
    ProfileUpdated(User),
    StateChanged(SessionState),
    ConversationsLoaded(Vec<ChatSummary>),
    Error(ChatError),
}
