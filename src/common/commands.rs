use std::path::PathBuf;

use super::types::ChatId;

/// Intents the front-end hands to the session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Login { username: String, password: String },
    Logout,
    SendMessage(String),
    NewChat,
    SelectConversation(ChatId),
    DeleteConversation(ChatId),
    RefreshConversations,
    /// Renames the signed-in user, optionally uploading a new avatar read from `image`.
    UpdateProfile {
        name: String,
        image: Option<PathBuf>,
    },
    /// User-initiated reopen after the connection dropped; there is no automatic retry.
    Reconnect,
}
