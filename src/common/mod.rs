pub mod commands;
pub mod error;
pub mod events;
pub mod types;

pub use commands::SessionCommand;
pub use error::{ChatError, Rejection};
pub use events::SessionEvent;
pub use types::{
    ChatId, ChatSummary, ConnectionStatus, InboundFrame, Message, Origin, OutboundFrame,
    PersistedMessage, SessionState, User, UserId,
};
