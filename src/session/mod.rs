pub mod machine;

pub use machine::{ChatSession, LoadTicket, ReplyOutcome};
