use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::common::{
    ChatError, ChatId, ConnectionStatus, InboundFrame, Message, Origin, OutboundFrame,
    PersistedMessage, Rejection, SessionState, UserId,
};

/// Result of feeding one inbound frame to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Reply appended; `adopted` carries the id the server minted for a new conversation.
    Appended { adopted: Option<ChatId> },
    /// Payload could not be parsed; pending was still cleared.
    Malformed(ChatError),
    /// No send was outstanding, so the frame was dropped.
    Stray,
}

/// Handle for one history fetch. Only the latest ticket may populate the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    chat_id: ChatId,
    sequence: u64,
}

impl LoadTicket {
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }
}

/// Reconciliation state of one authenticated session.
///
/// The wire protocol carries no correlation id, so at most one send may be
/// outstanding: `pending` is set when a local message is appended and cleared
/// by the next inbound frame, a connection drop or the reply timeout. Every
/// inbound frame seen while pending is taken to be the reply to that send.
#[derive(Debug)]
pub struct ChatSession {
    identity: UserId,
    state: SessionState,
    pending_since: Option<Instant>,
    view_sequence: u64,
}

impl ChatSession {
    pub fn new(identity: UserId) -> Self {
        Self {
            identity,
            state: SessionState::default(),
            pending_since: None,
            view_sequence: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    /// Optimistically appends the local message and returns the frame to transmit.
    pub fn send(&mut self, content: String, now: Instant) -> Result<OutboundFrame, Rejection> {
        if self.state.connection != ConnectionStatus::Connected {
            return Err(Rejection::NotConnected);
        }
        if self.state.pending {
            return Err(Rejection::Pending);
        }
        if content.trim().is_empty() {
            return Err(Rejection::EmptyContent);
        }

        // the user acted on the current view; an in-flight history load is superseded
        self.supersede_view();

        self.state.log.push(Message {
            id: Uuid::new_v4().to_string(),
            content: content.clone(),
            origin: Origin::Local,
            created_at: Utc::now(),
            conversation: self.state.conversation.clone(),
        });
        self.state.pending = true;
        self.pending_since = Some(now);

        Ok(OutboundFrame {
            content,
            conversation: self.state.conversation.clone(),
        })
    }

    pub fn receive_reply(&mut self, raw: &str) -> ReplyOutcome {
        if !self.state.pending {
            return ReplyOutcome::Stray;
        }
        self.clear_pending();

        let frame = match serde_json::from_str::<InboundFrame>(raw) {
            Ok(frame) => frame,
            Err(err) => return ReplyOutcome::Malformed(ChatError::MalformedReply(err.to_string())),
        };

        let adopted = match &self.state.conversation {
            None if frame.conversation.is_new_marker() => {
                log::warn!("Reply carries no conversation id; staying on a new chat");
                None
            }
            None => {
                self.state.conversation = Some(frame.conversation.clone());
                Some(frame.conversation)
            }
            Some(current) => {
                if current != &frame.conversation {
                    log::warn!(
                        "Reply names conversation {} while {current} is active; keeping {current}",
                        frame.conversation
                    );
                }
                None
            }
        };

        self.state.log.push(Message {
            id: format!("{}-assistant", Uuid::new_v4()),
            content: frame.response,
            origin: Origin::Remote,
            created_at: Utc::now(),
            conversation: self.state.conversation.clone(),
        });

        ReplyOutcome::Appended { adopted }
    }

    /// Records the transport status. A drop while pending yields the error to surface.
    pub fn connection_changed(
        &mut self,
        status: ConnectionStatus,
        reason: Option<&str>,
    ) -> Option<ChatError> {
        self.state.connection = status;
        if status != ConnectionStatus::Disconnected || !self.state.pending {
            return None;
        }

        // the optimistic message stays; its outcome is unknown
        self.clear_pending();
        Some(ChatError::ConnectionFailure(
            reason.unwrap_or("connection lost before the reply arrived").to_string(),
        ))
    }

    pub fn begin_select(&mut self, chat_id: ChatId) -> Result<LoadTicket, Rejection> {
        if self.state.pending {
            return Err(Rejection::Pending);
        }
        self.supersede_view();
        self.state.loading = Some(chat_id.clone());
        Ok(LoadTicket {
            chat_id,
            sequence: self.view_sequence,
        })
    }

    /// Replaces the log with the fetched history. Returns false for a superseded ticket.
    pub fn finish_select(&mut self, ticket: LoadTicket, history: Vec<PersistedMessage>) -> bool {
        if !self.is_current(&ticket) {
            return false;
        }

        self.state.log = history
            .into_iter()
            .map(|message| Message {
                origin: if message.author_id == self.identity {
                    Origin::Local
                } else {
                    Origin::Remote
                },
                id: message.id,
                content: message.content,
                created_at: message.created_at,
                conversation: Some(message.chat_id),
            })
            .collect();
        self.state.conversation = Some(ticket.chat_id);
        self.state.loading = None;
        self.clear_pending();
        true
    }

    pub fn fail_select(&mut self, ticket: &LoadTicket) {
        if self.is_current(ticket) {
            self.state.loading = None;
        }
    }

    pub fn new_chat(&mut self) -> Result<(), Rejection> {
        if self.state.pending {
            return Err(Rejection::Pending);
        }
        self.reset();
        Ok(())
    }

    /// Returns true when the deleted conversation was the active one.
    pub fn conversation_deleted(&mut self, chat_id: &ChatId) -> bool {
        let active = self.state.conversation.as_ref() == Some(chat_id)
            || self.state.loading.as_ref() == Some(chat_id);
        if active {
            self.reset();
        }
        active
    }

    pub fn reply_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.pending_since.map(|since| since + timeout)
    }

    pub fn expire_pending(&mut self, now: Instant, timeout: Duration) -> Option<ChatError> {
        let deadline = self.reply_deadline(timeout)?;
        if now < deadline {
            return None;
        }
        self.clear_pending();
        Some(ChatError::ReplyTimeout(timeout.as_secs()))
    }

    fn reset(&mut self) {
        self.supersede_view();
        self.state.conversation = None;
        self.state.log.clear();
        self.state.loading = None;
        self.clear_pending();
    }

    fn clear_pending(&mut self) {
        self.state.pending = false;
        self.pending_since = None;
    }

    fn supersede_view(&mut self) {
        self.view_sequence += 1;
        self.state.loading = None;
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.sequence == self.view_sequence
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn connected_session() -> ChatSession {
        let mut session = ChatSession::new(UserId::from("u1"));
        session.connection_changed(ConnectionStatus::Connected, None);
        session
    }

    fn history(chat: &str) -> Vec<PersistedMessage> {
        let at = |minute| Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap();
        vec![
            PersistedMessage {
                id: "1".to_string(),
                content: "question".to_string(),
                author_id: UserId::from("u1"),
                created_at: at(0),
                chat_id: ChatId::from(chat),
            },
            PersistedMessage {
                id: "2".to_string(),
                content: "answer".to_string(),
                author_id: UserId::from("assistant"),
                created_at: at(1),
                chat_id: ChatId::from(chat),
            },
        ]
    }

    #[test]
    fn hello_round_trip_adopts_the_new_conversation() {
        let mut session = connected_session();

        let frame = session.send("hello".to_string(), Instant::now()).unwrap();
        assert_eq!(frame.conversation, None);
        assert!(session.state().pending);
        assert_eq!(session.state().log.len(), 1);
        assert_eq!(session.state().log[0].content, "hello");
        assert_eq!(session.state().log[0].origin, Origin::Local);

        let outcome = session.receive_reply(r#"{"chatId": "c1", "response": "hi there"}"#);
        assert_eq!(
            outcome,
            ReplyOutcome::Appended {
                adopted: Some(ChatId::from("c1"))
            }
        );
        let state = session.state();
        assert!(!state.pending);
        assert_eq!(state.conversation, Some(ChatId::from("c1")));
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log[1].content, "hi there");
        assert_eq!(state.log[1].origin, Origin::Remote);
    }

    #[test]
    fn only_one_send_is_accepted_while_pending() {
        let mut session = connected_session();
        let now = Instant::now();

        let accepted = (0..5)
            .map(|n| session.send(format!("message {n}"), now))
            .filter(Result::is_ok)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(session.state().log.len(), 1);
        assert!(session.state().pending);
    }

    #[test]
    fn send_while_pending_leaves_state_untouched() {
        let mut session = connected_session();
        session.send("first".to_string(), Instant::now()).unwrap();
        let before = session.snapshot();

        let rejected = session.send("second".to_string(), Instant::now());

        assert_eq!(rejected, Err(Rejection::Pending));
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn send_requires_a_connection_and_content() {
        let mut session = ChatSession::new(UserId::from("u1"));
        assert_eq!(
            session.send("hi".to_string(), Instant::now()),
            Err(Rejection::NotConnected)
        );

        session.connection_changed(ConnectionStatus::Connecting, None);
        assert_eq!(
            session.send("hi".to_string(), Instant::now()),
            Err(Rejection::NotConnected)
        );

        session.connection_changed(ConnectionStatus::Connected, None);
        assert_eq!(
            session.send("   \n".to_string(), Instant::now()),
            Err(Rejection::EmptyContent)
        );
        assert!(session.state().log.is_empty());
    }

    #[test]
    fn malformed_reply_still_clears_pending() {
        let mut session = connected_session();
        session.send("hello".to_string(), Instant::now()).unwrap();

        let outcome = session.receive_reply("not json at all");

        assert!(matches!(
            outcome,
            ReplyOutcome::Malformed(ChatError::MalformedReply(_))
        ));
        assert!(!session.state().pending);
        assert_eq!(session.state().log.len(), 1);
        assert_eq!(session.state().conversation, None);
    }

    #[test]
    fn frames_without_an_outstanding_send_are_stray() {
        let mut session = connected_session();
        let outcome = session.receive_reply(r#"{"chatId": "c1", "response": "unsolicited"}"#);
        assert_eq!(outcome, ReplyOutcome::Stray);
        assert!(session.state().log.is_empty());
        assert_eq!(session.state().conversation, None);
    }

    #[test]
    fn adopted_conversation_is_stable_across_sends() {
        let mut session = connected_session();
        session.send("one".to_string(), Instant::now()).unwrap();
        session.receive_reply(r#"{"chatId": "c1", "response": "r1"}"#);

        let frame = session.send("two".to_string(), Instant::now()).unwrap();
        assert_eq!(frame.conversation, Some(ChatId::from("c1")));

        let outcome = session.receive_reply(r#"{"chatId": "c2", "response": "r2"}"#);
        assert_eq!(outcome, ReplyOutcome::Appended { adopted: None });
        assert_eq!(session.state().conversation, Some(ChatId::from("c1")));
        let stamped: Vec<_> = session
            .state()
            .log
            .iter()
            .map(|m| m.conversation.clone())
            .collect();
        let c1 = Some(ChatId::from("c1"));
        assert_eq!(stamped, [None, c1.clone(), c1.clone(), c1]);
    }

    #[test]
    fn reply_without_a_real_chat_id_is_not_adopted() {
        for raw in [
            r#"{"chatId": 0, "response": "hi"}"#,
            r#"{"chatId": "", "response": "hi"}"#,
            r#"{"chatId": "0", "response": "hi"}"#,
        ] {
            let mut session = connected_session();
            session.send("hello".to_string(), Instant::now()).unwrap();

            let outcome = session.receive_reply(raw);

            assert_eq!(outcome, ReplyOutcome::Appended { adopted: None });
            let state = session.state();
            assert!(!state.pending);
            assert_eq!(state.conversation, None);
            assert_eq!(state.log.len(), 2);
            assert_eq!(state.log[1].conversation, None);

            let frame = session.send("again".to_string(), Instant::now()).unwrap();
            assert_eq!(frame.conversation, None);
        }
    }

    #[test]
    fn connection_drop_while_pending_surfaces_one_error() {
        let mut session = connected_session();
        session.send("hello".to_string(), Instant::now()).unwrap();
        let log_before = session.state().log.clone();

        let first = session.connection_changed(ConnectionStatus::Disconnected, Some("reset"));
        let second = session.connection_changed(ConnectionStatus::Disconnected, Some("reset"));

        assert_eq!(first, Some(ChatError::ConnectionFailure("reset".to_string())));
        assert_eq!(second, None);
        assert!(!session.state().pending);
        assert_eq!(session.state().log, log_before);
    }

    #[test]
    fn selected_history_is_loaded_element_for_element() {
        let mut session = connected_session();
        let ticket = session.begin_select(ChatId::from("c7")).unwrap();
        assert_eq!(session.state().loading, Some(ChatId::from("c7")));

        let fetched = history("c7");
        assert!(session.finish_select(ticket, fetched.clone()));

        let state = session.state();
        assert_eq!(state.conversation, Some(ChatId::from("c7")));
        assert_eq!(state.loading, None);
        assert_eq!(state.log.len(), fetched.len());
        for (message, persisted) in state.log.iter().zip(&fetched) {
            assert_eq!(message.id, persisted.id);
            assert_eq!(message.content, persisted.content);
            assert_eq!(message.created_at, persisted.created_at);
            assert_eq!(message.conversation.as_ref(), Some(&persisted.chat_id));
        }
        assert_eq!(state.log[0].origin, Origin::Local);
        assert_eq!(state.log[1].origin, Origin::Remote);
    }

    #[test]
    fn select_then_new_chat_yields_empty_idle_state() {
        let mut session = connected_session();
        let ticket = session.begin_select(ChatId::from("c7")).unwrap();
        session.finish_select(ticket, history("c7"));

        session.new_chat().unwrap();

        let state = session.state();
        assert_eq!(state.conversation, None);
        assert!(state.log.is_empty());
        assert!(!state.pending);
    }

    #[test]
    fn selection_and_new_chat_are_refused_while_pending() {
        let mut session = connected_session();
        session.send("hello".to_string(), Instant::now()).unwrap();

        assert_eq!(
            session.begin_select(ChatId::from("c7")),
            Err(Rejection::Pending)
        );
        assert_eq!(session.new_chat(), Err(Rejection::Pending));
        assert_eq!(session.state().log.len(), 1);
    }

    #[test]
    fn superseded_history_loads_are_discarded() {
        let mut session = connected_session();
        let first = session.begin_select(ChatId::from("c1")).unwrap();
        let second = session.begin_select(ChatId::from("c2")).unwrap();

        assert!(!session.finish_select(first, history("c1")));
        assert_eq!(session.state().loading, Some(ChatId::from("c2")));
        assert!(session.finish_select(second, history("c2")));
        assert_eq!(session.state().conversation, Some(ChatId::from("c2")));

        let late = session.begin_select(ChatId::from("c3")).unwrap();
        session.new_chat().unwrap();
        assert!(!session.finish_select(late, history("c3")));
        assert!(session.state().log.is_empty());
    }

    #[test]
    fn deleting_the_active_conversation_resets_the_session() {
        let mut session = connected_session();
        let ticket = session.begin_select(ChatId::from("c7")).unwrap();
        session.finish_select(ticket, history("c7"));

        assert!(!session.conversation_deleted(&ChatId::from("other")));
        assert_eq!(session.state().log.len(), 2);

        assert!(session.conversation_deleted(&ChatId::from("c7")));
        assert_eq!(session.state().conversation, None);
        assert!(session.state().log.is_empty());
    }

    #[test]
    fn pending_send_expires_after_the_timeout() {
        let mut session = connected_session();
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        session.send("hello".to_string(), start).unwrap();

        assert_eq!(session.reply_deadline(timeout), Some(start + timeout));
        assert_eq!(
            session.expire_pending(start + Duration::from_secs(10), timeout),
            None
        );
        assert!(session.state().pending);

        let expired = session.expire_pending(start + timeout, timeout);
        assert_eq!(expired, Some(ChatError::ReplyTimeout(30)));
        assert!(!session.state().pending);
        assert_eq!(session.state().log.len(), 1);
        assert_eq!(session.reply_deadline(timeout), None);
    }
}
