use chrono::{DateTime, Utc};

use crate::common::{ChatSummary, SessionEvent, SessionState, User};

/// Local state of the UI, fed from `SessionEvent`s.
#[derive(Default)]
pub struct AppState {
    pub user: Option<User>,
    pub session: SessionState,
    pub conversations: Vec<ChatSummary>,
    pub input_text: String,
    pub login_username: String,
    pub login_password: String,
    pub signing_in: bool,
    pub notice: Option<String>,
    pub profile_name: String,
    pub profile_image: String,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            signing_in: true,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LoggedIn(user) => {
                self.reset_profile_form(&user);
                self.user = Some(user);
                self.signing_in = false;
                self.login_password.clear();
                self.notice = None;
            }
            SessionEvent::LoggedOut { expired } => {
                *self = Self {
                    login_username: std::mem::take(&mut self.login_username),
                    notice: expired.then(|| "Your session expired. Please sign in again.".into()),
                    ..Self::default()
                };
            }
            SessionEvent::ProfileUpdated(user) => {
                self.reset_profile_form(&user);
                self.user = Some(user);
                self.notice = None;
            }
            SessionEvent::StateChanged(session) => self.session = session,
            SessionEvent::ConversationsLoaded(conversations) => {
                self.conversations = conversations;
            }
            SessionEvent::Error(err) => {
                self.signing_in = false;
                self.notice = Some(err.to_string());
            }
        }
    }

    fn reset_profile_form(&mut self, user: &User) {
        self.profile_name = user.display_name().to_string();
        self.profile_image.clear();
    }

    pub fn active_title(&self) -> String {
        let Some(active) = &self.session.conversation else {
            return "New chat".to_string();
        };
        self.conversations
            .iter()
            .find(|chat| &chat.id == active)
            .map(|chat| chat.display_title().to_string())
            .unwrap_or_else(|| format!("Chat {active}"))
    }
}

pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    match elapsed.num_seconds() {
        ..60 => "just now".to_string(),
        60..3_600 => format!("{}m ago", elapsed.num_minutes()),
        3_600..86_400 => format!("{}h ago", elapsed.num_hours()),
        86_400..604_800 => format!("{}d ago", elapsed.num_days()),
        _ => at.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::common::{ChatError, ChatId, UserId};

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(5), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(7), now), "7m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now - Duration::days(30), now), "2024-04-10");
    }

    #[test]
    fn expiry_clears_the_session_but_keeps_the_username() {
        let mut state = AppState::new();
        state.login_username = "mika".to_string();
        state.apply(SessionEvent::LoggedIn(User {
            id: UserId::from("1"),
            username: "mika".to_string(),
            name: String::new(),
            img: None,
        }));
        state.apply(SessionEvent::Error(ChatError::CredentialExpired));
        state.apply(SessionEvent::LoggedOut { expired: true });

        assert!(state.user.is_none());
        assert_eq!(state.login_username, "mika");
        assert!(state.notice.is_some());
    }

    #[test]
    fn profile_update_replaces_the_user_and_resets_the_form() {
        let mut state = AppState::new();
        state.apply(SessionEvent::LoggedIn(User {
            id: UserId::from("1"),
            username: "mika".to_string(),
            name: String::new(),
            img: None,
        }));
        assert_eq!(state.profile_name, "mika");

        state.profile_image = "/tmp/avatar.png".to_string();
        state.apply(SessionEvent::ProfileUpdated(User {
            id: UserId::from("1"),
            username: "mika".to_string(),
            name: "Mika K.".to_string(),
            img: Some("avatar.png".to_string()),
        }));

        assert_eq!(state.user.as_ref().map(User::display_name), Some("Mika K."));
        assert_eq!(state.profile_name, "Mika K.");
        assert!(state.profile_image.is_empty());
    }

    #[test]
    fn active_title_falls_back_to_the_id() {
        let mut state = AppState::new();
        assert_eq!(state.active_title(), "New chat");
        state.session.conversation = Some(ChatId::from("42"));
        assert_eq!(state.active_title(), "Chat 42");
    }
}
