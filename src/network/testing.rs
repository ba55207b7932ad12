//! In-process doubles for the transport and the REST collaborator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use crate::common::{ChatError, ChatId, ChatSummary, PersistedMessage, User, UserId};

use super::api::{ApiError, AuthResponse, AuthService, HistoryLoader, ProfileImage};
use super::transport::{Connector, Link, LinkEvent};

/// The server side of one scripted connection.
pub struct RemoteEnd {
    pub identity: UserId,
    pub sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<LinkEvent>,
}

impl RemoteEnd {
    pub fn push_frame(&self, text: &str) {
        let _ = self.inbound.send(LinkEvent::Frame(text.to_string()));
    }

    pub fn drop_connection(&self, reason: Option<&str>) {
        let _ = self
            .inbound
            .send(LinkEvent::Closed(reason.map(str::to_string)));
    }
}

/// Hands every accepted connection to the test through a channel.
pub struct ScriptedConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    refuse: AtomicBool,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            remotes,
            refuse: AtomicBool::new(false),
        });
        (connector, accepted)
    }

    pub fn refusing() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (connector, accepted) = Self::new();
        connector.set_refusing(true);
        (connector, accepted)
    }

    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, identity: &UserId) -> Result<Link, ChatError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChatError::ConnectionFailure("connection refused".to_string()));
        }

        let (outbound, sent) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let _ = self.remotes.send(RemoteEnd {
            identity: identity.clone(),
            sent,
            inbound: inbound_tx,
        });
        Ok(Link { outbound, inbound })
    }
}

/// REST collaborator backed by maps. Tokens are `token-<user id>`.
#[derive(Default)]
pub struct InMemoryBackend {
    accounts: Mutex<HashMap<String, (String, User)>>,
    chats: Mutex<Vec<ChatSummary>>,
    messages: Mutex<HashMap<ChatId, Vec<PersistedMessage>>>,
    expired: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_account(&self, username: &str, password: &str, id: &str) -> User {
        let user = User {
            id: UserId::from(id),
            username: username.to_string(),
            name: String::new(),
            img: None,
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(username.to_string(), (password.to_string(), user.clone()));
        user
    }

    pub fn add_chat(&self, id: &str, title: &str, history: Vec<PersistedMessage>) {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        self.chats.lock().unwrap().push(ChatSummary {
            id: ChatId::from(id),
            title: Some(title.to_string()),
            created_at: at,
            updated_at: at,
        });
        self.messages
            .lock()
            .unwrap()
            .insert(ChatId::from(id), history);
    }

    pub fn expire_credentials(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    fn authorize(&self, token: &str) -> Result<User, ApiError> {
        if self.expired.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|(_, user)| format!("token-{}", user.id) == token)
            .map(|(_, user)| user.clone())
            .ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl AuthService for InMemoryBackend {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(username) {
            Some((expected, user)) if expected == password => Ok(AuthResponse {
                token: format!("token-{}", user.id),
                user: user.clone(),
            }),
            _ => Err(ApiError::Unauthorized),
        }
    }

    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        self.authorize(token)
    }

    async fn update_profile(
        &self,
        token: &str,
        user_id: &UserId,
        name: &str,
        image: Option<ProfileImage>,
    ) -> Result<User, ApiError> {
        let caller = self.authorize(token)?;
        if &caller.id != user_id {
            return Err(ApiError::Status {
                status: 403,
                message: "cannot edit another user".to_string(),
            });
        }

        let mut accounts = self.accounts.lock().unwrap();
        let (_, user) = accounts
            .get_mut(&caller.username)
            .ok_or(ApiError::NotFound)?;
        user.name = name.to_string();
        if let Some(image) = image {
            user.img = Some(format!("{}-{}", image.bytes.len(), image.file_name));
        }
        Ok(user.clone())
    }
}

/// Wraps a backend so that logins of chosen users complete only after a delay.
pub struct DelayedAuth {
    inner: Arc<InMemoryBackend>,
    delays: HashMap<String, Duration>,
}

impl DelayedAuth {
    pub fn new(inner: Arc<InMemoryBackend>, delays: &[(&str, Duration)]) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delays: delays
                .iter()
                .map(|(username, delay)| (username.to_string(), *delay))
                .collect(),
        })
    }
}

#[async_trait]
impl AuthService for DelayedAuth {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        if let Some(delay) = self.delays.get(username) {
            tokio::time::sleep(*delay).await;
        }
        self.inner.login(username, password).await
    }

    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        self.inner.current_user(token).await
    }

    async fn update_profile(
        &self,
        token: &str,
        user_id: &UserId,
        name: &str,
        image: Option<ProfileImage>,
    ) -> Result<User, ApiError> {
        self.inner.update_profile(token, user_id, name, image).await
    }
}

#[async_trait]
impl HistoryLoader for InMemoryBackend {
    async fn list_conversations(&self, token: &str) -> Result<Vec<ChatSummary>, ApiError> {
        self.authorize(token)?;
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &ChatId,
    ) -> Result<Vec<PersistedMessage>, ApiError> {
        self.authorize(token)?;
        self.messages
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn delete_conversation(&self, token: &str, chat_id: &ChatId) -> Result<(), ApiError> {
        self.authorize(token)?;
        let mut chats = self.chats.lock().unwrap();
        let before = chats.len();
        chats.retain(|chat| &chat.id != chat_id);
        if chats.len() == before {
            return Err(ApiError::NotFound);
        }
        self.messages.lock().unwrap().remove(chat_id);
        Ok(())
    }
}
