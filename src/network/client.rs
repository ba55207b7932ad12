use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::{
    ChatError, ChatId, ChatSummary, ConnectionStatus, PersistedMessage, Rejection,
    SessionCommand, SessionEvent, User,
};
use crate::session::{ChatSession, LoadTicket, ReplyOutcome};
use crate::storage::CredentialDatabase;

use super::api::{ApiError, AuthResponse, AuthService, HistoryLoader, ProfileImage};
use super::supervisor::{ConnectionSupervisor, SupervisorEvent};
use super::transport::Connector;

/// Collaborators the session client is wired with.
pub struct ClientServices {
    pub connector: Arc<dyn Connector>,
    pub auth: Arc<dyn AuthService>,
    pub history: Arc<dyn HistoryLoader>,
    pub credentials: Option<CredentialDatabase>,
    /// `None` keeps a pending send waiting until a reply or a disconnect.
    pub reply_timeout: Option<Duration>,
}

enum ApiReply {
    LoggedIn {
        ticket: u64,
        result: Result<AuthResponse, ApiError>,
    },
    Restored {
        ticket: u64,
        token: String,
        result: Result<User, ApiError>,
    },
    ProfileUpdated(Result<User, ChatError>),
    Conversations(Result<Vec<ChatSummary>, ApiError>),
    History {
        ticket: LoadTicket,
        result: Result<Vec<PersistedMessage>, ApiError>,
    },
    Deleted {
        chat_id: ChatId,
        result: Result<(), ApiError>,
    },
}

/// REST completions are tagged with the login generation they were issued under.
/// Login attempts additionally carry their own ticket; only the latest one may sign in.
struct ApiResult {
    generation: u64,
    reply: ApiReply,
}

struct ActiveLogin {
    token: String,
    user: User,
    session: ChatSession,
}

/// Event loop owning the connection, the session state and the conversation list.
pub struct SessionClient {
    event_sender: mpsc::Sender<SessionEvent>,
    command_receiver: mpsc::Receiver<SessionCommand>,
    supervisor: ConnectionSupervisor,
    auth: Arc<dyn AuthService>,
    history: Arc<dyn HistoryLoader>,
    credentials: Option<CredentialDatabase>,
    reply_timeout: Option<Duration>,
    login: Option<ActiveLogin>,
    conversations: Vec<ChatSummary>,
    generation: u64,
    login_ticket: u64,
    api_sender: mpsc::UnboundedSender<ApiResult>,
    api_receiver: mpsc::UnboundedReceiver<ApiResult>,
}

impl SessionClient {
    pub fn new(
        event_sender: mpsc::Sender<SessionEvent>,
        command_receiver: mpsc::Receiver<SessionCommand>,
        services: ClientServices,
    ) -> Self {
        let (api_sender, api_receiver) = mpsc::unbounded_channel();
        Self {
            event_sender,
            command_receiver,
            supervisor: ConnectionSupervisor::new(services.connector),
            auth: services.auth,
            history: services.history,
            credentials: services.credentials,
            reply_timeout: services.reply_timeout,
            login: None,
            conversations: Vec::new(),
            generation: 0,
            login_ticket: 0,
            api_sender,
            api_receiver,
        }
    }

    pub async fn run(mut self) {
        log::info!("Session event loop started");
        self.restore_credential().await;

        loop {
            let deadline = self.reply_deadline();
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                Some(event) = self.supervisor.next_event() => {
                    self.handle_supervisor_event(event).await;
                }
                Some(result) = self.api_receiver.recv() => {
                    self.handle_api_result(result).await;
                }
                _ = wait_until(deadline) => {
                    self.handle_reply_timeout().await;
                }
            }
        }

        self.supervisor.close();
        log::info!("Session event loop stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Login { username, password } => {
                let ticket = self.next_login_ticket();
                let auth = Arc::clone(&self.auth);
                self.spawn_api(async move {
                    let result = auth.login(&username, &password).await;
                    ApiReply::LoggedIn { ticket, result }
                });
            }
            SessionCommand::Logout => self.tear_down(false).await,
            SessionCommand::SendMessage(content) => self.send_message(content).await,
            SessionCommand::NewChat => {
                let Some(login) = self.login.as_mut() else {
                    return;
                };
                match login.session.new_chat() {
                    Ok(()) => self.publish_state().await,
                    Err(rejection) => log::debug!("New chat ignored: {rejection}"),
                }
            }
            SessionCommand::SelectConversation(chat_id) => self.select_conversation(chat_id).await,
            SessionCommand::DeleteConversation(chat_id) => {
                let Some(token) = self.token() else {
                    return;
                };
                let history = Arc::clone(&self.history);
                self.spawn_api(async move {
                    let result = history.delete_conversation(&token, &chat_id).await;
                    ApiReply::Deleted { chat_id, result }
                });
            }
            SessionCommand::RefreshConversations => self.refresh_conversations(),
            SessionCommand::UpdateProfile { name, image } => {
                self.update_profile(name, image).await
            }
            SessionCommand::Reconnect => {
                let Some(login) = self.login.as_mut() else {
                    return;
                };
                let status = self.supervisor.open(login.user.id.clone());
                login.session.connection_changed(status, None);
                self.publish_state().await;
            }
        }
    }

    async fn send_message(&mut self, content: String) {
        let Some(login) = self.login.as_mut() else {
            log::debug!("Send ignored: {}", Rejection::NoSession);
            return;
        };

        let frame = match login.session.send(content, Instant::now()) {
            Ok(frame) => frame,
            Err(rejection) => {
                // the front-end disables the affordance; rejections stay silent
                log::debug!("Send ignored: {rejection}");
                return;
            }
        };

        let failure = match self.supervisor.send(&frame) {
            Ok(()) => None,
            Err(err) => {
                log::warn!("Failed to write frame: {err}");
                login
                    .session
                    .connection_changed(ConnectionStatus::Disconnected, Some(&err.to_string()))
            }
        };

        self.publish_state().await;
        if let Some(err) = failure {
            self.emit(SessionEvent::Error(err)).await;
        }
    }

    async fn select_conversation(&mut self, chat_id: ChatId) {
        let Some(login) = self.login.as_mut() else {
            return;
        };
        let ticket = match login.session.begin_select(chat_id) {
            Ok(ticket) => ticket,
            Err(rejection) => {
                log::debug!("Conversation switch ignored: {rejection}");
                return;
            }
        };
        let token = login.token.clone();
        self.publish_state().await;

        let history = Arc::clone(&self.history);
        self.spawn_api(async move {
            let result = history.fetch_messages(&token, ticket.chat_id()).await;
            ApiReply::History { ticket, result }
        });
    }

    fn refresh_conversations(&self) {
        let Some(token) = self.token() else {
            return;
        };
        let history = Arc::clone(&self.history);
        self.spawn_api(async move {
            ApiReply::Conversations(history.list_conversations(&token).await)
        });
    }

    async fn update_profile(&mut self, name: String, image: Option<PathBuf>) {
        let Some(login) = self.login.as_ref() else {
            return;
        };
        let name = name.trim().to_string();
        if name.is_empty() {
            let err = ChatError::ProfileUpdateFailure("name must not be empty".to_string());
            self.emit(SessionEvent::Error(err)).await;
            return;
        }

        let token = login.token.clone();
        let user_id = login.user.id.clone();
        let auth = Arc::clone(&self.auth);
        self.spawn_api(async move {
            let result = match read_profile_image(image).await {
                Ok(image) => auth
                    .update_profile(&token, &user_id, &name, image)
                    .await
                    .map_err(|err| err.into_chat_error(ChatError::ProfileUpdateFailure)),
                Err(err) => Err(err),
            };
            ApiReply::ProfileUpdated(result)
        });
    }

    async fn handle_supervisor_event(&mut self, event: SupervisorEvent) {
        let Some(login) = self.login.as_mut() else {
            log::debug!("Supervisor event without a session: {event:?}");
            return;
        };

        match event {
            SupervisorEvent::Frame(text) => match login.session.receive_reply(&text) {
                ReplyOutcome::Appended { adopted } => {
                    self.publish_state().await;
                    if let Some(chat_id) = adopted {
                        log::info!("Server opened conversation {chat_id}");
                        self.refresh_conversations();
                    }
                }
                ReplyOutcome::Malformed(err) => {
                    log::warn!("Dropping unparsable frame: {err}");
                    self.publish_state().await;
                    self.emit(SessionEvent::Error(err)).await;
                }
                ReplyOutcome::Stray => {
                    log::warn!("Dropping frame received with no send outstanding");
                }
            },
            SupervisorEvent::Status { status, reason } => {
                let failure = login.session.connection_changed(status, reason.as_deref());
                self.publish_state().await;
                if let Some(err) = failure {
                    self.emit(SessionEvent::Error(err)).await;
                }
            }
        }
    }

    async fn handle_api_result(&mut self, ApiResult { generation, reply }: ApiResult) {
        match &reply {
            ApiReply::LoggedIn { ticket, .. } | ApiReply::Restored { ticket, .. } => {
                if *ticket != self.login_ticket {
                    log::info!("Discarding superseded login attempt {ticket}");
                    return;
                }
            }
            _ if generation != self.generation => {
                log::debug!("Discarding REST result from login generation {generation}");
                return;
            }
            _ => {}
        }

        match reply {
            ApiReply::LoggedIn {
                result: Ok(AuthResponse { token, user }),
                ..
            } => self.establish(token, user).await,
            ApiReply::LoggedIn { result: Err(err), .. } => {
                let message = match err {
                    ApiError::Unauthorized => "invalid username or password".to_string(),
                    other => other.to_string(),
                };
                self.emit(SessionEvent::Error(ChatError::LoginFailed(message)))
                    .await;
            }
            ApiReply::Restored { token, result, .. } => match result {
                Ok(user) => self.establish(token, user).await,
                Err(err) => {
                    log::warn!("Stored credential rejected: {err}");
                    self.forget_credential();
                    self.emit(SessionEvent::LoggedOut {
                        expired: err.is_unauthorized(),
                    })
                    .await;
                }
            },
            ApiReply::ProfileUpdated(Ok(user)) => {
                let Some(login) = self.login.as_mut() else {
                    return;
                };
                login.user = user.clone();
                let token = login.token.clone();
                log::info!("Profile of {} updated", user.username);
                self.persist_credential(&token, &user).await;
                self.emit(SessionEvent::ProfileUpdated(user)).await;
            }
            ApiReply::ProfileUpdated(Err(err)) => self.report(err).await,
            ApiReply::Conversations(Ok(conversations)) => {
                self.conversations = conversations;
                let conversations = self.conversations.clone();
                self.emit(SessionEvent::ConversationsLoaded(conversations))
                    .await;
            }
            ApiReply::Conversations(Err(err)) => {
                self.report(err.into_chat_error(ChatError::HistoryFetchFailure))
                    .await;
            }
            ApiReply::History { ticket, result } => {
                let Some(login) = self.login.as_mut() else {
                    return;
                };
                match result {
                    Ok(messages) => {
                        if login.session.finish_select(ticket, messages) {
                            self.publish_state().await;
                        } else {
                            log::debug!("Discarding superseded history load");
                        }
                    }
                    Err(err) => {
                        login.session.fail_select(&ticket);
                        let err = match err {
                            ApiError::NotFound => ChatError::NotFound(ticket.chat_id().clone()),
                            other => other.into_chat_error(ChatError::HistoryFetchFailure),
                        };
                        self.publish_state().await;
                        self.report(err).await;
                    }
                }
            }
            ApiReply::Deleted { chat_id, result } => match result {
                Ok(()) => {
                    self.conversations.retain(|chat| chat.id != chat_id);
                    let conversations = self.conversations.clone();
                    self.emit(SessionEvent::ConversationsLoaded(conversations))
                        .await;
                    let reset = self
                        .login
                        .as_mut()
                        .is_some_and(|login| login.session.conversation_deleted(&chat_id));
                    if reset {
                        self.publish_state().await;
                    }
                }
                Err(err) => {
                    self.report(err.into_chat_error(ChatError::DeleteFailure))
                        .await;
                }
            },
        }
    }

    async fn handle_reply_timeout(&mut self) {
        let (Some(login), Some(timeout)) = (self.login.as_mut(), self.reply_timeout) else {
            return;
        };
        if let Some(err) = login.session.expire_pending(Instant::now(), timeout) {
            log::warn!("No reply within {}s; releasing the input", timeout.as_secs());
            self.publish_state().await;
            self.emit(SessionEvent::Error(err)).await;
        }
    }

    async fn restore_credential(&mut self) {
        let stored = match &self.credentials {
            Some(db) => db.load(),
            None => Ok(None),
        };

        match stored {
            Ok(Some(credential)) => {
                log::info!("Validating stored credential for {}", credential.user.username);
                let ticket = self.next_login_ticket();
                let auth = Arc::clone(&self.auth);
                let token = credential.token;
                self.spawn_api(async move {
                    let result = auth.current_user(&token).await;
                    ApiReply::Restored {
                        ticket,
                        token,
                        result,
                    }
                });
            }
            Ok(None) => self.emit(SessionEvent::LoggedOut { expired: false }).await,
            Err(err) => {
                log::warn!("Failed to read stored credential: {err}");
                self.emit(SessionEvent::LoggedOut { expired: false }).await;
            }
        }
    }

    async fn establish(&mut self, token: String, user: User) {
        self.generation += 1;
        self.persist_credential(&token, &user).await;

        // a different identity closes the previous connection first
        let status = self.supervisor.open(user.id.clone());
        let mut session = ChatSession::new(user.id.clone());
        session.connection_changed(status, None);
        log::info!("Signed in as {} ({})", user.username, user.id);

        self.login = Some(ActiveLogin {
            token,
            user: user.clone(),
            session,
        });
        self.conversations.clear();

        self.emit(SessionEvent::LoggedIn(user)).await;
        self.publish_state().await;
        self.refresh_conversations();
    }

    /// Closes the connection and discards all session state.
    async fn tear_down(&mut self, expired: bool) {
        self.generation += 1;
        // a login still in flight must not resurrect the session
        self.next_login_ticket();
        self.supervisor.close();
        self.conversations.clear();
        self.forget_credential();
        if let Some(login) = self.login.take() {
            log::info!("Signed out {}", login.user.username);
        }
        self.emit(SessionEvent::LoggedOut { expired }).await;
    }

    async fn report(&mut self, err: ChatError) {
        if err == ChatError::CredentialExpired {
            log::warn!("Credential expired; ending session");
            self.emit(SessionEvent::Error(err)).await;
            self.tear_down(true).await;
        } else {
            self.emit(SessionEvent::Error(err)).await;
        }
    }

    async fn persist_credential(&mut self, token: &str, user: &User) {
        let saved = match &self.credentials {
            Some(db) => db.save(token, user),
            None => Ok(()),
        };
        if let Err(err) = saved {
            log::warn!("Failed to persist credential: {err}");
            self.emit(SessionEvent::Error(err.into())).await;
        }
    }

    fn forget_credential(&self) {
        if let Some(db) = &self.credentials {
            if let Err(err) = db.clear() {
                log::warn!("Failed to clear stored credential: {err}");
            }
        }
    }

    fn next_login_ticket(&mut self) -> u64 {
        self.login_ticket += 1;
        self.login_ticket
    }

    fn token(&self) -> Option<String> {
        self.login.as_ref().map(|login| login.token.clone())
    }

    fn reply_deadline(&self) -> Option<Instant> {
        let timeout = self.reply_timeout?;
        self.login.as_ref()?.session.reply_deadline(timeout)
    }

    fn spawn_api<F>(&self, call: F)
    where
        F: Future<Output = ApiReply> + Send + 'static,
    {
        let sender = self.api_sender.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let reply = call.await;
            let _ = sender.send(ApiResult { generation, reply });
        });
    }

    async fn publish_state(&mut self) {
        let snapshot = self.login.as_ref().map(|login| login.session.snapshot());
        if let Some(state) = snapshot {
            self.emit(SessionEvent::StateChanged(state)).await;
        }
    }

    async fn emit(&mut self, event: SessionEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify front-end: {err}");
        }
    }
}

async fn read_profile_image(path: Option<PathBuf>) -> Result<Option<ProfileImage>, ChatError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        ChatError::ProfileUpdateFailure(format!("cannot read {}: {err}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("avatar")
        .to_string();
    Ok(Some(ProfileImage { file_name, bytes }))
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
