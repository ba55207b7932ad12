use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::common::{ChatError, ChatId, ChatSummary, PersistedMessage, User, UserId};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("credential rejected by server")]
    Unauthorized,
    #[error("resource not found")]
    NotFound,
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Maps a REST failure onto the session taxonomy; 401 always means the credential expired.
    pub fn into_chat_error(self, wrap: impl FnOnce(String) -> ChatError) -> ChatError {
        match self {
            ApiError::Unauthorized => ChatError::CredentialExpired,
            other => wrap(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Some endpoints wrap their payload in `{ "data": .. }`, others return it bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeEnveloped<T> {
    Wrapped(Envelope<T>),
    Bare(T),
}

impl<T> MaybeEnveloped<T> {
    fn into_inner(self) -> T {
        match self {
            MaybeEnveloped::Wrapped(envelope) => envelope.data,
            MaybeEnveloped::Bare(value) => value,
        }
    }
}

/// Avatar file uploaded with a profile update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;
    async fn current_user(&self, token: &str) -> Result<User, ApiError>;
    async fn update_profile(
        &self,
        token: &str,
        user_id: &UserId,
        name: &str,
        image: Option<ProfileImage>,
    ) -> Result<User, ApiError>;
}

/// Server-side chat history. Every call carries the bearer token.
#[async_trait]
pub trait HistoryLoader: Send + Sync {
    async fn list_conversations(&self, token: &str) -> Result<Vec<ChatSummary>, ApiError>;
    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &ChatId,
    ) -> Result<Vec<PersistedMessage>, ApiError>;
    async fn delete_conversation(&self, token: &str, chat_id: &ChatId) -> Result<(), ApiError>;
}

pub struct RestApi {
    http: reqwest::Client,
    base_url: String,
}

impl RestApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        // validate once so endpoint() only fails on odd ids
        Url::parse(base_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    /// `{base}/{collection}/{id}` with the id percent-encoded as one segment.
    fn item_endpoint(&self, collection: &str, id: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(collection)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(id);
        Ok(url)
    }

    async fn get_data<T: DeserializeOwned>(&self, url: Url, token: &str) -> Result<T, ApiError> {
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let envelope: Envelope<T> = check(response).await?.json().await?;
        Ok(envelope.data)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        status if status.is_success() => Ok(response),
        status => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|body| body.message)
                .unwrap_or(body);
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl AuthService for RestApi {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let url = self.endpoint("user/login")?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        let url = self.endpoint("user/current")?;
        self.get_data(url, token).await
    }

    async fn update_profile(
        &self,
        token: &str,
        user_id: &UserId,
        name: &str,
        image: Option<ProfileImage>,
    ) -> Result<User, ApiError> {
        let url = self.item_endpoint("user", user_id.as_str())?;
        let mut form = Form::new().text("name", name.to_string());
        if let Some(image) = image {
            form = form.part("image", Part::bytes(image.bytes).file_name(image.file_name));
        }

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let body: MaybeEnveloped<User> = check(response).await?.json().await?;
        Ok(body.into_inner())
    }
}

#[async_trait]
impl HistoryLoader for RestApi {
    async fn list_conversations(&self, token: &str) -> Result<Vec<ChatSummary>, ApiError> {
        let url = self.endpoint("chat")?;
        self.get_data(url, token).await
    }

    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &ChatId,
    ) -> Result<Vec<PersistedMessage>, ApiError> {
        let url = self.item_endpoint("chat", chat_id.as_str())?;
        self.get_data(url, token).await
    }

    async fn delete_conversation(&self, token: &str, chat_id: &ChatId) -> Result<(), ApiError> {
        let url = self.item_endpoint("chat", chat_id.as_str())?;
        let response = self.http.delete(url).bearer_auth(token).send().await?;
        check(response).await?;
        Ok(())
    }
}
