//! REST collaborators: the chat list and the user list.

use parley::data_model::{Chat, User};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::FetchError;

#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /chat?populate=true`, authenticated with the session token.
    async fn fetch_chats(&self, token: &str) -> Result<Vec<Chat>, FetchError>;

    /// `GET /users`
    async fn fetch_users(&self) -> Result<Vec<User>, FetchError>;
}

#[derive(Deserialize)]
struct ChatsResponse {
    chats: Vec<Value>,
}

#[derive(Deserialize)]
struct UsersResponse {
    users: Vec<Value>,
}

/// Decodes list items one by one, so a single odd document doesn't take the whole list with it.
fn decode_each<T: DeserializeOwned>(items: Vec<Value>, kind: &str) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("Skipping {kind} that could not be decoded: {e}");
                None
            }
        })
        .collect()
}

pub struct HttpChatApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpChatApi {
    pub fn new(base: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }
}

#[async_trait::async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_chats(&self, token: &str) -> Result<Vec<Chat>, FetchError> {
        let response: ChatsResponse = self
            .client
            .get(self.url("chat"))
            .query(&[("populate", "true")])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(decode_each(response.chats, "chat"))
    }

    async fn fetch_users(&self) -> Result<Vec<User>, FetchError> {
        let response: UsersResponse = self
            .client
            .get(self.url("users"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(decode_each(response.users, "user"))
    }
}
