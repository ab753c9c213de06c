//! REST calls used to backfill conversations when they are opened.

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use grindhub_shared::constants::USER_HEADER;
use grindhub_shared::{RoomId, UserId};

use crate::cache::ChatMessage;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    user: UserId,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, user: UserId) -> Result<Self> {
        let base = Url::parse(&config.server_url)
            .map_err(|e| ClientError::Config(format!("server_url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, base, user })
    }

    /// Stored messages of a room the user belongs to, oldest first.
    pub async fn room_history(&self, room_id: RoomId) -> Result<Vec<ChatMessage>> {
        self.get(&["api", "rooms", &room_id.to_string(), "messages"])
            .await
    }

    /// Direct conversation with `other`, oldest first.
    pub async fn direct_history(&self, other: &UserId) -> Result<Vec<ChatMessage>> {
        self.get(&["api", "messages", other.as_str()]).await
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("server_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);

        debug!(url = %url, "GET");
        let resp = self
            .http
            .get(url)
            .header(USER_HEADER, self.user.as_str())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body["error"].as_str().map(str::to_owned))
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}
