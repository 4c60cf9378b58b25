use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use chavruta_core::convo::{MessageSink, SendError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack http request failed: {0}")]
    Http(String),
    #[error("slack api `{method}` returned error `{error}`")]
    Api { method: String, error: String },
    #[error("slack api response could not be decoded: {0}")]
    Decode(String),
}

/// The slice of the Slack Web API the bot needs.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError>;
    async fn add_reaction(
        &self,
        channel_id: &str,
        timestamp: &str,
        name: &str,
    ) -> Result<(), SlackApiError>;
}

pub struct WebApiClient {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl WebApiClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SlackApiError::Http(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, base_url, bot_token })
    }

    async fn call(&self, method: &str, body: Value) -> Result<(), SlackApiError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| SlackApiError::Http(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SlackApiError::Http(format!("`{method}` returned {}", response.status())));
        }

        let payload: ApiResponse =
            response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
        debug!(event_name = "egress.slack.api_call", method, ok = payload.ok, "slack api call");
        payload.into_result(method)
    }
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError> {
        self.call("chat.postMessage", json!({ "channel": channel_id, "text": text })).await
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        timestamp: &str,
        name: &str,
    ) -> Result<(), SlackApiError> {
        self.call(
            "reactions.add",
            json!({ "channel": channel_id, "timestamp": timestamp, "name": name }),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
}

impl ApiResponse {
    fn into_result(self, method: &str) -> Result<(), SlackApiError> {
        if self.ok {
            return Ok(());
        }
        Err(SlackApiError::Api {
            method: method.to_owned(),
            error: self.error.unwrap_or_else(|| "unknown_error".to_owned()),
        })
    }
}

/// Accepts every call. Used when no bot token is wired in.
#[derive(Default)]
pub struct NoopSlackApi;

#[async_trait]
impl SlackApi for NoopSlackApi {
    async fn post_message(&self, _channel_id: &str, _text: &str) -> Result<(), SlackApiError> {
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel_id: &str,
        _timestamp: &str,
        _name: &str,
    ) -> Result<(), SlackApiError> {
        Ok(())
    }
}

/// Adapts a [`SlackApi`] to the conversation engine's outbound primitive.
#[derive(Clone)]
pub struct SlackMessageSink {
    api: Arc<dyn SlackApi>,
}

impl SlackMessageSink {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MessageSink for SlackMessageSink {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), SendError> {
        self.api.post_message(channel_id, text).await.map_err(|error| SendError {
            channel_id: channel_id.to_owned(),
            reason: error.to_string(),
        })
    }
}
