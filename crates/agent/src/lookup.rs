//! Remote text lookup.
//!
//! The bot fetches a verse and its commentary by reference string
//! (`Genesis 1:1`). Any failure reaches the dialogue as "nothing found".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("invalid lookup url: {0}")]
    Url(String),
    #[error("lookup request failed: {0}")]
    Http(String),
    #[error("lookup response could not be decoded: {0}")]
    Decode(String),
}

/// One commentary entry linked to a verse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentary {
    #[serde(rename = "ref", default)]
    pub reference: String,
    #[serde(default, deserialize_with = "flatten_text")]
    pub text: String,
    #[serde(default, deserialize_with = "flatten_text")]
    pub he: String,
}

impl Commentary {
    pub fn is_rashi(&self) -> bool {
        self.reference.contains("Rashi")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TextRecord {
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "flatten_text")]
    pub text: String,
    #[serde(default, deserialize_with = "flatten_text")]
    pub he: String,
    #[serde(default)]
    pub commentary: Vec<Commentary>,
}

impl TextRecord {
    /// True when neither the English nor the Hebrew text came back.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.he.trim().is_empty()
    }

    pub fn rashis(&self) -> Vec<Commentary> {
        self.commentary.iter().filter(|entry| entry.is_rashi()).cloned().collect()
    }
}

/// Texts arrive as a string, a list of strings, or nested lists for ranges.
fn flatten_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    fn collect(value: &Value, parts: &mut Vec<String>) {
        match value {
            Value::String(text) if !text.trim().is_empty() => parts.push(text.clone()),
            Value::Array(items) => items.iter().for_each(|item| collect(item, parts)),
            _ => {}
        }
    }

    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    let mut parts = Vec::new();
    collect(&value, &mut parts);
    Ok(parts.join(" "))
}

#[async_trait]
pub trait TextLookup: Send + Sync {
    async fn lookup(&self, reference: &str) -> Result<TextRecord, LookupError>;
}

pub struct SefariaClient {
    client: Client,
    base_url: String,
}

impl SefariaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LookupError::Http(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

/// `{base}/api/texts/{reference}?context=0&commentary=1`, with the reference
/// percent-encoded as a single path segment.
pub fn texts_url(base_url: &str, reference: &str) -> Result<Url, LookupError> {
    let mut url = Url::parse(base_url).map_err(|error| LookupError::Url(error.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| LookupError::Url(format!("`{base_url}` cannot be a base url")))?
        .pop_if_empty()
        .extend(["api", "texts", reference.trim()]);
    url.query_pairs_mut().append_pair("context", "0").append_pair("commentary", "1");
    Ok(url)
}

#[async_trait]
impl TextLookup for SefariaClient {
    async fn lookup(&self, reference: &str) -> Result<TextRecord, LookupError> {
        let url = texts_url(&self.base_url, reference)?;
        debug!(event_name = "egress.lookup.request", url = %url, "fetching text");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| LookupError::Http(error.to_string()))?;
        if !response.status().is_success() {
            return Err(LookupError::Http(format!("lookup returned {}", response.status())));
        }

        response.json::<TextRecord>().await.map_err(|error| LookupError::Decode(error.to_string()))
    }
}
