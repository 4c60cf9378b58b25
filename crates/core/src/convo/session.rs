use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound chat message, already stripped of transport details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
    pub timestamp: String,
}

impl InboundMessage {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.user_id, &self.channel_id)
    }
}

/// Routing key for pending sessions: one conversation per user per channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub user_id: String,
    pub channel_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), channel_id: channel_id.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Ready,
    Active,
    Completed,
    Stopped,
    Timeout,
}

impl ConversationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Timeout => "timeout",
        }
    }
}

/// Session variables. Values can be overwritten but never removed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Resolves a dotted path such as `curRashi.ref` or `commentary.0.text`.
    pub fn lookup_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let root = self.values.get(segments.next()?)?;
        segments.try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Raw answers captured by questions that declare a `key`.
pub type Responses = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub channel_id: String,
    pub vars: Variables,
    pub responses: Responses,
    pub thread: String,
    pub step: usize,
    pub status: ConversationStatus,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: SessionId::generate(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            vars: Variables::default(),
            responses: Responses::new(),
            thread: String::new(),
            step: 0,
            status: ConversationStatus::Ready,
            started_at: Utc::now(),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.user_id, &self.channel_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConversationStatus, Session, Variables};

    #[test]
    fn variables_overwrite_in_place() {
        let mut vars = Variables::default();
        vars.set("nickname", "Ari");
        vars.set("nickname", "Dana");

        assert_eq!(vars.get_str("nickname"), Some("Dana"));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn lookup_path_walks_objects_and_arrays() {
        let mut vars = Variables::default();
        vars.set(
            "commentary",
            json!([{ "ref": "Rashi on Genesis 1:1:1", "text": "In the beginning" }]),
        );

        assert_eq!(
            vars.lookup_path("commentary.0.ref").and_then(|v| v.as_str()),
            Some("Rashi on Genesis 1:1:1")
        );
        assert!(vars.lookup_path("commentary.3.ref").is_none());
        assert!(vars.lookup_path("missing.path").is_none());
    }

    #[test]
    fn new_session_is_ready_and_not_terminal() {
        let session = Session::new("U1", "D1");
        assert_eq!(session.status, ConversationStatus::Ready);
        assert!(!session.status.is_terminal());
        assert!(ConversationStatus::Timeout.is_terminal());
        assert_eq!(session.key().user_id, "U1");
    }
}
