use std::{collections::HashMap, sync::Arc, sync::LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use chavruta_core::convo::InboundMessage;

static LEADING_MENTION: LazyLock<Regex> =
    LazyLock::new(|| compile_mention(r"^\s*<@[A-Z0-9]+(?:\|[^>]*)?>[:,]?\s*"));
static ANY_MENTION: LazyLock<Regex> =
    LazyLock::new(|| compile_mention(r"<@[A-Z0-9]+(?:\|[^>]*)?>"));

fn compile_mention(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("invalid mention pattern `{pattern}`: {err}"),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

/// How the bot was addressed. `Ambient` is channel chatter that does not
/// mention anyone; it can only answer a pending conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DirectMessage,
    DirectMention,
    Mention,
    Ambient,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    pub kind: MessageKind,
}

impl MessageEvent {
    /// Engine-facing message. A leading `<@U…>` mention is removed so that
    /// `@bot hello` and `hello` read the same.
    pub fn to_inbound(&self) -> InboundMessage {
        let text = LEADING_MENTION.replace(&self.text, "");
        InboundMessage::new(&self.user_id, &self.channel_id, text.trim(), &self.ts)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("socket payload is missing `{0}`")]
    MissingField(&'static str),
}

impl SlackEnvelope {
    /// Parses a Socket Mode `events_api` frame. Events the bot does not listen
    /// to come back as [`SlackEvent::Unsupported`].
    pub fn from_socket_payload(raw: &Value) -> Result<Self, EnvelopeError> {
        let envelope_id = raw
            .get("envelope_id")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("envelope_id"))?
            .to_owned();
        let envelope_type = raw.get("type").and_then(Value::as_str).unwrap_or("unknown");
        if envelope_type != "events_api" {
            return Ok(Self {
                envelope_id,
                event: SlackEvent::Unsupported { event_type: envelope_type.to_owned() },
            });
        }

        let event = raw
            .get("payload")
            .and_then(|payload| payload.get("event"))
            .ok_or(EnvelopeError::MissingField("payload.event"))?;

        Ok(Self { envelope_id, event: parse_event(event) })
    }
}

fn parse_event(event: &Value) -> SlackEvent {
    let str_field = |name: &str| event.get(name).and_then(Value::as_str);
    let event_type = str_field("type").unwrap_or("unknown");
    let unsupported = || SlackEvent::Unsupported { event_type: event_type.to_owned() };

    if str_field("subtype").is_some() || str_field("bot_id").is_some() {
        return unsupported();
    }

    let (Some(channel_id), Some(user_id), Some(text), Some(ts)) =
        (str_field("channel"), str_field("user"), str_field("text"), str_field("ts"))
    else {
        return unsupported();
    };

    let kind = match (event_type, str_field("channel_type")) {
        ("message", Some("im")) => MessageKind::DirectMessage,
        // Mentions in channels arrive again as `app_mention`.
        ("message", Some("channel" | "group" | "mpim")) if !ANY_MENTION.is_match(text) => {
            MessageKind::Ambient
        }
        ("app_mention", _) if LEADING_MENTION.is_match(text) => MessageKind::DirectMention,
        ("app_mention", _) => MessageKind::Mention,
        _ => return unsupported(),
    };

    SlackEvent::Message(MessageEvent {
        channel_id: channel_id.to_owned(),
        user_id: user_id.to_owned(),
        text: text.to_owned(),
        ts: ts.to_owned(),
        kind,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// `Responded` carries a reply the runner posts back to the event's channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(String),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<String>, EventHandlerError>;
}

pub struct MessageHandler<S> {
    service: S,
}

impl<S> MessageHandler<S>
where
    S: MessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.service.handle_message(event, ctx).await?;
        Ok(match reply {
            Some(text) => HandlerResult::Responded(text),
            None => HandlerResult::Processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::{
        EventContext, EventDispatcher, EventHandlerError, HandlerResult, MessageEvent,
        MessageHandler, MessageKind, MessageService, SlackEnvelope, SlackEvent,
    };

    struct EchoService;

    #[async_trait]
    impl MessageService for EchoService {
        async fn handle_message(
            &self,
            event: &MessageEvent,
            _ctx: &EventContext,
        ) -> Result<Option<String>, EventHandlerError> {
            let inbound = event.to_inbound();
            if inbound.text.is_empty() {
                return Ok(None);
            }
            Ok(Some(format!("echo: {}", inbound.text)))
        }
    }

    fn direct_message(text: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "env-1".to_owned(),
            event: SlackEvent::Message(MessageEvent {
                channel_id: "D1".to_owned(),
                user_id: "U1".to_owned(),
                text: text.to_owned(),
                ts: "1730000000.0001".to_owned(),
                kind: MessageKind::DirectMessage,
            }),
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_messages_to_service() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(MessageHandler::new(EchoService));

        let result = dispatcher
            .dispatch(&direct_message("<@UBOT> hello"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Responded("echo: hello".to_owned()));
        assert_eq!(dispatcher.handler_count(), 1);
    }

    #[tokio::test]
    async fn service_without_reply_is_processed() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(MessageHandler::new(EchoService));

        let result = dispatcher
            .dispatch(&direct_message("<@UBOT>"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .dispatch(&direct_message("hello"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn to_inbound_strips_only_the_leading_mention() {
        let event = MessageEvent {
            channel_id: "C1".to_owned(),
            user_id: "U1".to_owned(),
            text: "<@U0BOT|chavruta>: call me <@U2>".to_owned(),
            ts: "1.2".to_owned(),
            kind: MessageKind::DirectMention,
        };

        let inbound = event.to_inbound();
        assert_eq!(inbound.text, "call me <@U2>");
        assert_eq!(inbound.user_id, "U1");
        assert_eq!(inbound.channel_id, "C1");
    }

    #[test]
    fn parses_direct_message_frame() {
        let frame = json!({
            "envelope_id": "env-7",
            "type": "events_api",
            "payload": { "event": {
                "type": "message", "channel_type": "im", "channel": "D7",
                "user": "U7", "text": "hi", "ts": "1730000000.0007"
            }}
        });

        let envelope = SlackEnvelope::from_socket_payload(&frame).expect("parse");
        assert_eq!(envelope.envelope_id, "env-7");
        assert!(matches!(
            envelope.event,
            SlackEvent::Message(MessageEvent { kind: MessageKind::DirectMessage, .. })
        ));
    }

    #[test]
    fn classifies_app_mentions_by_position() {
        let mention = |text: &str| {
            json!({
                "envelope_id": "env-8",
                "type": "events_api",
                "payload": { "event": {
                    "type": "app_mention", "channel": "C8", "user": "U8",
                    "text": text, "ts": "1730000000.0008"
                }}
            })
        };

        let direct = SlackEnvelope::from_socket_payload(&mention("<@UBOT> uptime")).expect("parse");
        let inline =
            SlackEnvelope::from_socket_payload(&mention("hey <@UBOT> uptime")).expect("parse");

        assert!(matches!(
            direct.event,
            SlackEvent::Message(MessageEvent { kind: MessageKind::DirectMention, .. })
        ));
        assert!(matches!(
            inline.event,
            SlackEvent::Message(MessageEvent { kind: MessageKind::Mention, .. })
        ));
    }

    #[test]
    fn plain_channel_messages_are_ambient() {
        let channel_message = |text: &str| {
            json!({
                "envelope_id": "env-11",
                "type": "events_api",
                "payload": { "event": {
                    "type": "message", "channel_type": "channel", "channel": "C1",
                    "user": "U1", "text": text, "ts": "1730000000.0011"
                }}
            })
        };

        let reply = SlackEnvelope::from_socket_payload(&channel_message("Dana")).expect("parse");
        assert!(matches!(
            reply.event,
            SlackEvent::Message(MessageEvent { kind: MessageKind::Ambient, ref text, .. })
                if text == "Dana"
        ));

        let mention =
            SlackEnvelope::from_socket_payload(&channel_message("<@UBOT> hello")).expect("parse");
        assert_eq!(mention.event, SlackEvent::Unsupported { event_type: "message".to_owned() });
    }

    #[test]
    fn bot_messages_and_edits_are_unsupported() {
        let frame = json!({
            "envelope_id": "env-9",
            "type": "events_api",
            "payload": { "event": {
                "type": "message", "subtype": "bot_message", "channel_type": "im",
                "channel": "D9", "text": "Hello.", "ts": "1.0", "bot_id": "B1"
            }}
        });

        let envelope = SlackEnvelope::from_socket_payload(&frame).expect("parse");
        assert_eq!(envelope.event, SlackEvent::Unsupported { event_type: "message".to_owned() });
    }

    #[test]
    fn non_event_frames_are_unsupported_and_missing_ids_fail() {
        let hello = json!({ "envelope_id": "env-10", "type": "slash_commands" });
        let envelope = SlackEnvelope::from_socket_payload(&hello).expect("parse");
        assert_eq!(
            envelope.event,
            SlackEvent::Unsupported { event_type: "slash_commands".to_owned() }
        );

        assert!(SlackEnvelope::from_socket_payload(&json!({ "type": "events_api" })).is_err());
    }
}
