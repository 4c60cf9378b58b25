use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use chavruta_core::convo::{
    Conversation, ConversationError, Dialogue, DialogueError, InboundMessage, MessageSink,
    SessionManager,
};
use chavruta_core::domain::user::{UserId, UserRecord};
use chavruta_core::errors::ApplicationError;
use chavruta_db::{RepositoryError, UserRepository};
use chavruta_slack::api::{SlackApi, SlackMessageSink};
use chavruta_slack::events::{EventContext, EventHandlerError, MessageEvent, MessageService};
use chavruta_slack::hears::{TriggerRouter, ALL_KINDS};

use crate::identity::Identity;
use crate::lookup::TextLookup;
use crate::shutdown::{
    build_shutdown_dialogue, ShutdownListener, ShutdownSignal, CONFIRM_SHUTDOWN,
};
use crate::study::{build_study_dialogue, study_conversation};

pub const GREETING_REACTION: &str = "robot_face";

#[derive(Debug, Error)]
pub enum BotError {
    #[error("dialogue registration failed: {0}")]
    Dialogue(#[from] DialogueError),
    #[error("trigger pattern is invalid: {0}")]
    Trigger(#[from] regex::Error),
    #[error("conversation could not start: {0}")]
    Conversation(#[from] ConversationError),
    #[error("user store failed: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<BotError> for ApplicationError {
    fn from(error: BotError) -> Self {
        match error {
            BotError::Dialogue(error) => Self::Dialogue(error),
            BotError::Conversation(error) => Self::Conversation(error),
            BotError::Repository(error) => Self::Persistence(error.to_string()),
            BotError::Trigger(error) => Self::Configuration(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub bot_name: String,
    pub idle_timeout: Duration,
    pub shutdown_delay: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            bot_name: "chavruta".to_owned(),
            idle_timeout: Duration::from_secs(600),
            shutdown_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    Greet,
    CallMe,
    Shutdown,
    Identify,
}

/// Routes every inbound message: first to the user's pending session, then
/// to the first trigger whose pattern matches.
pub struct BotRuntime {
    sessions: SessionManager,
    api: Arc<dyn SlackApi>,
    sink: Arc<dyn MessageSink>,
    users: Arc<dyn UserRepository>,
    study: Arc<Dialogue>,
    shutdown: Arc<Dialogue>,
    triggers: TriggerRouter<Trigger>,
    identity: Identity,
    signal: ShutdownSignal,
}

impl BotRuntime {
    pub fn new(
        settings: RuntimeSettings,
        api: Arc<dyn SlackApi>,
        users: Arc<dyn UserRepository>,
        lookup: Arc<dyn TextLookup>,
    ) -> Result<(Self, ShutdownListener), BotError> {
        let (signal, listener) = ShutdownSignal::new();
        let study = build_study_dialogue(lookup, Arc::clone(&users))?;
        let shutdown = build_shutdown_dialogue(signal.clone(), settings.shutdown_delay)?;

        let mut triggers = TriggerRouter::new();
        triggers
            .hears(&[r"\b(hello|hi|hey)\b"], ALL_KINDS, Trigger::Greet)?
            .hears(&["call me (.*)", "my name is (.*)"], ALL_KINDS, Trigger::CallMe)?
            .hears(&["shutdown"], ALL_KINDS, Trigger::Shutdown)?
            .hears(
                &["uptime", "identify yourself", "who are you", "what is your name"],
                ALL_KINDS,
                Trigger::Identify,
            )?;

        let sink: Arc<dyn MessageSink> = Arc::new(SlackMessageSink::new(Arc::clone(&api)));
        let runtime = Self {
            sessions: SessionManager::new(settings.idle_timeout),
            api,
            sink,
            users,
            study: Arc::new(study),
            shutdown: Arc::new(shutdown),
            triggers,
            identity: Identity::new(settings.bot_name),
            signal,
        };
        Ok((runtime, listener))
    }

    pub fn sessions(&self) -> SessionManager {
        self.sessions.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    async fn greet(&self, event: &MessageEvent, inbound: &InboundMessage) -> Result<(), BotError> {
        if let Err(error) =
            self.api.add_reaction(&event.channel_id, &event.ts, GREETING_REACTION).await
        {
            warn!(
                event_name = "bot.greeting.reaction_failed",
                channel_id = %event.channel_id,
                error = %error,
                "failed to add greeting reaction"
            );
        }

        let user = match self.users.get(&UserId(inbound.user_id.clone())).await {
            Ok(user) => user,
            Err(error) => {
                warn!(
                    event_name = "bot.greeting.user_lookup_failed",
                    user_id = %inbound.user_id,
                    error = %error,
                    "continuing without a stored nickname"
                );
                None
            }
        };

        let (conversation, thread, greeting) = study_conversation(
            Arc::clone(&self.study),
            inbound,
            user.as_ref(),
            Arc::clone(&self.sink),
        );
        self.sessions.start(conversation, thread, Some(&greeting)).await?;
        Ok(())
    }

    async fn call_me(&self, inbound: &InboundMessage, name: &str) -> Result<String, BotError> {
        let id = UserId(inbound.user_id.clone());
        let mut record =
            self.users.get(&id).await?.unwrap_or_else(|| UserRecord::new(id.0.clone()));
        record.name = Some(name.to_owned());
        self.users.save(record).await?;

        info!(event_name = "bot.nickname.saved", user_id = %inbound.user_id, "nickname stored");
        Ok(format!("Got it. I will call you {name} from now on."))
    }

    async fn confirm_shutdown(&self, inbound: &InboundMessage) -> Result<(), BotError> {
        let conversation =
            Conversation::for_message(Arc::clone(&self.shutdown), inbound, Arc::clone(&self.sink));
        self.sessions.start(conversation, CONFIRM_SHUTDOWN, None).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageService for BotRuntime {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<String>, EventHandlerError> {
        let inbound = event.to_inbound();
        if self.sessions.route(&inbound).await {
            debug!(
                event_name = "bot.message.routed",
                correlation_id = %ctx.correlation_id,
                user_id = %inbound.user_id,
                channel_id = %inbound.channel_id,
                "delivered to pending session"
            );
            return Ok(None);
        }

        let Some(matched) = self.triggers.route(&inbound.text, event.kind) else {
            debug!(
                event_name = "bot.message.unmatched",
                correlation_id = %ctx.correlation_id,
                user_id = %inbound.user_id,
                "no trigger matched"
            );
            return Ok(None);
        };

        debug!(
            event_name = "bot.trigger.matched",
            correlation_id = %ctx.correlation_id,
            trigger = ?matched.action,
            "trigger fired"
        );
        let reply = match matched.action {
            Trigger::Greet => self.greet(event, &inbound).await.map(|()| None),
            Trigger::CallMe => {
                let name = matched.captures.first().map(|name| name.trim()).unwrap_or_default();
                self.call_me(&inbound, name).await.map(Some)
            }
            Trigger::Shutdown => self.confirm_shutdown(&inbound).await.map(|()| None),
            Trigger::Identify => Ok(Some(self.identity.reply())),
        };
        match reply {
            Ok(reply) => Ok(reply),
            Err(error) => {
                let error =
                    ApplicationError::from(error).into_interface(ctx.correlation_id.clone());
                warn!(
                    event_name = "bot.trigger.failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %inbound.user_id,
                    error = %error,
                    "trigger action failed"
                );
                Ok(Some(error.user_message().to_owned()))
            }
        }
    }
}
