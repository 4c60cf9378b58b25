use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::convo::session::{InboundMessage, Responses, SessionId, Variables};

/// Control flow requested by a callback. The engine applies it after the
/// callback returns and after any queued messages are sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Continue,
    GotoThread(String),
    Transition { thread: String, message: String },
    Repeat,
    Stop,
}

impl Command {
    pub fn goto(thread: impl Into<String>) -> Self {
        Self::GotoThread(thread.into())
    }

    pub fn transition(thread: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transition { thread: thread.into(), message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The view of a session handed to callbacks and hooks.
#[derive(Debug)]
pub struct ConvoContext {
    pub session_id: SessionId,
    pub user_id: String,
    pub channel_id: String,
    pub thread: String,
    pub(crate) vars: Variables,
    pub(crate) responses: Responses,
    pub(crate) outbox: Vec<String>,
}

impl ConvoContext {
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.set(name, value);
    }

    pub fn vars(&self) -> &Variables {
        &self.vars
    }

    /// Raw answer captured by the question with the given `key`.
    pub fn extract_response(&self, key: &str) -> Option<&str> {
        self.responses.get(key).map(String::as_str)
    }

    /// Queues a templated message, rendered and sent before the returned
    /// command is applied.
    pub fn say(&mut self, text: impl Into<String>) {
        self.outbox.push(text.into());
    }

    pub fn add_message(&mut self, text: impl Into<String>) {
        self.say(text);
    }

    pub fn queued(&self) -> &[String] {
        &self.outbox
    }
}

#[async_trait]
pub trait ResponseCallback: Send + Sync {
    async fn on_response(
        &self,
        response: &InboundMessage,
        convo: &mut ConvoContext,
    ) -> Result<Command, CallbackError>;
}

/// Runs before a message step renders.
#[async_trait]
pub trait StepCallback: Send + Sync {
    async fn before_send(&self, convo: &mut ConvoContext) -> Result<Command, CallbackError>;
}

/// Runs on every entry into a thread, before its first step.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before_thread(&self, convo: &mut ConvoContext) -> Result<(), CallbackError>;
}

pub struct FnResponse<F>(F);

pub fn response_fn<F>(callback: F) -> FnResponse<F>
where
    F: Fn(&InboundMessage, &mut ConvoContext) -> Result<Command, CallbackError> + Send + Sync,
{
    FnResponse(callback)
}

#[async_trait]
impl<F> ResponseCallback for FnResponse<F>
where
    F: Fn(&InboundMessage, &mut ConvoContext) -> Result<Command, CallbackError> + Send + Sync,
{
    async fn on_response(
        &self,
        response: &InboundMessage,
        convo: &mut ConvoContext,
    ) -> Result<Command, CallbackError> {
        (self.0)(response, convo)
    }
}

pub struct FnStep<F>(F);

pub fn step_fn<F>(callback: F) -> FnStep<F>
where
    F: Fn(&mut ConvoContext) -> Result<Command, CallbackError> + Send + Sync,
{
    FnStep(callback)
}

#[async_trait]
impl<F> StepCallback for FnStep<F>
where
    F: Fn(&mut ConvoContext) -> Result<Command, CallbackError> + Send + Sync,
{
    async fn before_send(&self, convo: &mut ConvoContext) -> Result<Command, CallbackError> {
        (self.0)(convo)
    }
}

pub struct FnHook<F>(F);

pub fn hook_fn<F>(hook: F) -> FnHook<F>
where
    F: Fn(&mut ConvoContext) -> Result<(), CallbackError> + Send + Sync,
{
    FnHook(hook)
}

#[async_trait]
impl<F> BeforeHook for FnHook<F>
where
    F: Fn(&mut ConvoContext) -> Result<(), CallbackError> + Send + Sync,
{
    async fn before_thread(&self, convo: &mut ConvoContext) -> Result<(), CallbackError> {
        (self.0)(convo)
    }
}
