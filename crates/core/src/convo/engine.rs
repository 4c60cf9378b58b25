use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::convo::context::{Command, ConvoContext, ResponseCallback, StepCallback};
use crate::convo::dialogue::{Dialogue, QuestionStep, Step};
use crate::convo::session::{
    ConversationStatus, InboundMessage, Responses, Session, SessionId, Variables,
};
use crate::convo::template;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("thread `{0}` is not registered")]
    ThreadNotFound(String),
    #[error("no handler accepted the response in thread `{thread}`")]
    UnhandledResponse { thread: String },
    #[error("callback failed in thread `{thread}`: {message}")]
    CallbackFailure { thread: String, message: String },
    #[error("conversation has already been activated")]
    AlreadyActivated,
    #[error("conversation is not active")]
    NotActive,
    #[error("a conversation is already active for user `{user_id}` in channel `{channel_id}`")]
    SessionAlreadyActive { user_id: String, channel_id: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("sending to channel `{channel_id}` failed: {reason}")]
pub struct SendError {
    pub channel_id: String,
    pub reason: String,
}

/// Outbound text primitive supplied by the chat transport.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), SendError>;
}

/// Where a session stands after the engine returns control to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    AwaitingResponse,
    Finished(ConversationStatus),
    Ignored,
}

/// Final session snapshot handed to `end` listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct EndReport {
    pub session_id: SessionId,
    pub user_id: String,
    pub channel_id: String,
    pub status: ConversationStatus,
    pub thread: String,
    pub vars: Variables,
    pub responses: Responses,
    pub error: Option<ConversationError>,
}

type EndListener = Box<dyn FnOnce(&EndReport) + Send + Sync>;

enum StepOutcome {
    Suspended,
    Finished,
    Command(Command),
}

/// One running dialogue for one user in one channel.
pub struct Conversation {
    dialogue: Arc<Dialogue>,
    sink: Arc<dyn MessageSink>,
    session: Session,
    awaiting: bool,
    end_listeners: Vec<EndListener>,
    error: Option<ConversationError>,
}

impl Conversation {
    pub fn new(
        dialogue: Arc<Dialogue>,
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            dialogue,
            sink,
            session: Session::new(user_id, channel_id),
            awaiting: false,
            end_listeners: Vec::new(),
            error: None,
        }
    }

    pub fn for_message(
        dialogue: Arc<Dialogue>,
        origin: &InboundMessage,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self::new(dialogue, origin.user_id.clone(), origin.channel_id.clone(), sink)
    }

    pub fn id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> ConversationStatus {
        self.session.status
    }

    pub fn vars(&self) -> &Variables {
        &self.session.vars
    }

    pub(crate) fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.sink)
    }

    pub fn error(&self) -> Option<&ConversationError> {
        self.error.as_ref()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting && !self.session.status.is_terminal()
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.session.vars.set(name, value);
    }

    pub fn on_end<F>(&mut self, listener: F)
    where
        F: FnOnce(&EndReport) + Send + Sync + 'static,
    {
        self.end_listeners.push(Box::new(listener));
    }

    pub fn render(&self, text: &str) -> String {
        template::render(text, &self.session.vars, &self.session.responses)
    }

    pub async fn activate(
        &mut self,
        initial_thread: &str,
        greeting: Option<&str>,
    ) -> Result<Progress, ConversationError> {
        if self.session.status != ConversationStatus::Ready {
            return Err(ConversationError::AlreadyActivated);
        }
        if !self.dialogue.has_thread(initial_thread) {
            return Err(ConversationError::ThreadNotFound(initial_thread.to_owned()));
        }

        self.session.status = ConversationStatus::Active;
        info!(
            event_name = "convo.session.activated",
            session_id = %self.session.id,
            user_id = %self.session.user_id,
            channel_id = %self.session.channel_id,
            thread = initial_thread,
            "conversation activated"
        );

        let command = match greeting {
            Some(message) => Command::transition(initial_thread, message),
            None => Command::goto(initial_thread),
        };
        let result = self.apply(command).await;
        Ok(self.settle(result))
    }

    pub async fn transition_to(
        &mut self,
        thread: &str,
        message: &str,
    ) -> Result<Progress, ConversationError> {
        self.run_command(Command::transition(thread, message)).await
    }

    pub async fn goto_thread(&mut self, thread: &str) -> Result<Progress, ConversationError> {
        self.run_command(Command::goto(thread)).await
    }

    /// Sends a templated message right away without touching the cursor.
    pub async fn say(&mut self, text: &str) {
        if self.session.status.is_terminal() {
            return;
        }
        self.send(text).await;
    }

    pub async fn add_message(&mut self, text: &str) {
        self.say(text).await;
    }

    /// Re-sends the pending question prompt. The cursor does not move.
    pub async fn repeat(&mut self) -> Progress {
        if !self.is_awaiting_response() {
            return Progress::Ignored;
        }
        self.send_prompt().await;
        Progress::AwaitingResponse
    }

    pub fn stop(&mut self) -> Progress {
        self.finish(ConversationStatus::Stopped);
        self.progress()
    }

    pub fn time_out(&mut self) -> Progress {
        self.finish(ConversationStatus::Timeout);
        self.progress()
    }

    /// Feeds one captured response to the pending question. Runtime failures
    /// end this session and are reported through the `end` listeners.
    pub async fn handle_response(&mut self, response: &InboundMessage) -> Progress {
        if !self.is_awaiting_response() {
            debug!(
                event_name = "convo.response.ignored",
                session_id = %self.session.id,
                status = self.session.status.as_str(),
                "response arrived while no question was pending"
            );
            return Progress::Ignored;
        }

        let dialogue = Arc::clone(&self.dialogue);
        let Some(question) = current_question(&dialogue, &self.session) else {
            let result = Err(ConversationError::ThreadNotFound(self.session.thread.clone()));
            return self.settle(result);
        };

        if let Some(key) = &question.options.key {
            self.session.vars.set(key.clone(), response.text.clone());
            self.session.responses.insert(key.clone(), response.text.clone());
        }

        let Some(handler) = question.select_handler(&response.text) else {
            let unhandled =
                ConversationError::UnhandledResponse { thread: self.session.thread.clone() };
            warn!(
                event_name = "convo.response.unhandled",
                session_id = %self.session.id,
                thread = %self.session.thread,
                error = %unhandled,
                "no handler matched; re-prompting"
            );
            self.send_prompt().await;
            return Progress::AwaitingResponse;
        };

        debug!(
            event_name = "convo.response.matched",
            session_id = %self.session.id,
            thread = %self.session.thread,
            step = self.session.step,
            pattern = ?handler.pattern,
            "handler selected"
        );

        let callback = Arc::clone(&handler.callback);
        let result = match self.invoke_response(callback.as_ref(), response).await {
            Ok(command) => self.apply(command).await,
            Err(error) => Err(error),
        };
        self.settle(result)
    }

    async fn run_command(&mut self, command: Command) -> Result<Progress, ConversationError> {
        match self.session.status {
            ConversationStatus::Active => {}
            ConversationStatus::Ready => return Err(ConversationError::NotActive),
            _ => return Ok(self.progress()),
        }

        match self.apply(command).await {
            Ok(()) => Ok(self.progress()),
            Err(error) => {
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    async fn apply(&mut self, command: Command) -> Result<(), ConversationError> {
        let mut command = command;
        loop {
            if self.session.status.is_terminal() {
                return Ok(());
            }

            match command {
                Command::Continue => {
                    self.awaiting = false;
                    self.session.step += 1;
                }
                Command::Repeat if self.awaiting => {
                    self.send_prompt().await;
                    return Ok(());
                }
                Command::Repeat => self.session.step += 1,
                Command::Stop => {
                    self.finish(ConversationStatus::Stopped);
                    return Ok(());
                }
                Command::GotoThread(thread) => self.enter_thread(thread, None).await?,
                Command::Transition { thread, message } => {
                    self.enter_thread(thread, Some(message)).await?
                }
            }

            match self.run_steps().await? {
                StepOutcome::Suspended | StepOutcome::Finished => return Ok(()),
                StepOutcome::Command(next) => command = next,
            }
        }
    }

    async fn enter_thread(
        &mut self,
        thread: String,
        message: Option<String>,
    ) -> Result<(), ConversationError> {
        if !self.dialogue.has_thread(&thread) {
            return Err(ConversationError::ThreadNotFound(thread));
        }

        self.awaiting = false;
        if let Some(message) = message {
            self.send(&message).await;
        }

        info!(
            event_name = "convo.thread.entered",
            session_id = %self.session.id,
            from = %self.session.thread,
            to = %thread,
            "entering thread"
        );
        self.session.thread = thread;
        self.session.step = 0;

        if let Some(hook) = self.dialogue.before_hook(&self.session.thread) {
            let mut context = self.context();
            let result = hook.before_thread(&mut context).await;
            self.restore(context, result.is_ok()).await;
            result.map_err(|error| self.callback_failure(error.0))?;
        }
        Ok(())
    }

    async fn run_steps(&mut self) -> Result<StepOutcome, ConversationError> {
        let dialogue = Arc::clone(&self.dialogue);
        loop {
            if self.session.status.is_terminal() {
                return Ok(StepOutcome::Finished);
            }

            let thread = dialogue
                .thread(&self.session.thread)
                .ok_or_else(|| ConversationError::ThreadNotFound(self.session.thread.clone()))?;

            match thread.steps.get(self.session.step) {
                None => {
                    self.finish(ConversationStatus::Completed);
                    return Ok(StepOutcome::Finished);
                }
                Some(Step::Message(message)) => {
                    if let Some(callback) = &message.callback {
                        match self.invoke_step(callback.as_ref()).await? {
                            Command::Continue | Command::Repeat => {}
                            other => return Ok(StepOutcome::Command(other)),
                        }
                    }
                    self.send(&message.template).await;
                    self.session.step += 1;
                }
                Some(Step::Question(question)) => {
                    self.awaiting = true;
                    self.send(&question.prompt).await;
                    return Ok(StepOutcome::Suspended);
                }
            }
        }
    }

    async fn invoke_response(
        &mut self,
        callback: &dyn ResponseCallback,
        response: &InboundMessage,
    ) -> Result<Command, ConversationError> {
        let mut context = self.context();
        let result = callback.on_response(response, &mut context).await;
        self.restore(context, result.is_ok()).await;
        result.map_err(|error| self.callback_failure(error.0))
    }

    async fn invoke_step(
        &mut self,
        callback: &dyn StepCallback,
    ) -> Result<Command, ConversationError> {
        let mut context = self.context();
        let result = callback.before_send(&mut context).await;
        self.restore(context, result.is_ok()).await;
        result.map_err(|error| self.callback_failure(error.0))
    }

    fn context(&mut self) -> ConvoContext {
        ConvoContext {
            session_id: self.session.id.clone(),
            user_id: self.session.user_id.clone(),
            channel_id: self.session.channel_id.clone(),
            thread: self.session.thread.clone(),
            vars: std::mem::take(&mut self.session.vars),
            responses: self.session.responses.clone(),
            outbox: Vec::new(),
        }
    }

    /// Puts callback-mutated variables back and, on success, flushes queued
    /// messages.
    async fn restore(&mut self, context: ConvoContext, flush: bool) {
        self.session.vars = context.vars;
        if flush {
            for text in context.outbox {
                self.send(&text).await;
            }
        }
    }

    fn callback_failure(&self, message: String) -> ConversationError {
        ConversationError::CallbackFailure { thread: self.session.thread.clone(), message }
    }

    async fn send_prompt(&mut self) {
        let dialogue = Arc::clone(&self.dialogue);
        if let Some(question) = current_question(&dialogue, &self.session) {
            self.send(&question.prompt).await;
        }
    }

    async fn send(&self, text: &str) {
        let rendered = self.render(text);
        if let Err(error) = self.sink.send_text(&self.session.channel_id, &rendered).await {
            warn!(
                event_name = "convo.message.send_failed",
                session_id = %self.session.id,
                channel_id = %self.session.channel_id,
                error = %error,
                "failed to send conversation message"
            );
        }
    }

    fn settle(&mut self, result: Result<(), ConversationError>) -> Progress {
        if let Err(error) = result {
            self.fail(error);
        }
        self.progress()
    }

    fn fail(&mut self, error: ConversationError) {
        error!(
            event_name = "convo.session.failed",
            session_id = %self.session.id,
            thread = %self.session.thread,
            error = %error,
            "conversation aborted"
        );
        self.error = Some(error);
        self.finish(ConversationStatus::Stopped);
    }

    fn finish(&mut self, status: ConversationStatus) {
        if self.session.status.is_terminal() {
            return;
        }
        self.session.status = status;
        self.awaiting = false;

        info!(
            event_name = "convo.session.ended",
            session_id = %self.session.id,
            user_id = %self.session.user_id,
            channel_id = %self.session.channel_id,
            status = status.as_str(),
            "conversation ended"
        );

        let report = EndReport {
            session_id: self.session.id.clone(),
            user_id: self.session.user_id.clone(),
            channel_id: self.session.channel_id.clone(),
            status,
            thread: self.session.thread.clone(),
            vars: self.session.vars.clone(),
            responses: self.session.responses.clone(),
            error: self.error.clone(),
        };
        for listener in self.end_listeners.drain(..) {
            listener(&report);
        }
    }

    fn progress(&self) -> Progress {
        if self.session.status.is_terminal() {
            Progress::Finished(self.session.status)
        } else if self.session.status == ConversationStatus::Active && self.awaiting {
            Progress::AwaitingResponse
        } else {
            Progress::Ignored
        }
    }
}

fn current_question<'a>(dialogue: &'a Dialogue, session: &Session) -> Option<&'a QuestionStep> {
    match dialogue.thread(&session.thread)?.steps.get(session.step)? {
        Step::Question(question) => Some(question),
        Step::Message(_) => None,
    }
}
