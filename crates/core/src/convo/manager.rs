//! Runs many conversations side by side.
//!
//! Every session gets its own task and an ordered inbox keyed by
//! `(user_id, channel_id)`. Responses for one session are handled one at a
//! time in delivery order; sessions share nothing but the routing table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::convo::engine::{Conversation, ConversationError, Progress};
use crate::convo::session::{ConversationStatus, InboundMessage, SessionId, SessionKey};

/// Sent to the user when a session task dies unexpectedly.
pub const APOLOGY_TEXT: &str = "Sorry, something went wrong on my end. Let's start over later.";

const INBOX_CAPACITY: usize = 32;

enum SessionInput {
    Response(InboundMessage),
    Stop,
}

struct SessionHandle {
    session_id: SessionId,
    inbox: mpsc::Sender<SessionInput>,
}

type SessionTable = Arc<RwLock<HashMap<SessionKey, SessionHandle>>>;

#[derive(Clone)]
pub struct SessionManager {
    sessions: SessionTable,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { sessions: Arc::default(), idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Activates `conversation` and, if it is waiting for an answer, hands it
    /// to a dedicated task. Activation errors are returned to the caller.
    pub async fn start(
        &self,
        mut conversation: Conversation,
        initial_thread: &str,
        greeting: Option<&str>,
    ) -> Result<Progress, ConversationError> {
        let key = conversation.session().key();
        let session_id = conversation.id().clone();
        let (inbox, receiver) = mpsc::channel(INBOX_CAPACITY);

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&key) {
                return Err(ConversationError::SessionAlreadyActive {
                    user_id: key.user_id,
                    channel_id: key.channel_id,
                });
            }
            sessions.insert(key.clone(), SessionHandle { session_id: session_id.clone(), inbox });
        }

        let progress = match conversation.activate(initial_thread, greeting).await {
            Ok(progress) => progress,
            Err(error) => {
                remove_if_current(&self.sessions, &key, &session_id).await;
                return Err(error);
            }
        };
        if progress != Progress::AwaitingResponse {
            remove_if_current(&self.sessions, &key, &session_id).await;
            return Ok(progress);
        }

        let sink = conversation.sink();
        let task = tokio::spawn(run_session(conversation, receiver, self.idle_timeout));
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let outcome = task.await;
            remove_if_current(&sessions, &key, &session_id).await;

            match outcome {
                Ok(status) => debug!(
                    event_name = "convo.manager.session_closed",
                    session_id = %session_id,
                    status = status.as_str(),
                    "session task finished"
                ),
                Err(join_error) => {
                    error!(
                        event_name = "convo.manager.session_crashed",
                        session_id = %session_id,
                        user_id = %key.user_id,
                        channel_id = %key.channel_id,
                        error = %join_error,
                        "session task aborted"
                    );
                    if let Err(error) = sink.send_text(&key.channel_id, APOLOGY_TEXT).await {
                        warn!(
                            event_name = "convo.manager.apology_failed",
                            session_id = %session_id,
                            error = %error,
                            "failed to send apology"
                        );
                    }
                }
            }
        });

        Ok(Progress::AwaitingResponse)
    }

    /// Delivers `message` to the pending session for its user and channel.
    /// Returns `false` when no session is waiting for it.
    pub async fn route(&self, message: &InboundMessage) -> bool {
        let inbox = {
            let sessions = self.sessions.read().await;
            match sessions.get(&message.session_key()) {
                Some(handle) => handle.inbox.clone(),
                None => return false,
            }
        };
        inbox.send(SessionInput::Response(message.clone())).await.is_ok()
    }

    pub async fn stop(&self, key: &SessionKey) -> bool {
        let inbox = {
            let sessions = self.sessions.read().await;
            match sessions.get(key) {
                Some(handle) => handle.inbox.clone(),
                None => return false,
            }
        };
        inbox.send(SessionInput::Stop).await.is_ok()
    }

    pub async fn is_active(&self, key: &SessionKey) -> bool {
        self.sessions.read().await.contains_key(key)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

async fn run_session(
    mut conversation: Conversation,
    mut inbox: mpsc::Receiver<SessionInput>,
    idle_timeout: Duration,
) -> ConversationStatus {
    loop {
        match tokio::time::timeout(idle_timeout, inbox.recv()).await {
            Ok(Some(SessionInput::Response(message))) => {
                if let Progress::Finished(status) = conversation.handle_response(&message).await {
                    return status;
                }
            }
            Ok(Some(SessionInput::Stop)) | Ok(None) => {
                conversation.stop();
                return conversation.status();
            }
            Err(_) => {
                info!(
                    event_name = "convo.manager.session_idle",
                    session_id = %conversation.id(),
                    idle_timeout_secs = idle_timeout.as_secs(),
                    "session timed out waiting for a response"
                );
                conversation.time_out();
                return conversation.status();
            }
        }
    }
}

async fn remove_if_current(sessions: &SessionTable, key: &SessionKey, session_id: &SessionId) {
    let mut sessions = sessions.write().await;
    if sessions.get(key).is_some_and(|handle| &handle.session_id == session_id) {
        sessions.remove(key);
    }
}
