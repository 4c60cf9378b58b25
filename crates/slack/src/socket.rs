use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::SlackApi;
use crate::events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Connects successfully and yields no envelopes.
#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    api: Arc<dyn SlackApi>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        api: Arc<dyn SlackApi>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, api, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (channel_id, user_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                user_id = user_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(text)) => {
                    if let Some(channel_id) = channel_id {
                        self.reply(&envelope, channel_id, &text).await;
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        channel_id = channel_id.unwrap_or("unknown"),
                        user_id = user_id.unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            }
        }
    }

    async fn reply(&self, envelope: &SlackEnvelope, channel_id: &str, text: &str) {
        match self.api.post_message(channel_id, text).await {
            Ok(()) => debug!(
                event_name = "egress.slack.reply_sent",
                envelope_id = %envelope.envelope_id,
                channel_id,
                "posted handler reply"
            ),
            Err(error) => warn!(
                event_name = "egress.slack.reply_failed",
                envelope_id = %envelope.envelope_id,
                channel_id,
                error = %error,
                "failed to post handler reply"
            ),
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::Message(event) => (Some(&event.channel_id), Some(&event.user_id)),
        SlackEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};
    use crate::api::{NoopSlackApi, SlackApi, SlackApiError};
    use crate::events::{
        EventContext, EventDispatcher, EventHandlerError, MessageEvent, MessageHandler,
        MessageKind, MessageService, SlackEnvelope, SlackEvent,
    };
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        disconnect_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            disconnect_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    disconnect_results: disconnect_results.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                    disconnect_calls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            state.disconnect_results.pop_front().unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        posted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SlackApi for RecordingApi {
        async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError> {
            self.posted.lock().await.push((channel_id.to_owned(), text.to_owned()));
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

    struct UptimeService;

    #[async_trait]
    impl MessageService for UptimeService {
        async fn handle_message(
            &self,
            event: &MessageEvent,
            _ctx: &EventContext,
        ) -> Result<Option<String>, EventHandlerError> {
            match event.to_inbound().text.as_str() {
                "uptime" => Ok(Some("running for 5 minutes".to_owned())),
                "boom" => Err(EventHandlerError::Message("boom".to_owned())),
                _ => Ok(None),
            }
        }
    }

    fn message(envelope_id: &str, text: &str) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::Message(MessageEvent {
                channel_id: "D1".to_owned(),
                user_id: "U1".to_owned(),
                text: text.to_owned(),
                ts: "1730000000.0001".to_owned(),
                kind: MessageKind::DirectMessage,
            }),
        }))
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            Arc::new(NoopSlackApi),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            Arc::new(NoopSlackApi),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn handler_replies_are_posted_and_failures_do_not_stop_the_loop() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![message("env-1", "boom"), message("env-2", "uptime"), Ok(None)],
            vec![Ok(())],
        ));
        let api = Arc::new(RecordingApi::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(MessageHandler::new(UptimeService));

        let runner = SocketModeRunner::new(
            transport.clone(),
            dispatcher,
            api.clone(),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );
        runner.start().await.expect("runner");

        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2"]);
        assert_eq!(
            *api.posted.lock().await,
            vec![("D1".to_owned(), "running for 5 minutes".to_owned())]
        );
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = ReconnectPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 500 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(2).as_millis(), 400);
        assert_eq!(policy.backoff(10).as_millis(), 500);
    }

    #[test]
    fn extracts_channel_and_user_correlation_fields() {
        let envelope = message("env-3", "hi").expect("scripted").expect("envelope");
        let (channel_id, user_id) = super::correlation_fields(&envelope);
        assert_eq!(channel_id, Some("D1"));
        assert_eq!(user_id, Some("U1"));
    }
}
